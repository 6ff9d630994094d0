/// 标签表面工艺，由源图纸名末尾三个字母或 `-XXX` 片段判定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelFinish {
    Dourado,
    Rose,
    Prata,
    Unknown,
}

const KNOWN: [LabelFinish; 3] = [LabelFinish::Dourado, LabelFinish::Rose, LabelFinish::Prata];

impl LabelFinish {
    pub fn code(self) -> Option<&'static str> {
        match self {
            LabelFinish::Dourado => Some("DOU"),
            LabelFinish::Rose => Some("ROS"),
            LabelFinish::Prata => Some("PRA"),
            LabelFinish::Unknown => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            LabelFinish::Dourado => 'D',
            LabelFinish::Rose => 'R',
            LabelFinish::Prata => 'P',
            LabelFinish::Unknown => '?',
        }
    }

    pub fn rgb(self) -> [u8; 3] {
        match self {
            LabelFinish::Dourado => [0xFF, 0xD7, 0x00],
            LabelFinish::Rose => [0xB7, 0x6E, 0x79],
            LabelFinish::Prata => [0xC0, 0xC0, 0xC0],
            LabelFinish::Unknown => [0xCC, 0xCC, 0xCC],
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        KNOWN.into_iter().find(|finish| finish.code() == Some(code))
    }

    /// 先看去掉扩展名后的末尾三个字符，再按 DOU、ROS、PRA 顺序查找 `-XXX` 片段。
    pub fn classify(name: &str) -> Self {
        let upper = name.to_uppercase();
        let stem = match upper.rfind('.') {
            Some(index) if index > 0 => &upper[..index],
            _ => upper.as_str(),
        };
        let tail: String = {
            let chars: Vec<char> = stem.chars().collect();
            chars[chars.len().saturating_sub(3)..].iter().collect()
        };
        if let Some(finish) = Self::from_code(&tail) {
            return finish;
        }
        KNOWN
            .into_iter()
            .find(|finish| {
                finish
                    .code()
                    .is_some_and(|code| upper.contains(&format!("-{code}")))
            })
            .unwrap_or(LabelFinish::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_before_extension_wins() {
        assert_eq!(LabelFinish::classify("ANEL-DOU.dxf"), LabelFinish::Dourado);
        assert_eq!(LabelFinish::classify("colar_ros.DXF"), LabelFinish::Rose);
        assert_eq!(LabelFinish::classify("PINGENTEPRA"), LabelFinish::Prata);
        // 末尾是 ROS，尽管中间含 -DOU
        assert_eq!(LabelFinish::classify("X-DOU-ROS.dxf"), LabelFinish::Rose);
    }

    #[test]
    fn dashed_code_anywhere_is_the_fallback() {
        assert_eq!(LabelFinish::classify("ANEL-PRA-2.dxf"), LabelFinish::Prata);
        assert_eq!(LabelFinish::classify("a-ros-b-dou-c.dxf"), LabelFinish::Dourado);
    }

    #[test]
    fn unmatched_names_are_unknown() {
        let finish = LabelFinish::classify("BRINCO.dxf");
        assert_eq!(finish, LabelFinish::Unknown);
        assert_eq!(finish.letter(), '?');
        assert_eq!(finish.rgb(), [0xCC, 0xCC, 0xCC]);
        assert_eq!(LabelFinish::classify(""), LabelFinish::Unknown);
        assert_eq!(LabelFinish::classify("ção"), LabelFinish::Unknown);
    }

    #[test]
    fn table_values() {
        assert_eq!(LabelFinish::Dourado.rgb(), [0xFF, 0xD7, 0x00]);
        assert_eq!(LabelFinish::Rose.letter(), 'R');
        assert_eq!(LabelFinish::Prata.code(), Some("PRA"));
    }
}
