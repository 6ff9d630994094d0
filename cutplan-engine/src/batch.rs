use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::NaiveDate;
use tracing::debug;

use crate::composer::LabelItem;

pub const DEFAULT_DATE_FORMAT: &str = "%d-%m-%Y";
const OUTPUT_EXTENSION: &str = ".dxf";

/// 一页：最多 `capacity` 个请求，页内序号（1 起始）即标签位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub items: Vec<LabelItem>,
}

/// 按原始顺序切分为若干页。容量为 0 时按 1 处理。
pub fn partition<S: AsRef<str>>(names: &[S], capacity: usize) -> Vec<Page> {
    names
        .chunks(capacity.max(1))
        .enumerate()
        .map(|(index, chunk)| Page {
            index,
            items: chunk
                .iter()
                .enumerate()
                .map(|(offset, name)| LabelItem::new(name.as_ref(), offset + 1))
                .collect(),
        })
        .collect()
}

/// 输出文件命名：已有名称集合 + 下一个序号，在单次运行内显式传递。
#[derive(Debug, Clone)]
pub struct PlanNamer {
    existing: HashSet<String>,
    next_counter: u32,
    prefix: String,
    date_label: String,
}

impl PlanNamer {
    pub fn new<I>(existing: I, prefix: impl Into<String>, today: NaiveDate, date_format: &str) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            existing: existing.into_iter().collect(),
            next_counter: 1,
            prefix: prefix.into(),
            date_label: format_date(today, date_format),
        }
    }

    #[inline]
    pub fn is_taken(&self, name: &str) -> bool {
        self.existing.contains(name)
    }

    /// 显式基名补全 `.dxf` 扩展名；否则生成 `"{prefix} {NN} {date}.dxf"`，序号跳过已有名称。
    pub fn base_name(&mut self, explicit: Option<&str>) -> String {
        if let Some(name) = explicit.map(str::trim).filter(|name| !name.is_empty()) {
            return with_extension(name);
        }
        loop {
            let candidate = format!(
                "{} {:02} {}{OUTPUT_EXTENSION}",
                self.prefix, self.next_counter, self.date_label
            );
            self.next_counter += 1;
            if !self.is_taken(&candidate) {
                return candidate;
            }
        }
    }

    /// 第 `page_index` 页的最终名称，确保唯一并登记为已占用。
    pub fn page_name(&mut self, base: &str, page_index: usize) -> String {
        let candidate = if page_index == 0 {
            base.to_string()
        } else {
            let (stem, extension) = split_extension(base);
            format!("{stem}_{:02}{extension}", page_index + 1)
        };
        let unique = self.make_unique(candidate);
        self.existing.insert(unique.clone());
        debug!(page = page_index, name = %unique, "已分配输出文件名");
        unique
    }

    /// 与页面同名、扩展名不同的附属文件（如预览图），同样避开已有名称并登记。
    pub fn companion_name(&mut self, page_name: &str, extension: &str) -> String {
        let (stem, _) = split_extension(page_name);
        let unique = self.make_unique(format!("{stem}.{extension}"));
        self.existing.insert(unique.clone());
        unique
    }

    fn make_unique(&self, candidate: String) -> String {
        if !self.is_taken(&candidate) {
            return candidate;
        }
        let (stem, extension) = split_extension(&candidate);
        let mut n = 2;
        loop {
            let name = format!("{stem} ({n}){extension}");
            if !self.is_taken(&name) {
                return name;
            }
            n += 1;
        }
    }
}

/// 按 chrono 格式串格式化日期；格式串无效时回退到 `DEFAULT_DATE_FORMAT`。
pub fn format_date(date: NaiveDate, date_format: &str) -> String {
    let mut label = String::new();
    if write!(label, "{}", date.format(date_format)).is_ok() {
        return label;
    }
    date.format(DEFAULT_DATE_FORMAT).to_string()
}

fn with_extension(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(OUTPUT_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{OUTPUT_EXTENSION}")
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).expect("有效日期")
    }

    #[test]
    fn partition_keeps_order_and_restarts_slots_per_page() {
        let names: Vec<String> = (1..=40).map(|n| format!("L{n}.dxf")).collect();
        let pages = partition(&names, 32);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].items.len(), 32);
        assert_eq!(pages[1].items.len(), 8);
        assert_eq!(pages[1].index, 1);
        assert_eq!(pages[1].items[0], LabelItem::new("L33.dxf", 1));
        assert_eq!(pages[1].items[7], LabelItem::new("L40.dxf", 8));

        let flattened: Vec<&str> = pages
            .iter()
            .flat_map(|page| page.items.iter().map(|item| item.name.as_str()))
            .collect();
        let original: Vec<&str> = names.iter().map(String::as_str).collect();
        assert_eq!(flattened, original);
    }

    #[test]
    fn partition_of_nothing_is_empty() {
        let names: Vec<&str> = Vec::new();
        assert!(partition(&names, 18).is_empty());
        assert_eq!(partition(&["A", "B"], 0).len(), 2);
    }

    #[test]
    fn generated_base_name_skips_existing_counters() {
        let existing = vec![
            "Plano de corte 01 07-03-2024.dxf".to_string(),
            "Plano de corte 02 07-03-2024.dxf".to_string(),
        ];
        let mut namer = PlanNamer::new(existing, "Plano de corte", day(), DEFAULT_DATE_FORMAT);
        assert_eq!(namer.base_name(None), "Plano de corte 03 07-03-2024.dxf");
        assert_eq!(namer.base_name(Some("  ")), "Plano de corte 04 07-03-2024.dxf");
    }

    #[test]
    fn explicit_base_name_gets_extension() {
        let mut namer = PlanNamer::new(Vec::new(), "Plano de corte", day(), DEFAULT_DATE_FORMAT);
        assert_eq!(namer.base_name(Some("Pedido 15")), "Pedido 15.dxf");
        assert_eq!(namer.base_name(Some("Pedido 15.DXF")), "Pedido 15.DXF");
    }

    #[test]
    fn later_pages_get_a_zero_padded_suffix() {
        let mut namer = PlanNamer::new(Vec::new(), "Plano de corte", day(), DEFAULT_DATE_FORMAT);
        let base = namer.base_name(None);
        assert_eq!(namer.page_name(&base, 0), "Plano de corte 01 07-03-2024.dxf");
        assert_eq!(namer.page_name(&base, 1), "Plano de corte 01 07-03-2024_02.dxf");
        assert_eq!(namer.page_name(&base, 9), "Plano de corte 01 07-03-2024_10.dxf");
    }

    #[test]
    fn collisions_get_a_numeric_suffix() {
        let existing = vec!["Pedido.dxf".to_string(), "Pedido (2).dxf".to_string()];
        let mut namer = PlanNamer::new(existing, "Plano de corte", day(), DEFAULT_DATE_FORMAT);
        let base = namer.base_name(Some("Pedido"));
        assert_eq!(namer.page_name(&base, 0), "Pedido (3).dxf");
        // 同一运行内再次使用同一基名也不会重复
        assert_eq!(namer.page_name(&base, 0), "Pedido (4).dxf");
        assert!(namer.is_taken("Pedido (4).dxf"));
    }

    #[test]
    fn generated_names_are_distinct_and_disjoint_from_existing() {
        let existing: Vec<String> = vec![
            "Plano de corte 01 07-03-2024.dxf".to_string(),
            "Plano de corte 01 07-03-2024_02.dxf".to_string(),
            "Plano de corte 02 07-03-2024_03.dxf".to_string(),
        ];
        let mut namer =
            PlanNamer::new(existing.clone(), "Plano de corte", day(), DEFAULT_DATE_FORMAT);
        let mut seen = HashSet::new();
        for _ in 0..3 {
            let base = namer.base_name(None);
            for page in 0..5 {
                let name = namer.page_name(&base, page);
                assert!(!existing.contains(&name), "{name} 与已有名称冲突");
                assert!(seen.insert(name.clone()), "{name} 重复");
            }
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn custom_and_invalid_date_formats() {
        assert_eq!(format_date(day(), "%Y%m%d"), "20240307");
        assert_eq!(format_date(day(), "%Q"), "07-03-2024");
    }

    #[test]
    fn extension_split_ignores_leading_dot() {
        assert_eq!(split_extension("a.b.dxf"), ("a.b", ".dxf"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("sem_extensao"), ("sem_extensao", ""));
    }

    #[test]
    fn companion_names_avoid_existing_files() {
        let existing = vec!["Plano 01 07-03-2024.png".to_string()];
        let mut namer = PlanNamer::new(existing, "Plano", day(), "%d-%m-%Y");
        let page = namer.page_name("Plano 01 07-03-2024.dxf", 0);
        assert_eq!(page, "Plano 01 07-03-2024.dxf");

        assert_eq!(namer.companion_name(&page, "png"), "Plano 01 07-03-2024 (2).png");
        // 同一运行内再次申请也不会重名
        assert_eq!(namer.companion_name(&page, "png"), "Plano 01 07-03-2024 (3).png");

        let second = namer.page_name("Plano 01 07-03-2024.dxf", 1);
        assert_eq!(namer.companion_name(&second, "png"), "Plano 01 07-03-2024_02.png");
    }
}
