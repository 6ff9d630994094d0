use std::f64::consts::{PI, TAU};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::warn;
use cutplan_core::{
    document::{
        Arc, BlockDefinition, BlockReference, Circle, Color, Document, Ellipse, Entity, Line,
        PointEntity, Polyline, PolylineVertex, Spline, Text, UnknownEntity,
    },
    geometry::{Point2, Vector2},
};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的 DXF 文本。
    pub fn parse_str(&self, data: &str) -> Result<Document, IoError> {
        DxfParser::new(data).parse().map_err(IoError::from)
    }

    /// 解析从存储拉取的原始字节，非 UTF-8 字符按替换字符处理（旧版 DXF 常用 ANSI 代码页）。
    pub fn parse_bytes(&self, data: &[u8]) -> Result<Document, IoError> {
        let text = String::from_utf8_lossy(data);
        self.parse_str(&text)
    }

    /// 将文档序列化为 DXF 文本。
    pub fn to_dxf_string(&self, document: &Document) -> String {
        DxfWriter::new().write_document(document)
    }
}

impl Default for DxfFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_bytes(&data)
    }
}

impl DocumentSaver for DxfFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        let content = self.to_dxf_string(document);
        fs::write(path, content).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `Invalid` 只影响单个实体；`Malformed` 表示组码流本身已损坏。
#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
    Malformed { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } | DxfError::Malformed { message } => {
                IoError::InvalidDocument(message)
            }
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.as_str() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "HEADER" => self.parse_header(&mut document)?,
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_header(&mut self, document: &mut Document) -> Result<(), DxfError> {
        let mut current_variable: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some((9, name)) => current_variable = Some(name.trim().to_string()),
                Some((70, value)) if current_variable.as_deref() == Some("$INSUNITS") => {
                    document.set_insertion_units(Some(parse_i16(&value, "$INSUNITS")?));
                }
                Some(_) => continue,
                None => return Err(DxfError::invalid("HEADER 段未找到 ENDSEC 终止标记")),
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                "SEQEND" | "VERTEX" | "ATTRIB" => {
                    self.skip_entity_body()?;
                }
                entity => {
                    let parsed = self.parse_entity(entity)?;
                    document.add_entity(parsed);
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                "BLOCK" => {
                    if let Some(definition) = self.parse_block_definition()? {
                        document.add_block_definition(definition);
                    }
                }
                _ => {
                    // 未预期的条目（例如嵌套记录），直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<Option<BlockDefinition>, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        let mut collect_entities = true;
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    "SEQEND" | "VERTEX" | "ATTRIB" | "ATTDEF" => self.skip_entity_body()?,
                    entity_kind => {
                        if collect_entities {
                            entities.push(self.parse_entity(entity_kind)?);
                        } else {
                            self.skip_entity_body()?;
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => {
                        let trimmed = value.trim().to_string();
                        collect_entities = !trimmed.starts_with('*');
                        name = Some(trimmed);
                    }
                    10 => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                    20 => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                    _ => {}
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = match name {
            Some(name) => name,
            None => return Err(DxfError::invalid("BLOCK 缺少名称（组码 2）")),
        };

        if !collect_entities {
            return Ok(None);
        }

        Ok(Some(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        }))
    }

    /// 不支持或数据无效的实体不会导致整体失败，而是保留为 `Entity::Unknown`，
    /// 由后续流程丢弃。组码流损坏时仍返回错误。
    fn parse_entity(&mut self, kind: &str) -> Result<Entity, DxfError> {
        let parsed = match kind {
            "LINE" => self.parse_line(),
            "CIRCLE" => self.parse_circle(),
            "ARC" => self.parse_arc(),
            "ELLIPSE" => self.parse_ellipse(),
            "LWPOLYLINE" => self.parse_lwpolyline(),
            "POLYLINE" => self.parse_polyline(),
            "SPLINE" => self.parse_spline(),
            "POINT" => self.parse_point(),
            "TEXT" => self.parse_text(),
            "INSERT" => self.parse_insert(),
            other => Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}"))),
        };
        match parsed {
            Err(DxfError::Unsupported { .. }) => self.parse_unknown(kind),
            Err(DxfError::Invalid { message }) => {
                warn!(kind, reason = %message, "实体数据无效，已跳过该记录");
                self.skip_entity_body()?;
                Ok(Entity::Unknown(UnknownEntity {
                    kind: kind.to_string(),
                    layer: "0".to_string(),
                    color: Color::BY_LAYER,
                }))
            }
            other => other,
        }
    }

    fn parse_unknown(&mut self, kind: &str) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((8, value)) => layer = Some(value.trim().to_string()),
                Some((62, value)) => {
                    if let Ok(parsed) = parse_color(&value) {
                        color = parsed;
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
        Ok(Entity::Unknown(UnknownEntity {
            kind: kind.to_string(),
            layer: layer.unwrap_or_else(|| "0".to_string()),
            color,
        }))
    }

    fn parse_line(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut start_x = None;
        let mut start_y = None;
        let mut end_x = None;
        let mut end_y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    10 => assign_coord(&mut start_x, &value, "LINE 起点 X（组码 10）")?,
                    20 => assign_coord(&mut start_y, &value, "LINE 起点 Y（组码 20）")?,
                    11 => assign_coord(&mut end_x, &value, "LINE 终点 X（组码 11）")?,
                    21 => assign_coord(&mut end_y, &value, "LINE 终点 Y（组码 21）")?,
                    30 | 31 => {} // 忽略 Z 坐标
                    _ => {}
                },
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
        let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
        let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
        let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;

        Ok(Entity::Line(Line {
            start: Point2::new(sx, sy),
            end: Point2::new(ex, ey),
            layer,
            color,
        }))
    }

    fn parse_circle(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        let mut extrusion = Extrusion::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    10 => assign_coord(&mut center_x, &value, "CIRCLE 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "CIRCLE 圆心 Y（组码 20）")?,
                    40 => assign_coord(&mut radius, &value, "CIRCLE 半径（组码 40）")?,
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("CIRCLE 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let cx = center_x.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;
        let ocs = extrusion.plane()?;

        Ok(Entity::Circle(Circle {
            center: ocs.point(cx, cy),
            radius,
            layer,
            color,
        }))
    }

    fn parse_arc(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        let mut extrusion = Extrusion::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    10 => assign_coord(&mut center_x, &value, "ARC 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "ARC 圆心 Y（组码 20）")?,
                    40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                    50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                    51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
        let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;
        let ocs = extrusion.plane()?;
        let (start_angle, end_angle) = ocs.arc(start_angle.to_radians(), end_angle.to_radians());

        Ok(Entity::Arc(Arc {
            center: ocs.point(cx, cy),
            radius,
            start_angle,
            end_angle,
            layer,
            color,
        }))
    }

    fn parse_ellipse(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut center_x = None;
        let mut center_y = None;
        let mut major_x = None;
        let mut major_y = None;
        let mut ratio = None;
        let mut start_parameter = 0.0;
        let mut end_parameter = TAU;
        let mut extrusion = Extrusion::default();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    10 => assign_coord(&mut center_x, &value, "ELLIPSE 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "ELLIPSE 圆心 Y（组码 20）")?,
                    11 => assign_coord(&mut major_x, &value, "ELLIPSE 主轴向量 X（组码 11）")?,
                    21 => assign_coord(&mut major_y, &value, "ELLIPSE 主轴向量 Y（组码 21）")?,
                    40 => assign_coord(&mut ratio, &value, "ELLIPSE 半径比（组码 40）")?,
                    41 => start_parameter = parse_f64(&value, "ELLIPSE 起始参数")?,
                    42 => end_parameter = parse_f64(&value, "ELLIPSE 终止参数")?,
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("ELLIPSE 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let cx = center_x.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少圆心 Y（组码 20）"))?;
        let major_x =
            major_x.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少主轴向量 X（组码 11）"))?;
        let major_y =
            major_y.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少主轴向量 Y（组码 21）"))?;

        if major_x.abs() < f64::EPSILON && major_y.abs() < f64::EPSILON {
            return Err(DxfError::invalid("ELLIPSE 主轴向量长度为 0，无法创建实体"));
        }

        let ratio = ratio.unwrap_or(1.0);
        if ratio <= 0.0 {
            return Err(DxfError::invalid(format!(
                "ELLIPSE 半径比必须为正数，实际为 {ratio}"
            )));
        }
        // 圆心与主轴已是 WCS，拉伸方向只决定参数的旋向
        let (start_parameter, end_parameter) =
            extrusion.plane()?.parameters(start_parameter, end_parameter);

        Ok(Entity::Ellipse(Ellipse {
            center: Point2::new(cx, cy),
            major_axis: Vector2::new(major_x, major_y),
            ratio,
            start_parameter,
            end_parameter,
            layer,
            color,
        }))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut is_closed = false;
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut pending_x: Option<f64> = None;
        let mut pending_y: Option<f64> = None;
        let mut extrusion = Extrusion::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    70 => {
                        let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                        is_closed = flag & 0x01 == 0x01;
                    }
                    10 => {
                        let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                        if let Some(y) = pending_y.take() {
                            vertices.push(PolylineVertex::new(Point2::new(x, y)));
                        } else if pending_x.replace(x).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 Y（组码 20）",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                        if let Some(x) = pending_x.take() {
                            vertices.push(PolylineVertex::new(Point2::new(x, y)));
                        } else if pending_y.replace(y).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 X（组码 10）",
                            ));
                        }
                    }
                    42 => {
                        let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                        match vertices.last_mut() {
                            Some(vertex) => vertex.bulge = bulge,
                            None => {
                                return Err(DxfError::invalid(
                                    "LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）",
                                ));
                            }
                        }
                    }
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() || pending_y.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }

        if vertices.is_empty() {
            return Err(DxfError::invalid("LWPOLYLINE 未解析到任何顶点"));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(Entity::Polyline(Polyline {
            vertices: extrusion.plane()?.vertices(vertices),
            is_closed,
            layer,
            color,
        }))
    }

    /// 旧式 POLYLINE：头部 + VERTEX 序列 + SEQEND。网格/多面网格不在支持范围内。
    fn parse_polyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut flags: i16 = 0;
        let mut extrusion = Extrusion::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    70 => flags = parse_i16(&value, "POLYLINE 标志（组码 70）")?,
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("POLYLINE 未正确结束")),
            }
        }

        if flags & (0x10 | 0x40) != 0 {
            self.skip_polyline_sequence()?;
            return Err(DxfError::unsupported("POLYLINE 网格/多面网格"));
        }

        let mut vertices: Vec<PolylineVertex> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "VERTEX" => vertices.push(self.parse_vertex()?),
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }

        if vertices.is_empty() {
            return Err(DxfError::invalid("POLYLINE 未解析到任何顶点"));
        }

        Ok(Entity::Polyline(Polyline {
            vertices: extrusion.plane()?.vertices(vertices),
            is_closed: flags & 0x01 != 0,
            layer: layer.unwrap_or_else(|| "0".to_string()),
            color,
        }))
    }

    fn parse_vertex(&mut self) -> Result<PolylineVertex, DxfError> {
        let mut x = None;
        let mut y = None;
        let mut bulge = 0.0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    10 => assign_coord(&mut x, &value, "VERTEX X（组码 10）")?,
                    20 => assign_coord(&mut y, &value, "VERTEX Y（组码 20）")?,
                    42 => bulge = parse_f64(&value, "VERTEX bulge（组码 42）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("VERTEX 未正确结束")),
            }
        }
        let x = x.ok_or_else(|| DxfError::invalid("VERTEX 缺少 X（组码 10）"))?;
        let y = y.ok_or_else(|| DxfError::invalid("VERTEX 缺少 Y（组码 20）"))?;
        Ok(PolylineVertex::with_bulge(Point2::new(x, y), bulge))
    }

    fn skip_polyline_sequence(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "VERTEX" => self.skip_entity_body()?,
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }

    fn parse_spline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut flags: i16 = 0;
        let mut degree: Option<i16> = None;
        let mut knot_values: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        let mut control_points: Vec<Point2> = Vec::new();
        let mut fit_points: Vec<Point2> = Vec::new();
        let mut pending_control_x: Option<f64> = None;
        let mut pending_fit_x: Option<f64> = None;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    70 => {
                        flags = parse_i16(&value, "SPLINE 类型标志（组码 70）")?;
                    }
                    71 => {
                        degree = Some(parse_i16(&value, "SPLINE 阶数（组码 71）")?);
                    }
                    40 => {
                        knot_values.push(parse_f64(&value, "SPLINE 节点值（组码 40）")?);
                    }
                    41 => {
                        weights.push(parse_f64(&value, "SPLINE 权重（组码 41）")?);
                    }
                    10 => {
                        if pending_control_x
                            .replace(parse_f64(&value, "SPLINE 控制点 X（组码 10）")?)
                            .is_some()
                        {
                            return Err(DxfError::invalid(
                                "SPLINE 控制点 X（组码 10）在未提供 Y 之前重复出现",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "SPLINE 控制点 Y（组码 20）")?;
                        let x = pending_control_x.take().ok_or_else(|| {
                            DxfError::invalid("SPLINE 控制点 Y（组码 20）缺少对应的 X")
                        })?;
                        control_points.push(Point2::new(x, y));
                    }
                    11 => {
                        if pending_fit_x
                            .replace(parse_f64(&value, "SPLINE 拟合点 X（组码 11）")?)
                            .is_some()
                        {
                            return Err(DxfError::invalid(
                                "SPLINE 拟合点 X（组码 11）在未提供 Y 之前重复出现",
                            ));
                        }
                    }
                    21 => {
                        let y = parse_f64(&value, "SPLINE 拟合点 Y（组码 21）")?;
                        let x = pending_fit_x.take().ok_or_else(|| {
                            DxfError::invalid("SPLINE 拟合点 Y（组码 21）缺少对应的 X")
                        })?;
                        fit_points.push(Point2::new(x, y));
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("SPLINE 未正确结束")),
            }
        }

        if let Some(x) = pending_control_x.take() {
            return Err(DxfError::invalid(format!(
                "SPLINE 控制点 X={x} 缺少对应的 Y（组码 20）"
            )));
        }
        if let Some(x) = pending_fit_x.take() {
            return Err(DxfError::invalid(format!(
                "SPLINE 拟合点 X={x} 缺少对应的 Y（组码 21）"
            )));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let degree = degree.ok_or_else(|| DxfError::invalid("SPLINE 缺少阶数（组码 71）"))? as i32;

        Ok(Entity::Spline(Spline {
            degree,
            is_rational: flags & 0x04 != 0,
            is_closed: flags & 0x01 != 0,
            is_periodic: flags & 0x02 != 0,
            control_points,
            fit_points,
            knot_values,
            weights,
            layer,
            color,
        }))
    }

    fn parse_point(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut x = None;
        let mut y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    10 => assign_coord(&mut x, &value, "POINT X（组码 10）")?,
                    20 => assign_coord(&mut y, &value, "POINT Y（组码 20）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("POINT 未正确结束")),
            }
        }
        let x = x.ok_or_else(|| DxfError::invalid("POINT 缺少 X（组码 10）"))?;
        let y = y.ok_or_else(|| DxfError::invalid("POINT 缺少 Y（组码 20）"))?;
        Ok(Entity::Point(PointEntity {
            position: Point2::new(x, y),
            layer: layer.unwrap_or_else(|| "0".to_string()),
            color,
        }))
    }

    fn parse_text(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height = None;
        let mut rotation_deg = 0.0;
        let mut text: Option<String> = None;
        let mut extrusion = Extrusion::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    10 => assign_coord(&mut insert_x, &value, "TEXT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert_y, &value, "TEXT 插入点 Y（组码 20）")?,
                    40 => assign_coord(&mut height, &value, "TEXT 高度（组码 40）")?,
                    50 => {
                        rotation_deg = parse_f64(&value, "TEXT 旋转角")?;
                    }
                    1 => match text {
                        Some(ref mut existing) => {
                            existing.push('\n');
                            existing.push_str(&value);
                        }
                        None => text = Some(value),
                    },
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let ix = insert_x.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 Y（组码 20）"))?;
        let height = height.ok_or_else(|| DxfError::invalid("TEXT 缺少文字高度（组码 40）"))?;
        let ocs = extrusion.plane()?;

        Ok(Entity::Text(Text {
            insert: ocs.point(ix, iy),
            content: text.unwrap_or_default(),
            height,
            rotation: ocs.angle(rotation_deg.to_radians()),
            layer,
            color,
        }))
    }

    fn parse_insert(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut color = Color::BY_LAYER;
        let mut name = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        let mut extrusion = Extrusion::default();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = parse_color(&value)?,
                    2 => {
                        if name.is_some() {
                            return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                        }
                        name = Some(value.trim().to_string());
                    }
                    10 => assign_coord(&mut insert_x, &value, "INSERT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert_y, &value, "INSERT 插入点 Y（组码 20）")?,
                    41 => {
                        scale_x = Some(parse_f64(&value, "INSERT 缩放 X")?);
                    }
                    42 => {
                        scale_y = Some(parse_f64(&value, "INSERT 缩放 Y")?);
                    }
                    50 => {
                        rotation_deg = parse_f64(&value, "INSERT 旋转角")?;
                    }
                    210 | 220 | 230 => extrusion.assign(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("INSERT 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        let ix = insert_x.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 Y（组码 20）"))?;
        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or_else(|| scale_x.unwrap_or(1.0));
        let (insert, scale, rotation) =
            extrusion
                .plane()?
                .placement(ix, iy, Vector2::new(sx, sy), rotation_deg.to_radians());

        Ok(Entity::BlockReference(BlockReference {
            name,
            insert,
            scale,
            rotation,
            layer,
            color,
        }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// 实体拉伸方向（组码 210/220/230），缺省为 +Z。
#[derive(Debug, Clone, Copy)]
struct Extrusion {
    x: f64,
    y: f64,
    z: f64,
}

impl Default for Extrusion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        }
    }
}

/// 判定拉伸方向与 Z 轴平行的容差（单位向量分量）。
const AXIS_TOLERANCE: f64 = 1e-9;

impl Extrusion {
    fn assign(&mut self, code: i32, raw: &str) -> Result<(), DxfError> {
        let value = parse_f64(raw, "拉伸方向（组码 210/220/230）")?;
        match code {
            210 => self.x = value,
            220 => self.y = value,
            _ => self.z = value,
        }
        Ok(())
    }

    /// 只接受与 Z 轴平行的拉伸方向；其余方向的实体不在 XY 平面内。
    fn plane(self) -> Result<Ocs, DxfError> {
        let length = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if !length.is_finite() || length <= f64::EPSILON {
            return Err(DxfError::invalid("拉伸方向（组码 210/220/230）长度为 0"));
        }
        if self.x.abs() / length > AXIS_TOLERANCE || self.y.abs() / length > AXIS_TOLERANCE {
            return Err(DxfError::unsupported(format!(
                "非 Z 向拉伸方向 ({}, {}, {})",
                self.x, self.y, self.z
            )));
        }
        Ok(if self.z < 0.0 { Ocs::Mirrored } else { Ocs::World })
    }
}

/// 对象坐标系到 WCS 的映射。拉伸方向为 -Z 时，按任意轴算法 OCS 的 X 轴指向 -X。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ocs {
    World,
    Mirrored,
}

impl Ocs {
    fn point(self, x: f64, y: f64) -> Point2 {
        match self {
            Ocs::World => Point2::new(x, y),
            Ocs::Mirrored => Point2::new(-x, y),
        }
    }

    fn angle(self, radians: f64) -> f64 {
        match self {
            Ocs::World => radians,
            Ocs::Mirrored => (PI - radians).rem_euclid(TAU),
        }
    }

    /// 逆时针圆弧镜像后旋向相反，起止角互换，扫角保持不变。
    fn arc(self, start: f64, end: f64) -> (f64, f64) {
        match self {
            Ocs::World => (start, end),
            Ocs::Mirrored => {
                let mirrored_start = self.angle(end);
                (mirrored_start, mirrored_start + (end - start))
            }
        }
    }

    fn parameters(self, start: f64, end: f64) -> (f64, f64) {
        match self {
            Ocs::World => (start, end),
            Ocs::Mirrored => (-end, -start),
        }
    }

    fn vertices(self, vertices: Vec<PolylineVertex>) -> Vec<PolylineVertex> {
        match self {
            Ocs::World => vertices,
            Ocs::Mirrored => vertices
                .into_iter()
                .map(|vertex| {
                    PolylineVertex::with_bulge(
                        self.point(vertex.position.x(), vertex.position.y()),
                        -vertex.bulge,
                    )
                })
                .collect(),
        }
    }

    /// 块参照：镜像等价于 X 向比例取反、旋转角取反。
    fn placement(self, x: f64, y: f64, scale: Vector2, rotation: f64) -> (Point2, Vector2, f64) {
        match self {
            Ocs::World => (Point2::new(x, y), scale, rotation),
            Ocs::Mirrored => (
                self.point(x, y),
                Vector2::new(-scale.x(), scale.y()),
                -rotation,
            ),
        }
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 容忍文件末尾的空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::malformed(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::malformed(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    /// 每次最多回退一个 pair，解析流程保证先读后退。
    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 被重复回退");
        self.buffer = Some(pair);
    }
}

/// 按 AutoCAD 2000（AC1015）结构输出：HEADER、TABLES（LTYPE/LAYER/BLOCK_RECORD）、BLOCKS、
/// ENTITIES、OBJECTS（根字典）。`$HANDSEED` 在其余各段写完后才能确定，因此 HEADER 最后生成。
struct DxfWriter {
    out: String,
    next_handle: u64,
}

impl DxfWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            next_handle: 0x20,
        }
    }

    fn write_document(mut self, document: &Document) -> String {
        self.tables(document);
        self.blocks(document);

        self.section("ENTITIES");
        for (_, entity) in document.entities() {
            self.entity(entity);
        }
        self.pair(0, "ENDSEC");

        self.objects();
        self.pair(0, "EOF");

        let body = std::mem::take(&mut self.out);
        self.header(document);
        self.out.push_str(&body);
        self.out
    }

    fn header(&mut self, document: &Document) {
        self.section("HEADER");
        self.pair(9, "$ACADVER");
        self.pair(1, "AC1015");
        self.pair(9, "$HANDSEED");
        self.pair(5, format!("{:X}", self.next_handle));
        if let Some(units) = document.insertion_units() {
            self.pair(9, "$INSUNITS");
            self.pair(70, units);
        }
        self.pair(0, "ENDSEC");
    }

    fn tables(&mut self, document: &Document) {
        let mut layers: Vec<&str> = document.layers().map(|layer| layer.name.as_str()).collect();
        layers.sort_unstable();

        self.section("TABLES");
        self.pair(0, "TABLE");
        self.pair(2, "LTYPE");
        self.pair(70, 1);
        self.pair(0, "LTYPE");
        self.handle();
        self.pair(100, "AcDbSymbolTableRecord");
        self.pair(100, "AcDbLinetypeTableRecord");
        self.pair(2, "CONTINUOUS");
        self.pair(70, 0);
        self.pair(3, "Solid line");
        self.pair(72, 65);
        self.pair(73, 0);
        self.real(40, 0.0);
        self.pair(0, "ENDTAB");

        self.pair(0, "TABLE");
        self.pair(2, "LAYER");
        self.pair(70, layers.len());
        for layer in &layers {
            self.pair(0, "LAYER");
            self.handle();
            self.pair(100, "AcDbSymbolTableRecord");
            self.pair(100, "AcDbLayerTableRecord");
            self.pair(2, layer);
            self.pair(70, 0);
            self.pair(62, 7);
            self.pair(6, "CONTINUOUS");
        }
        self.pair(0, "ENDTAB");

        self.pair(0, "TABLE");
        self.pair(2, "BLOCK_RECORD");
        let block_names: Vec<&str> = ["*Model_Space", "*Paper_Space"]
            .into_iter()
            .chain(document.blocks().map(|block| block.name.as_str()))
            .collect();
        self.pair(70, block_names.len());
        for name in &block_names {
            self.pair(0, "BLOCK_RECORD");
            self.handle();
            self.pair(100, "AcDbSymbolTableRecord");
            self.pair(100, "AcDbBlockTableRecord");
            self.pair(2, name);
        }
        self.pair(0, "ENDTAB");
        self.pair(0, "ENDSEC");
    }

    fn blocks(&mut self, document: &Document) {
        self.section("BLOCKS");
        for name in ["*Model_Space", "*Paper_Space"] {
            self.block_header(name, Point2::ORIGIN);
            self.block_end();
        }
        for block in document.blocks() {
            self.block_header(&block.name, block.base_point);
            for entity in &block.entities {
                self.entity(entity);
            }
            self.block_end();
        }
        self.pair(0, "ENDSEC");
    }

    /// 根字典及其 ACAD_GROUP 子字典。
    fn objects(&mut self) {
        let root = self.allocate();
        let groups = self.allocate();
        self.section("OBJECTS");
        self.pair(0, "DICTIONARY");
        self.pair(5, format!("{root:X}"));
        self.pair(330, 0);
        self.pair(100, "AcDbDictionary");
        self.pair(281, 1);
        self.pair(3, "ACAD_GROUP");
        self.pair(350, format!("{groups:X}"));
        self.pair(0, "DICTIONARY");
        self.pair(5, format!("{groups:X}"));
        self.pair(330, format!("{root:X}"));
        self.pair(100, "AcDbDictionary");
        self.pair(281, 1);
        self.pair(0, "ENDSEC");
    }

    fn section(&mut self, name: &str) {
        self.pair(0, "SECTION");
        self.pair(2, name);
    }

    fn pair(&mut self, code: i32, value: impl std::fmt::Display) {
        // 写入 String 不会失败
        let _ = writeln!(self.out, "{code:>3}\n{value}");
    }

    fn real(&mut self, code: i32, value: f64) {
        let _ = writeln!(self.out, "{code:>3}\n{}", format_real(value));
    }

    fn point(&mut self, code: i32, point: Point2) {
        self.real(code, point.x());
        self.real(code + 10, point.y());
        self.real(code + 20, 0.0);
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn handle(&mut self) {
        let handle = self.allocate();
        self.pair(5, format!("{handle:X}"));
    }

    fn block_header(&mut self, name: &str, base_point: Point2) {
        self.pair(0, "BLOCK");
        self.handle();
        self.pair(100, "AcDbEntity");
        self.pair(8, "0");
        self.pair(100, "AcDbBlockBegin");
        self.pair(2, name);
        self.pair(70, 0);
        self.point(10, base_point);
        self.pair(3, name);
        self.pair(1, "");
    }

    fn block_end(&mut self) {
        self.pair(0, "ENDBLK");
        self.handle();
        self.pair(100, "AcDbEntity");
        self.pair(8, "0");
        self.pair(100, "AcDbBlockEnd");
    }

    fn entity_common(&mut self, kind: &str, entity: &Entity) {
        self.pair(0, kind);
        self.handle();
        self.pair(100, "AcDbEntity");
        self.pair(8, entity.layer_name());
        let color = entity.color();
        if !color.is_by_layer() {
            self.pair(62, color.index());
        }
    }

    fn entity(&mut self, entity: &Entity) {
        match entity {
            Entity::Line(line) => {
                self.entity_common("LINE", entity);
                self.pair(100, "AcDbLine");
                self.point(10, line.start);
                self.point(11, line.end);
            }
            Entity::Circle(circle) => {
                self.entity_common("CIRCLE", entity);
                self.pair(100, "AcDbCircle");
                self.point(10, circle.center);
                self.real(40, circle.radius);
            }
            Entity::Arc(arc) => {
                self.entity_common("ARC", entity);
                self.pair(100, "AcDbCircle");
                self.point(10, arc.center);
                self.real(40, arc.radius);
                self.pair(100, "AcDbArc");
                self.real(50, arc.start_angle.to_degrees());
                self.real(51, arc.end_angle.to_degrees());
            }
            Entity::Ellipse(ellipse) => {
                self.entity_common("ELLIPSE", entity);
                self.pair(100, "AcDbEllipse");
                self.point(10, ellipse.center);
                self.real(11, ellipse.major_axis.x());
                self.real(21, ellipse.major_axis.y());
                self.real(31, 0.0);
                self.real(40, ellipse.ratio);
                self.real(41, ellipse.start_parameter);
                self.real(42, ellipse.end_parameter);
            }
            Entity::Polyline(polyline) => {
                self.entity_common("LWPOLYLINE", entity);
                self.pair(100, "AcDbPolyline");
                self.pair(90, polyline.vertices.len());
                self.pair(70, if polyline.is_closed { 1 } else { 0 });
                for vertex in &polyline.vertices {
                    self.real(10, vertex.position.x());
                    self.real(20, vertex.position.y());
                    if vertex.bulge != 0.0 {
                        self.real(42, vertex.bulge);
                    }
                }
            }
            Entity::Spline(spline) => {
                self.entity_common("SPLINE", entity);
                self.pair(100, "AcDbSpline");
                let mut flags = 0;
                if spline.is_closed {
                    flags |= 0x01;
                }
                if spline.is_periodic {
                    flags |= 0x02;
                }
                if spline.is_rational {
                    flags |= 0x04;
                }
                self.pair(70, flags);
                self.pair(71, spline.degree);
                self.pair(72, spline.knot_values.len());
                self.pair(73, spline.control_points.len());
                self.pair(74, spline.fit_points.len());
                for knot in &spline.knot_values {
                    self.real(40, *knot);
                }
                for weight in &spline.weights {
                    self.real(41, *weight);
                }
                for point in &spline.control_points {
                    self.point(10, *point);
                }
                for point in &spline.fit_points {
                    self.point(11, *point);
                }
            }
            Entity::Point(point) => {
                self.entity_common("POINT", entity);
                self.pair(100, "AcDbPoint");
                self.point(10, point.position);
            }
            Entity::Text(text) => {
                self.entity_common("TEXT", entity);
                self.pair(100, "AcDbText");
                self.point(10, text.insert);
                self.real(40, text.height);
                self.pair(1, &text.content);
                if text.rotation != 0.0 {
                    self.real(50, text.rotation.to_degrees());
                }
                self.pair(100, "AcDbText");
            }
            Entity::BlockReference(reference) => {
                self.entity_common("INSERT", entity);
                self.pair(100, "AcDbBlockReference");
                self.pair(2, &reference.name);
                self.point(10, reference.insert);
                if reference.scale != Vector2::new(1.0, 1.0) {
                    self.real(41, reference.scale.x());
                    self.real(42, reference.scale.y());
                }
                if reference.rotation != 0.0 {
                    self.real(50, reference.rotation.to_degrees());
                }
            }
            Entity::Unknown(_) => {
                // 读取时已丢失几何数据，无法输出
            }
        }
    }
}

fn format_real(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

fn parse_color(raw: &str) -> Result<Color, DxfError> {
    parse_i16(raw, "颜色索引（组码 62）").map(Color::from_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_skips_blank_trailing_lines_and_comments() {
        let source = "999\ncomment\n  0\nSECTION\n  2\nENTITIES\n  0\nENDSEC\n  0\nEOF\n\n\n";
        let document = DxfFacade::new().parse_str(source).expect("parse");
        assert_eq!(document.entity_count(), 0);
    }

    #[test]
    fn missing_value_line_is_reported() {
        let err = DxfFacade::new().parse_str("  0\nSECTION\n  2").unwrap_err();
        assert!(matches!(err, IoError::InvalidDocument(_)));
    }

    #[test]
    fn real_values_keep_precision() {
        assert_eq!(format_real(8.5), "8.5");
        assert_eq!(format_real(961.0), "961.0");
        assert_eq!(format_real(-0.125), "-0.125");
    }
}
