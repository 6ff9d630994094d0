pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，坐标单位为毫米。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        pub const ORIGIN: Point2 = Point2(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，主要用于平移偏移量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        pub const ZERO: Vector2 = Vector2(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            start.vector_to(end)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算文档/实体范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        /// 退化为单点（宽高均为 0）的范围。
        #[inline]
        pub fn is_degenerate(&self) -> bool {
            !self.is_empty() && self.min == self.max
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let min_vec = self.min.as_vec2();
            let max_vec = self.max.as_vec2();
            let center = (min_vec + max_vec) * 0.5;
            Point2::from_vec(center)
        }
    }
}

pub mod document {
    use std::collections::HashMap;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    use glam::DVec2;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{Bounds2D, Point2, Vector2};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// AutoCAD 颜色索引（ACI），256 表示随层。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Color(i16);

    impl Color {
        pub const BY_BLOCK: Color = Color(0);
        pub const RED: Color = Color(1);
        pub const YELLOW: Color = Color(2);
        pub const BY_LAYER: Color = Color(256);

        #[inline]
        pub fn from_index(index: i16) -> Self {
            Self(index)
        }

        #[inline]
        pub fn index(self) -> i16 {
            self.0
        }

        #[inline]
        pub fn is_by_layer(self) -> bool {
            self.0 == Self::BY_LAYER.0
        }
    }

    impl Default for Color {
        fn default() -> Self {
            Self::BY_LAYER
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
            }
        }
    }

    /// 单个实体无法复制/平移时的原因。调用方按实体粒度处理，不会中断整批操作。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum TransformError {
        #[error("entity kind {0} cannot be transformed")]
        Unsupported(String),
        #[error("{0} produced non-finite coordinates")]
        NonFinite(&'static str),
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Ellipse(Ellipse),
        Polyline(Polyline),
        Spline(Spline),
        Point(PointEntity),
        Text(Text),
        BlockReference(BlockReference),
        Unknown(UnknownEntity),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Ellipse(ellipse) => &ellipse.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Spline(spline) => &spline.layer,
                Entity::Point(point) => &point.layer,
                Entity::Text(text) => &text.layer,
                Entity::BlockReference(reference) => &reference.layer,
                Entity::Unknown(unknown) => &unknown.layer,
            }
        }

        #[inline]
        pub fn color(&self) -> Color {
            match self {
                Entity::Line(line) => line.color,
                Entity::Circle(circle) => circle.color,
                Entity::Arc(arc) => arc.color,
                Entity::Ellipse(ellipse) => ellipse.color,
                Entity::Polyline(polyline) => polyline.color,
                Entity::Spline(spline) => spline.color,
                Entity::Point(point) => point.color,
                Entity::Text(text) => text.color,
                Entity::BlockReference(reference) => reference.color,
                Entity::Unknown(unknown) => unknown.color,
            }
        }

        /// DXF 实体类型名，用于日志。
        pub fn kind(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::Ellipse(_) => "ELLIPSE",
                Entity::Polyline(_) => "LWPOLYLINE",
                Entity::Spline(_) => "SPLINE",
                Entity::Point(_) => "POINT",
                Entity::Text(_) => "TEXT",
                Entity::BlockReference(_) => "INSERT",
                Entity::Unknown(unknown) => &unknown.kind,
            }
        }

        /// 计算实体的 2D 轴对齐范围。
        ///
        /// 没有几何尺寸的对象（文字、点、块参照、未知类型）以及退化或含非有限坐标的实体返回 `None`，
        /// 由调用方跳过。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Line(line) => {
                    bounds.include_point(line.start);
                    bounds.include_point(line.end);
                }
                Entity::Circle(circle) => {
                    let radius = circle.radius.abs();
                    let center = circle.center;
                    bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
                    bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
                }
                Entity::Arc(arc) => {
                    arc_bounds(arc, &mut bounds);
                }
                Entity::Ellipse(ellipse) => {
                    ellipse_bounds(ellipse, &mut bounds);
                }
                Entity::Polyline(polyline) => {
                    polyline_bounds(polyline, &mut bounds);
                }
                Entity::Spline(spline) => {
                    for point in spline.control_points.iter().chain(spline.fit_points.iter()) {
                        bounds.include_point(*point);
                    }
                }
                Entity::Point(_)
                | Entity::Text(_)
                | Entity::BlockReference(_)
                | Entity::Unknown(_) => {}
            }
            let usable = !bounds.is_empty()
                && !bounds.is_degenerate()
                && bounds.min().is_finite()
                && bounds.max().is_finite();
            if usable { Some(bounds) } else { None }
        }

        /// 返回平移后的独立副本，原实体保持不变。
        pub fn translated(&self, offset: Vector2) -> Result<Entity, TransformError> {
            let moved = match self {
                Entity::Line(line) => Entity::Line(Line {
                    start: line.start.translate(offset),
                    end: line.end.translate(offset),
                    ..line.clone()
                }),
                Entity::Circle(circle) => Entity::Circle(Circle {
                    center: circle.center.translate(offset),
                    ..circle.clone()
                }),
                Entity::Arc(arc) => Entity::Arc(Arc {
                    center: arc.center.translate(offset),
                    ..arc.clone()
                }),
                Entity::Ellipse(ellipse) => Entity::Ellipse(Ellipse {
                    center: ellipse.center.translate(offset),
                    ..ellipse.clone()
                }),
                Entity::Polyline(polyline) => Entity::Polyline(Polyline {
                    vertices: polyline
                        .vertices
                        .iter()
                        .map(|vertex| PolylineVertex {
                            position: vertex.position.translate(offset),
                            bulge: vertex.bulge,
                        })
                        .collect(),
                    ..polyline.clone()
                }),
                Entity::Spline(spline) => Entity::Spline(Spline {
                    control_points: spline
                        .control_points
                        .iter()
                        .map(|point| point.translate(offset))
                        .collect(),
                    fit_points: spline
                        .fit_points
                        .iter()
                        .map(|point| point.translate(offset))
                        .collect(),
                    ..spline.clone()
                }),
                Entity::Point(point) => Entity::Point(PointEntity {
                    position: point.position.translate(offset),
                    ..point.clone()
                }),
                Entity::Text(text) => Entity::Text(Text {
                    insert: text.insert.translate(offset),
                    ..text.clone()
                }),
                Entity::BlockReference(reference) => Entity::BlockReference(BlockReference {
                    insert: reference.insert.translate(offset),
                    ..reference.clone()
                }),
                Entity::Unknown(unknown) => {
                    return Err(TransformError::Unsupported(unknown.kind.clone()));
                }
            };
            if moved.is_finite() {
                Ok(moved)
            } else {
                Err(TransformError::NonFinite(self.kind_static()))
            }
        }

        /// 检查所有坐标与标量是否为有限值。
        pub fn is_finite(&self) -> bool {
            match self {
                Entity::Line(line) => line.start.is_finite() && line.end.is_finite(),
                Entity::Circle(circle) => circle.center.is_finite() && circle.radius.is_finite(),
                Entity::Arc(arc) => {
                    arc.center.is_finite()
                        && arc.radius.is_finite()
                        && arc.start_angle.is_finite()
                        && arc.end_angle.is_finite()
                }
                Entity::Ellipse(ellipse) => {
                    ellipse.center.is_finite()
                        && ellipse.major_axis.as_vec2().is_finite()
                        && ellipse.ratio.is_finite()
                }
                Entity::Polyline(polyline) => polyline
                    .vertices
                    .iter()
                    .all(|vertex| vertex.position.is_finite() && vertex.bulge.is_finite()),
                Entity::Spline(spline) => spline
                    .control_points
                    .iter()
                    .chain(spline.fit_points.iter())
                    .all(|point| point.is_finite()),
                Entity::Point(point) => point.position.is_finite(),
                Entity::Text(text) => text.insert.is_finite() && text.height.is_finite(),
                Entity::BlockReference(reference) => reference.insert.is_finite(),
                Entity::Unknown(_) => true,
            }
        }

        fn kind_static(&self) -> &'static str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::Ellipse(_) => "ELLIPSE",
                Entity::Polyline(_) => "LWPOLYLINE",
                Entity::Spline(_) => "SPLINE",
                Entity::Point(_) => "POINT",
                Entity::Text(_) => "TEXT",
                Entity::BlockReference(_) => "INSERT",
                Entity::Unknown(_) => "UNKNOWN",
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    /// 圆弧实体，角度以弧度形式储存，遵循数学正方向。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    /// 椭圆实体，记录主轴向量与参数范围（单位为弧度）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Ellipse {
        pub center: Point2,
        pub major_axis: Vector2,
        pub ratio: f64,
        pub start_parameter: f64,
        pub end_parameter: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub degree: i32,
        pub is_rational: bool,
        pub is_closed: bool,
        pub is_periodic: bool,
        pub control_points: Vec<Point2>,
        pub fit_points: Vec<Point2>,
        pub knot_values: Vec<f64>,
        pub weights: Vec<f64>,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PointEntity {
        pub position: Point2,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    /// 读取时无法识别的实体，仅保留类型名与图层，无法参与几何运算。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UnknownEntity {
        pub kind: String,
        pub layer: String,
        #[serde(default)]
        pub color: Color,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                base_point: Point2::ORIGIN,
                entities: Vec::new(),
            }
        }
    }

    /// 图纸文档：模型空间实体 + 按插入顺序保存的块表。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: Vec<BlockDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insertion_units: Option<i16>,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        /// `$INSUNITS` 头变量（4 = 毫米）。
        #[inline]
        pub fn insertion_units(&self) -> Option<i16> {
            self.insertion_units
        }

        #[inline]
        pub fn set_insertion_units(&mut self, units: Option<i16>) {
            self.insertion_units = units;
        }

        pub fn add_line(
            &mut self,
            start: Point2,
            end: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Line(Line {
                start,
                end,
                layer: layer.into(),
                color: Color::BY_LAYER,
            }))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Circle(Circle {
                center,
                radius,
                layer: layer.into(),
                color: Color::BY_LAYER,
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            points: I,
            is_closed: bool,
            layer: impl Into<String>,
            color: Color,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let vertices = points.into_iter().map(PolylineVertex::new).collect();
            self.add_entity(Entity::Polyline(Polyline {
                vertices,
                is_closed,
                layer: layer.into(),
                color,
            }))
        }

        /// 插入块参照。仅做平移，缩放固定为 1、旋转为 0。
        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
                layer: layer.into(),
                color: Color::BY_LAYER,
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        /// 注册块定义并返回其在块表中的下标；同名定义会被替换。
        pub fn add_block_definition(&mut self, definition: BlockDefinition) -> usize {
            for entity in &definition.entities {
                self.ensure_layer(entity.layer_name());
            }
            if let Some(index) = self.block_position(&definition.name) {
                self.blocks[index] = definition;
                return index;
            }
            self.blocks.push(definition);
            self.blocks.len() - 1
        }

        /// 向已存在的块追加实体，块不存在时返回 `false`。
        pub fn add_block_entity(&mut self, block_name: &str, entity: Entity) -> bool {
            let Some(index) = self.block_position(block_name) else {
                return false;
            };
            self.ensure_layer(entity.layer_name());
            self.blocks[index].entities.push(entity);
            true
        }

        #[inline]
        pub fn has_block(&self, name: &str) -> bool {
            self.block_position(name).is_some()
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.block_position(name).map(|index| &self.blocks[index])
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.iter()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities.iter().find_map(|(entity_id, entity)| {
                if entity_id.get() == id.get() {
                    Some(entity)
                } else {
                    None
                }
            })
        }

        fn block_position(&self, name: &str) -> Option<usize> {
            self.blocks.iter().position(|block| block.name == name)
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

    fn normalize_angle(angle: f64) -> f64 {
        let mut result = angle % TAU;
        if result < 0.0 {
            result += TAU;
        }
        result
    }

    fn canonical_interval(start: f64, end: f64) -> (f64, f64) {
        let start = normalize_angle(start);
        let mut end = normalize_angle(end);
        if (end - start).abs() < 1e-9 {
            end = start + TAU;
        } else if end < start {
            end += TAU;
        }
        (start, end)
    }

    fn arc_point(center: Point2, radius: f64, angle: f64) -> Point2 {
        let offset = Vector2::new(radius * angle.cos(), radius * angle.sin());
        center.translate(offset)
    }

    fn arc_bounds(arc: &Arc, bounds: &mut Bounds2D) {
        let radius = arc.radius.abs();
        if radius <= f64::EPSILON {
            bounds.include_point(arc.center);
            return;
        }

        let (start, end) = canonical_interval(arc.start_angle, arc.end_angle);
        bounds.include_point(arc_point(arc.center, radius, start));
        bounds.include_point(arc_point(arc.center, radius, end));

        const QUADRANTS: [f64; 4] = [0.0, FRAC_PI_2, PI, FRAC_PI_2 * 3.0];
        for base in QUADRANTS {
            let mut candidate = base;
            while candidate < start {
                candidate += TAU;
            }
            if candidate <= end {
                bounds.include_point(arc_point(arc.center, radius, candidate));
            }
        }
    }

    fn ellipse_bounds(ellipse: &Ellipse, bounds: &mut Bounds2D) {
        let major_vec = ellipse.major_axis.as_vec2();
        let major_length = major_vec.length();

        if major_length <= f64::EPSILON {
            bounds.include_point(ellipse.center);
            return;
        }
        let minor_length = major_length * ellipse.ratio.abs();
        let major_dir = major_vec / major_length;
        let minor_dir = DVec2::new(-major_dir.y, major_dir.x);
        let minor_vec = minor_dir * minor_length;

        let start = ellipse.start_parameter;
        let mut end = ellipse.end_parameter;
        if (end - start).abs() < 1e-9 {
            end = start + TAU;
        } else if end < start {
            while end < start {
                end += TAU;
            }
        }
        let span = end - start;
        let step_count = ((span / (TAU / 64.0)).ceil() as usize).max(16);
        for i in 0..=step_count {
            let t = start + span * (i as f64 / step_count as f64);
            let offset = major_vec * t.cos() + minor_vec * t.sin();
            let point = ellipse.center.translate(Vector2::from(offset));
            bounds.include_point(point);
        }
    }

    fn polyline_bounds(polyline: &Polyline, bounds: &mut Bounds2D) {
        let count = polyline.vertices.len();
        for (index, vertex) in polyline.vertices.iter().enumerate() {
            bounds.include_point(vertex.position);
            let next = if index + 1 < count {
                Some(&polyline.vertices[index + 1])
            } else if polyline.is_closed && count > 1 {
                Some(&polyline.vertices[0])
            } else {
                None
            };
            if let Some(next) = next {
                polyline_segment_bounds(vertex.position, next.position, vertex.bulge, bounds);
            }
        }
    }

    fn polyline_segment_bounds(start: Point2, end: Point2, bulge: f64, bounds: &mut Bounds2D) {
        if bulge.abs() <= 1e-9 {
            return;
        }

        let start_vec = start.as_vec2();
        let end_vec = end.as_vec2();
        let chord = end_vec - start_vec;
        let chord_len = chord.length();
        if chord_len <= f64::EPSILON {
            return;
        }

        let theta = 4.0 * bulge.atan();
        let half_theta = theta / 2.0;
        let sin_half = half_theta.sin();
        if sin_half.abs() <= 1e-9 {
            return;
        }

        let radius = chord_len / (2.0 * sin_half);
        let midpoint = (start_vec + end_vec) * 0.5;
        // 圆心位于弦中垂线上，距弦中点 r·cos(θ/2)，bulge 为正时在弦的左侧。
        let left = DVec2::new(-chord.y, chord.x) / chord_len;
        let center_vec = midpoint + left * (radius * half_theta.cos());
        let center = Point2::from_vec(center_vec);

        let start_dir = start_vec - center_vec;
        let start_angle = start_dir.y.atan2(start_dir.x);
        let (arc_start, arc_end) = if theta >= 0.0 {
            (start_angle, start_angle + theta)
        } else {
            (start_angle + theta, start_angle)
        };

        let arc = Arc {
            center,
            radius: radius.abs(),
            start_angle: arc_start,
            end_angle: arc_end,
            layer: String::new(),
            color: Color::BY_LAYER,
        };
        arc_bounds(&arc, bounds);
    }

}
