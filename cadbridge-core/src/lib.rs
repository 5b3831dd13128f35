pub mod interchange;

pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，序列化为 `[x, y]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
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
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        /// 补零 Z 分量得到三维点。
        #[inline]
        pub fn extend(self, z: f64) -> Point3 {
            Point3(self.0.extend(z))
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        /// 单位化，长度为 0 时返回 `None`。
        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        /// 逆时针旋转 90° 得到的左法向。
        #[inline]
        pub fn perp(self) -> Self {
            Self(self.0.perp())
        }

        #[inline]
        pub fn dot(self, other: Vector2) -> f64 {
            self.0.dot(other.0)
        }

        #[inline]
        pub fn cross(self, other: Vector2) -> f64 {
            self.0.perp_dot(other.0)
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

    /// 三维点。交换格式中写作 `[x, y, z]`，读取时也接受只有 `[x, y]` 的数组。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(try_from = "Vec<f64>", into = "[f64; 3]")]
    pub struct Point3(pub DVec3);

    impl Point3 {
        pub const ORIGIN: Point3 = Point3(DVec3::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
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
        pub fn z(self) -> f64 {
            self.0.z
        }

        /// 丢弃 Z 分量，空间匹配只在 XY 平面上进行。
        #[inline]
        pub fn truncate(self) -> Point2 {
            Point2(self.0.truncate())
        }

        #[inline]
        pub fn midpoint(self, other: Point3) -> Self {
            Self((self.0 + other.0) * 0.5)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    impl TryFrom<Vec<f64>> for Point3 {
        type Error = String;

        fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
            match value.as_slice() {
                [x, y] => Ok(Self::new(*x, *y, 0.0)),
                [x, y, z, ..] => Ok(Self::new(*x, *y, *z)),
                other => Err(format!("坐标至少需要 2 个分量，实际为 {}", other.len())),
            }
        }
    }

    impl From<Point3> for [f64; 3] {
        fn from(value: Point3) -> Self {
            value.0.to_array()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn point3_accepts_two_component_arrays() {
            let point: Point3 = serde_json::from_str("[1.5, -2.0]").expect("解析二维坐标");
            assert_eq!(point, Point3::new(1.5, -2.0, 0.0));
            let point: Point3 = serde_json::from_str("[1, 2, 3]").expect("解析三维坐标");
            assert_eq!(point, Point3::new(1.0, 2.0, 3.0));
            assert!(serde_json::from_str::<Point3>("[1]").is_err());
        }

        #[test]
        fn point3_serializes_as_triplet() {
            let json = serde_json::to_string(&Point3::new(1.0, 2.0, 0.0)).unwrap();
            assert_eq!(json, "[1.0,2.0,0.0]");
        }

        #[test]
        fn perpendicular_is_left_normal() {
            let dir = Vector2::new(1.0, 0.0);
            let normal = dir.perp();
            assert!((normal.x() - 0.0).abs() < 1e-12);
            assert!((normal.y() - 1.0).abs() < 1e-12);
            assert!((dir.cross(normal) - 1.0).abs() < 1e-12);
        }
    }
}

pub mod drawing {
    use std::collections::HashMap;

    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Point3};

    /// ACI 颜色 256 表示“随层”。
    pub const COLOR_BY_LAYER: i32 = 256;
    pub const DEFAULT_LAYER: &str = "0";
    pub const DEFAULT_DIMENSION_STYLE: &str = "Standard";
    /// DIMSTYLE 未声明 `dimtxt` 时的文字高度。
    pub const DEFAULT_DIMENSION_TEXT_HEIGHT: f64 = 2.5;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DrawingLayer {
        pub name: String,
        pub color: i32,
    }

    impl DrawingLayer {
        #[inline]
        pub fn new(name: impl Into<String>, color: i32) -> Self {
            Self {
                name: name.into(),
                color,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DimensionStyle {
        pub name: String,
        pub text_height: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum DrawingEntity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Text(Text),
        MText(MText),
        Dimension(Dimension),
        Hatch(Hatch),
        LwPolyline(LwPolyline),
        /// 读取时遇到但未建模的实体，只保留类型名与公共属性。
        Other {
            kind: String,
            layer: String,
            color: i32,
        },
    }

    impl DrawingEntity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                DrawingEntity::Line(line) => &line.layer,
                DrawingEntity::Circle(circle) => &circle.layer,
                DrawingEntity::Arc(arc) => &arc.layer,
                DrawingEntity::Text(text) => &text.layer,
                DrawingEntity::MText(mtext) => &mtext.layer,
                DrawingEntity::Dimension(dimension) => &dimension.layer,
                DrawingEntity::Hatch(hatch) => &hatch.layer,
                DrawingEntity::LwPolyline(polyline) => &polyline.layer,
                DrawingEntity::Other { layer, .. } => layer,
            }
        }

        #[inline]
        pub fn color(&self) -> i32 {
            match self {
                DrawingEntity::Line(line) => line.color,
                DrawingEntity::Circle(circle) => circle.color,
                DrawingEntity::Arc(arc) => arc.color,
                DrawingEntity::Text(text) => text.color,
                DrawingEntity::MText(mtext) => mtext.color,
                DrawingEntity::Dimension(dimension) => dimension.color,
                DrawingEntity::Hatch(hatch) => hatch.color,
                DrawingEntity::LwPolyline(polyline) => polyline.color,
                DrawingEntity::Other { color, .. } => *color,
            }
        }

        /// DXF 实体类型名。
        pub fn kind(&self) -> &str {
            match self {
                DrawingEntity::Line(_) => "LINE",
                DrawingEntity::Circle(_) => "CIRCLE",
                DrawingEntity::Arc(_) => "ARC",
                DrawingEntity::Text(_) => "TEXT",
                DrawingEntity::MText(_) => "MTEXT",
                DrawingEntity::Dimension(_) => "DIMENSION",
                DrawingEntity::Hatch(_) => "HATCH",
                DrawingEntity::LwPolyline(_) => "LWPOLYLINE",
                DrawingEntity::Other { kind, .. } => kind,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
        pub layer: String,
        pub color: i32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
        pub layer: String,
        pub color: i32,
    }

    /// 圆弧，角度以度为单位，始终按逆时针方向从起始角到终止角。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
        pub color: i32,
    }

    /// 单行文字，`content` 保留原始格式控制符。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point3,
        pub content: String,
        pub height: f64,
        pub layer: String,
        pub color: i32,
    }

    /// 多行文字，`content` 为组码 3/1 片段按顺序拼接后的原始字符串。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point3,
        pub content: String,
        pub height: f64,
        /// 附着点 1..=9（左上到右下）。
        pub attachment_point: i16,
        pub layer: String,
        pub color: i32,
    }

    /// 标注。三个定义点对应 DXF 组码 10/13/14。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Dimension {
        /// 尺寸线位置（组码 10）。
        pub definition_point: Point3,
        /// 第一条延伸线原点（组码 13）。
        pub first_point: Point3,
        /// 第二条延伸线原点（组码 14）。
        pub second_point: Point3,
        pub text_midpoint: Option<Point3>,
        pub text: Option<String>,
        pub style: String,
        /// 组码 70 原值。
        pub dimension_type: i16,
        /// 尺寸线旋转角（度）。
        pub rotation: f64,
        pub layer: String,
        pub color: i32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
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

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum HatchEdge {
        Line { start: Point2, end: Point2 },
        /// 圆弧、椭圆、样条等非直线边，仅记录类型码。
        Curve { edge_type: i32 },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum HatchBoundary {
        Edges(Vec<HatchEdge>),
        Polyline {
            vertices: Vec<PolylineVertex>,
            is_closed: bool,
        },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Hatch {
        pub pattern_name: String,
        pub is_solid: bool,
        pub boundaries: Vec<HatchBoundary>,
        pub layer: String,
        pub color: i32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LwPolyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub elevation: f64,
        pub layer: String,
        pub color: i32,
    }

    impl LwPolyline {
        /// 将多段线拆分为虚拟的 LINE/ARC 实体（bulge 为 0 的段为直线，否则为圆弧）。
        pub fn virtual_entities(&self) -> Vec<DrawingEntity> {
            let mut result = Vec::new();
            let count = self.vertices.len();
            if count < 2 {
                return result;
            }
            let segments = if self.is_closed { count } else { count - 1 };
            for index in 0..segments {
                let current = self.vertices[index];
                let next = self.vertices[(index + 1) % count];
                if current.position == next.position {
                    continue;
                }
                if current.bulge.abs() <= 1e-9 {
                    result.push(DrawingEntity::Line(Line {
                        start: current.position.extend(self.elevation),
                        end: next.position.extend(self.elevation),
                        layer: self.layer.clone(),
                        color: self.color,
                    }));
                } else if let Some(arc) =
                    bulge_to_arc(current.position, next.position, current.bulge)
                {
                    let (center, radius, start_angle, end_angle) = arc;
                    result.push(DrawingEntity::Arc(Arc {
                        center: center.extend(self.elevation),
                        radius,
                        start_angle,
                        end_angle,
                        layer: self.layer.clone(),
                        color: self.color,
                    }));
                }
            }
            result
        }
    }

    /// 由弦端点与 bulge 求圆弧：返回（圆心，半径，起始角，终止角），角度为逆时针度数。
    fn bulge_to_arc(start: Point2, end: Point2, bulge: f64) -> Option<(Point2, f64, f64, f64)> {
        let start_vec = start.as_vec2();
        let end_vec = end.as_vec2();
        let chord = end_vec - start_vec;
        let chord_len = chord.length();
        if chord_len <= f64::EPSILON {
            return None;
        }

        // 圆心位于弦中点沿左法向偏移 h 处，h 的符号随 bulge 方向变化。
        let offset = chord_len * (1.0 - bulge * bulge) / (4.0 * bulge);
        let normal = DVec2::new(-chord.y, chord.x) / chord_len;
        let center = (start_vec + end_vec) * 0.5 + normal * offset;
        let radius = chord_len * (1.0 + bulge * bulge) / (4.0 * bulge.abs());

        let start_dir = start_vec - center;
        let end_dir = end_vec - center;
        let start_angle = start_dir.y.atan2(start_dir.x).to_degrees();
        let end_angle = end_dir.y.atan2(end_dir.x).to_degrees();
        let (from, to) = if bulge > 0.0 {
            (start_angle, end_angle)
        } else {
            (end_angle, start_angle)
        };
        Some((
            Point2::from_vec(center),
            radius,
            normalize_degrees(from),
            normalize_degrees(to),
        ))
    }

    fn normalize_degrees(angle: f64) -> f64 {
        let mut result = angle % 360.0;
        if result < 0.0 {
            result += 360.0;
        }
        result
    }

    /// 写回路径上生成的线性标注。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LinearDimension {
        /// 尺寸线经过的点。
        pub base: Point3,
        pub first_point: Point3,
        pub second_point: Point3,
        /// 0° 为水平尺寸线，90° 为竖直尺寸线。
        pub rotation: f64,
        pub text: String,
        pub style: String,
        pub font_size: f64,
        pub layer: String,
        pub color: i32,
    }

    impl LinearDimension {
        /// 尺寸线与第二条延伸线的交点，写入 DXF 组码 10。
        pub fn definition_point(&self) -> Point3 {
            let angle = self.rotation.to_radians();
            let direction = DVec2::new(angle.cos(), angle.sin());
            let base = self.base.truncate().as_vec2();
            let target = self.second_point.truncate().as_vec2();
            let projected = base + direction * (target - base).dot(direction);
            Point2::from_vec(projected).extend(self.base.z())
        }

        pub fn text_midpoint(&self) -> Point3 {
            let angle = self.rotation.to_radians();
            let direction = DVec2::new(angle.cos(), angle.sin());
            let base = self.base.truncate().as_vec2();
            let first = self.first_point.truncate().as_vec2();
            let first_on_line = base + direction * (first - base).dot(direction);
            let second_on_line = self.definition_point().truncate().as_vec2();
            Point2::from_vec((first_on_line + second_on_line) * 0.5).extend(self.base.z())
        }
    }

    /// 原生图纸模型：读取侧由 DXF 解析器填充，写回侧通过 `add_*` 方法构建。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Drawing {
        layers: Vec<DrawingLayer>,
        dimension_styles: Vec<DimensionStyle>,
        entities: Vec<DrawingEntity>,
    }

    impl Drawing {
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &DrawingLayer> {
            self.layers.iter()
        }

        #[inline]
        pub fn dimension_styles(&self) -> impl Iterator<Item = &DimensionStyle> {
            self.dimension_styles.iter()
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &DrawingEntity> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        pub fn layer(&self, name: &str) -> Option<&DrawingLayer> {
            self.layers.iter().find(|layer| layer.name == name)
        }

        /// 新建或替换同名图层。
        pub fn add_layer(&mut self, name: impl Into<String>, color: i32) {
            let name = name.into();
            if let Some(existing) = self.layers.iter_mut().find(|layer| layer.name == name) {
                existing.color = color;
            } else {
                self.layers.push(DrawingLayer::new(name, color));
            }
        }

        /// 新建或更新同名标注样式的文字高度。
        pub fn set_dimension_style(&mut self, name: impl Into<String>, text_height: f64) {
            let name = name.into();
            if let Some(existing) = self
                .dimension_styles
                .iter_mut()
                .find(|style| style.name == name)
            {
                existing.text_height = text_height;
            } else {
                self.dimension_styles.push(DimensionStyle { name, text_height });
            }
        }

        /// 按样式名查询标注文字高度，大小写不敏感。
        pub fn dimension_text_height(&self, style: &str) -> Option<f64> {
            self.dimension_styles
                .iter()
                .find(|candidate| candidate.name.eq_ignore_ascii_case(style))
                .map(|candidate| candidate.text_height)
        }

        pub fn add_entity(&mut self, entity: DrawingEntity) {
            self.entities.push(entity);
        }

        pub fn add_line(
            &mut self,
            start: Point3,
            end: Point3,
            layer: impl Into<String>,
            color: i32,
        ) {
            self.entities.push(DrawingEntity::Line(Line {
                start,
                end,
                layer: layer.into(),
                color,
            }));
        }

        pub fn add_circle(
            &mut self,
            center: Point3,
            radius: f64,
            layer: impl Into<String>,
            color: i32,
        ) {
            self.entities.push(DrawingEntity::Circle(Circle {
                center,
                radius,
                layer: layer.into(),
                color,
            }));
        }

        /// 添加圆弧。`is_counter_clockwise` 为假时交换起止角，使存储的圆弧保持逆时针。
        pub fn add_arc(
            &mut self,
            center: Point3,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            is_counter_clockwise: bool,
            layer: impl Into<String>,
            color: i32,
        ) {
            let (start_angle, end_angle) = if is_counter_clockwise {
                (start_angle, end_angle)
            } else {
                (end_angle, start_angle)
            };
            self.entities.push(DrawingEntity::Arc(Arc {
                center,
                radius,
                start_angle,
                end_angle,
                layer: layer.into(),
                color,
            }));
        }

        pub fn add_mtext(
            &mut self,
            insert: Point3,
            content: impl Into<String>,
            height: f64,
            attachment_point: i16,
            layer: impl Into<String>,
            color: i32,
        ) {
            self.entities.push(DrawingEntity::MText(MText {
                insert,
                content: content.into(),
                height,
                attachment_point,
                layer: layer.into(),
                color,
            }));
        }

        /// 添加线性标注，同时把字高写入对应的标注样式。
        pub fn add_linear_dimension(&mut self, dimension: LinearDimension) {
            self.set_dimension_style(dimension.style.clone(), dimension.font_size);
            let definition_point = dimension.definition_point();
            let text_midpoint = dimension.text_midpoint();
            self.entities.push(DrawingEntity::Dimension(Dimension {
                definition_point,
                first_point: dimension.first_point,
                second_point: dimension.second_point,
                text_midpoint: Some(text_midpoint),
                text: Some(dimension.text),
                style: dimension.style,
                dimension_type: 0,
                rotation: dimension.rotation,
                layer: dimension.layer,
                color: dimension.color,
            }));
        }

        pub fn add_hatch(
            &mut self,
            boundaries: Vec<HatchBoundary>,
            layer: impl Into<String>,
            color: i32,
        ) {
            self.entities.push(DrawingEntity::Hatch(Hatch {
                pattern_name: "SOLID".to_string(),
                is_solid: true,
                boundaries,
                layer: layer.into(),
                color,
            }));
        }

        /// 各类实体数量。
        pub fn kind_counts(&self) -> HashMap<String, usize> {
            let mut counts = HashMap::new();
            for entity in &self.entities {
                *counts.entry(entity.kind().to_string()).or_insert(0) += 1;
            }
            counts
        }
    }

}
