//! 交换格式：JSON 字段名与下游消费者约定一致，不能随意改名。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::drawing::{COLOR_BY_LAYER, DEFAULT_DIMENSION_STYLE, DEFAULT_LAYER};
use crate::geometry::Point3;

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error("解析交换数据失败: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("序列化交换数据失败: {0}")]
    Encode(#[source] serde_json::Error),
}

/// 记录的 `type` 字段。TEXT 在交换格式里统一记为 MTEXT。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Line,
    Arc,
    Circle,
    Mtext,
    Dimension,
    Hatch,
}

impl EntityType {
    fn line() -> Self {
        EntityType::Line
    }

    fn arc() -> Self {
        EntityType::Arc
    }

    fn circle() -> Self {
        EntityType::Circle
    }

    fn mtext() -> Self {
        EntityType::Mtext
    }

    fn dimension() -> Self {
        EntityType::Dimension
    }

    fn hatch() -> Self {
        EntityType::Hatch
    }
}

fn default_layer() -> String {
    DEFAULT_LAYER.to_string()
}

fn default_color() -> i32 {
    COLOR_BY_LAYER
}

fn default_dimstyle() -> String {
    DEFAULT_DIMENSION_STYLE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub id: String,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub id: String,
    #[serde(rename = "type", default = "EntityType::line")]
    pub kind: EntityType,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i32,
    pub start: Point3,
    pub end: Point3,
    #[serde(rename = "mingzi", default)]
    pub label: String,
    #[serde(rename = "qujian", default)]
    pub tolerance_range: String,
    #[serde(rename = "gongshi", default)]
    pub formula: String,
}

impl LineRecord {
    pub fn new(
        id: impl Into<String>,
        layer: impl Into<String>,
        color: i32,
        start: Point3,
        end: Point3,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EntityType::Line,
            layer: layer.into(),
            color,
            start,
            end,
            label: String::new(),
            tolerance_range: String::new(),
            formula: String::new(),
        }
    }

    #[inline]
    pub fn midpoint(&self) -> Point3 {
        self.start.midpoint(self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

/// 标注定义点落在线段上的位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Start,
    End,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef {
    pub id: String,
    pub location: Role,
}

impl EndpointRef {
    pub fn new(id: impl Into<String>, location: Role) -> Self {
        Self {
            id: id.into(),
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub id: String,
    #[serde(rename = "type", default = "EntityType::dimension")]
    pub kind: EntityType,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i32,
    #[serde(default)]
    pub font_size: f64,
    #[serde(default = "default_dimstyle")]
    pub dimstyle: String,
    #[serde(default)]
    pub dimtype: i16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity1: Option<EndpointRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity2: Option<EndpointRef>,
    #[serde(rename = "mingzi", default)]
    pub label: String,
    #[serde(rename = "qujian", default)]
    pub tolerance_range: String,
}

impl DimensionRecord {
    /// 标注文字：名字，若有区间则以空格拼接。
    pub fn display_text(&self) -> String {
        if self.tolerance_range.is_empty() {
            self.label.clone()
        } else {
            format!("{} {}", self.label, self.tolerance_range)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MTextRecord {
    pub id: String,
    #[serde(rename = "type", default = "EntityType::mtext")]
    pub kind: EntityType,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub font_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<[f64; 2]>,
    pub insert: Point3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcRecord {
    pub id: String,
    #[serde(rename = "type", default = "EntityType::arc")]
    pub kind: EntityType,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i32,
    pub center: Point3,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    #[serde(default)]
    pub clockwise: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleRecord {
    pub id: String,
    #[serde(rename = "type", default = "EntityType::circle")]
    pub kind: EntityType,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i32,
    pub center: Point3,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchEdgeRecord {
    pub start: [f64; 2],
    pub end: [f64; 2],
}

/// 填充边界：直线边列表或 `[x, y, bulge]` 顶点列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HatchPath {
    Edges { edges: Vec<HatchEdgeRecord> },
    Polyline { vertices: Vec<[f64; 3]> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchRecord {
    pub id: String,
    #[serde(rename = "type", default = "EntityType::hatch")]
    pub kind: EntityType,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default = "default_color")]
    pub color: i32,
    #[serde(default)]
    pub paths: Vec<HatchPath>,
}

/// 按类型分桶的实体表，每个桶保持插入顺序。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBuckets {
    #[serde(default)]
    pub line: IndexMap<String, LineRecord>,
    #[serde(default)]
    pub arc: IndexMap<String, ArcRecord>,
    #[serde(default)]
    pub circle: IndexMap<String, CircleRecord>,
    #[serde(default)]
    pub mtext: IndexMap<String, MTextRecord>,
    #[serde(default)]
    pub dimension: IndexMap<String, DimensionRecord>,
    #[serde(default)]
    pub hatch: IndexMap<String, HatchRecord>,
}

impl EntityBuckets {
    pub fn len(&self) -> usize {
        self.line.len()
            + self.arc.len()
            + self.circle.len()
            + self.mtext.len()
            + self.dimension.len()
            + self.hatch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 浅合并：已存在的 id 不会被覆盖。
    pub fn absorb(&mut self, other: &EntityBuckets) {
        fn merge<T: Clone>(target: &mut IndexMap<String, T>, source: &IndexMap<String, T>) {
            for (id, record) in source {
                target.entry(id.clone()).or_insert_with(|| record.clone());
            }
        }
        merge(&mut self.line, &other.line);
        merge(&mut self.arc, &other.arc);
        merge(&mut self.circle, &other.circle);
        merge(&mut self.mtext, &other.mtext);
        merge(&mut self.dimension, &other.dimension);
        merge(&mut self.hatch, &other.hatch);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub data: Vec<CadData>,
    /// `connections` 等未建模字段原样保留。
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 一张图纸的交换表示，可通过 `partners`/`components.data` 嵌套子图。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CadData {
    #[serde(default)]
    pub layers: IndexMap<String, LayerRecord>,
    #[serde(default)]
    pub entities: EntityBuckets,
    #[serde(default)]
    pub partners: Vec<CadData>,
    #[serde(default)]
    pub components: Components,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CadData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, InterchangeError> {
        serde_json::from_str(input).map_err(InterchangeError::Decode)
    }

    pub fn to_json_string(&self, pretty: bool) -> Result<String, InterchangeError> {
        let encoded = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        encoded.map_err(InterchangeError::Encode)
    }

    /// 直接子图：先 partners，后 components.data。
    pub fn children(&self) -> impl Iterator<Item = &CadData> {
        self.partners.iter().chain(self.components.data.iter())
    }

    /// 整棵树的节点数（含自身）。
    pub fn node_count(&self) -> usize {
        1 + self.children().map(CadData::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "root",
        "name": "柜体",
        "conditions": ["a"],
        "layers": {
            "l1": {"id": "l1", "name": "0", "color": 7}
        },
        "entities": {
            "line": {
                "a": {"id": "a", "type": "LINE", "layer": "0", "color": 256,
                      "start": [0, 0], "end": [10, 0, 0],
                      "mingzi": "宽", "qujian": "5~10", "gongshi": ""}
            },
            "dimension": {
                "d": {"id": "d", "type": "DIMENSION", "layer": "0", "color": 256,
                      "font_size": 2.5, "dimstyle": "Standard", "dimtype": 32,
                      "axis": "y", "distance": 15,
                      "entity1": {"id": "a", "location": "start"},
                      "entity2": {"id": "a", "location": "end"},
                      "mingzi": "L", "qujian": ""}
            },
            "hatch": {
                "h": {"id": "h", "type": "HATCH", "layer": "0", "color": 1,
                      "paths": [{"edges": [{"start": [0, 0], "end": [1, 0]}]},
                                {"vertices": [[0, 0, 0], [1, 0, 0.5]]}]}
            }
        },
        "components": {"data": [], "connections": [{"ids": ["x"]}]}
    }"#;

    #[test]
    fn decode_reads_wire_names() {
        let data = CadData::from_json_str(SAMPLE).expect("解析样例");
        let line = &data.entities.line["a"];
        assert_eq!(line.start, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(line.label, "宽");
        assert_eq!(line.tolerance_range, "5~10");

        let dimension = &data.entities.dimension["d"];
        assert_eq!(dimension.axis, Some(Axis::Y));
        assert_eq!(dimension.distance, Some(15.0));
        assert_eq!(
            dimension.entity2,
            Some(EndpointRef::new("a", Role::End))
        );

        let hatch = &data.entities.hatch["h"];
        assert!(matches!(hatch.paths[0], HatchPath::Edges { .. }));
        assert!(matches!(hatch.paths[1], HatchPath::Polyline { .. }));
    }

    #[test]
    fn unknown_members_survive_round_trip() {
        let data = CadData::from_json_str(SAMPLE).expect("解析样例");
        let encoded = data.to_json_string(false).expect("序列化");
        let value: Value = serde_json::from_str(&encoded).expect("重新解析");
        assert_eq!(value["name"], "柜体");
        assert_eq!(value["conditions"][0], "a");
        assert_eq!(value["components"]["connections"][0]["ids"][0], "x");
        assert_eq!(value["entities"]["line"]["a"]["type"], "LINE");
        assert_eq!(value["entities"]["line"]["a"]["gongshi"], "");

        let again = CadData::from_json_str(&encoded).expect("二次解析");
        assert_eq!(again, data);
    }

    #[test]
    fn empty_composite_members_are_always_emitted() {
        let data = CadData::from_json_str(r#"{"partners": [], "components": {"data": []}}"#)
            .expect("空组合");
        let value: Value = serde_json::from_str(&data.to_json_string(false).unwrap()).unwrap();
        assert_eq!(value["partners"], serde_json::json!([]));
        assert_eq!(value["components"], serde_json::json!({"data": []}));

        let bare: Value = serde_json::to_value(CadData::new()).unwrap();
        assert_eq!(bare["partners"], serde_json::json!([]));
        assert_eq!(bare["components"]["data"], serde_json::json!([]));
    }

    #[test]
    fn optional_dimension_fields_are_omitted() {
        let record = DimensionRecord {
            id: "d".into(),
            kind: EntityType::Dimension,
            layer: "0".into(),
            color: COLOR_BY_LAYER,
            font_size: 2.5,
            dimstyle: "Standard".into(),
            dimtype: 0,
            axis: None,
            distance: None,
            entity1: None,
            entity2: None,
            label: "L".into(),
            tolerance_range: String::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("axis").is_none());
        assert!(value.get("entity1").is_none());
        assert_eq!(value["mingzi"], "L");
        assert_eq!(record.display_text(), "L");
    }

    #[test]
    fn display_text_joins_tolerance() {
        let mut data = CadData::from_json_str(SAMPLE).unwrap();
        let dimension = data.entities.dimension.get_mut("d").unwrap();
        dimension.tolerance_range = "5, 10".into();
        assert_eq!(dimension.display_text(), "L 5, 10");
    }

    #[test]
    fn empty_document_decodes_with_defaults() {
        let data = CadData::from_json_str("{}").expect("空对象");
        assert!(data.layers.is_empty());
        assert!(data.entities.is_empty());
        assert_eq!(data.node_count(), 1);
        assert!(CadData::from_json_str("[1, 2]").is_err());
    }

    #[test]
    fn absorb_keeps_first_occurrence() {
        let mut first = EntityBuckets::default();
        first.line.insert(
            "a".into(),
            LineRecord::new("a", "0", 1, Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0)),
        );
        let mut second = EntityBuckets::default();
        second.line.insert(
            "a".into(),
            LineRecord::new("a", "0", 2, Point3::ORIGIN, Point3::new(9.0, 0.0, 0.0)),
        );
        second.line.insert(
            "b".into(),
            LineRecord::new("b", "0", 3, Point3::ORIGIN, Point3::new(0.0, 1.0, 0.0)),
        );
        first.absorb(&second);
        assert_eq!(first.line.len(), 2);
        assert_eq!(first.line["a"].color, 1);
    }
}
