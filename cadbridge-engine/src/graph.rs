//! 实体图：为图纸中的每个实体分配 id 并按类型分桶，同时收集匹配阶段需要的标注与文字。

use cadbridge_core::{
    drawing::{
        DEFAULT_DIMENSION_TEXT_HEIGHT, Dimension, Drawing, DrawingEntity, Hatch, HatchBoundary,
        HatchEdge, MText, Text,
    },
    geometry::Point2,
    interchange::{
        ArcRecord, CadData, CircleRecord, DimensionRecord, EntityType, HatchEdgeRecord,
        HatchPath, HatchRecord, LayerRecord, LineRecord, MTextRecord,
    },
};
use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use crate::annotation::{Annotation, decompose};

/// TEXT 实体统一视为左上对齐。
const TEXT_ANCHOR: [f64; 2] = [0.0, 1.0];

/// 附着点 1..=9 对应单位正方形上的锚点，按行优先排列。
const ATTACHMENT_ANCHORS: [[f64; 2]; 9] = [
    [0.0, 0.0],
    [0.5, 0.0],
    [1.0, 0.0],
    [0.0, 0.5],
    [0.5, 0.5],
    [1.0, 0.5],
    [0.0, 1.0],
    [0.5, 1.0],
    [1.0, 1.0],
];

pub fn anchor_for_attachment(code: i16) -> Option<[f64; 2]> {
    usize::try_from(code)
        .ok()
        .and_then(|code| code.checked_sub(1))
        .and_then(|index| ATTACHMENT_ANCHORS.get(index).copied())
}

/// `anchor_for_attachment` 的逆映射，无法识别的锚点按 1 处理。
pub fn attachment_for_anchor(anchor: Option<[f64; 2]>) -> i16 {
    let Some([x, y]) = anchor else {
        return 1;
    };
    let column = (x.clamp(0.0, 1.0) * 2.0).round() as i16;
    let row = (y.clamp(0.0, 1.0) * 2.0).round() as i16;
    row * 3 + column + 1
}

/// 匹配阶段使用的标注工作记录，定义点与原始文字不会输出。
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDimension {
    pub record: DimensionRecord,
    /// 尺寸线位置（组码 10）。
    pub defpoint: Point2,
    /// 第一条延伸线原点（组码 13）。
    pub defpoint2: Point2,
    /// 第二条延伸线原点（组码 14）。
    pub defpoint3: Point2,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingText {
    pub record: MTextRecord,
    pub annotation: Annotation,
}

impl PendingText {
    #[inline]
    pub fn insert(&self) -> Point2 {
        self.record.insert.truncate()
    }
}

/// 构建结果：`data` 中已有图层与 line/arc/circle/hatch 桶，
/// 标注与文字暂存在工作列表中，匹配结束后再写入对应的桶。
#[derive(Debug, Default)]
pub struct EntityGraph {
    pub data: CadData,
    pub dimensions: IndexMap<String, PendingDimension>,
    pub texts: Vec<PendingText>,
}

impl EntityGraph {
    pub fn line_count(&self) -> usize {
        self.data.entities.line.len()
    }
}

pub struct EntityGraphBuilder<'a> {
    drawing: &'a Drawing,
    graph: EntityGraph,
}

impl<'a> EntityGraphBuilder<'a> {
    pub fn new(drawing: &'a Drawing) -> Self {
        Self {
            drawing,
            graph: EntityGraph::default(),
        }
    }

    pub fn build(drawing: &'a Drawing) -> EntityGraph {
        let mut builder = Self::new(drawing);
        for layer in drawing.layers() {
            let id = next_id();
            builder.graph.data.layers.insert(
                id.clone(),
                LayerRecord {
                    id,
                    name: layer.name.clone(),
                    color: layer.color,
                },
            );
        }
        for entity in drawing.entities() {
            builder.route(entity);
        }
        debug!(
            layers = builder.graph.data.layers.len(),
            lines = builder.graph.line_count(),
            dimensions = builder.graph.dimensions.len(),
            texts = builder.graph.texts.len(),
            "实体图构建完成"
        );
        builder.graph
    }

    fn route(&mut self, entity: &DrawingEntity) {
        let buckets = &mut self.graph.data.entities;
        match entity {
            DrawingEntity::Line(line) => {
                let id = next_id();
                buckets.line.insert(
                    id.clone(),
                    LineRecord::new(id, line.layer.clone(), line.color, line.start, line.end),
                );
            }
            DrawingEntity::Arc(arc) => {
                let id = next_id();
                buckets.arc.insert(
                    id.clone(),
                    ArcRecord {
                        id,
                        kind: EntityType::Arc,
                        layer: arc.layer.clone(),
                        color: arc.color,
                        center: arc.center,
                        radius: arc.radius,
                        start_angle: arc.start_angle,
                        end_angle: arc.end_angle,
                        clockwise: false,
                    },
                );
            }
            DrawingEntity::Circle(circle) => {
                let id = next_id();
                buckets.circle.insert(
                    id.clone(),
                    CircleRecord {
                        id,
                        kind: EntityType::Circle,
                        layer: circle.layer.clone(),
                        color: circle.color,
                        center: circle.center,
                        radius: circle.radius,
                    },
                );
            }
            DrawingEntity::Text(text) => self.push_text(text),
            DrawingEntity::MText(mtext) => self.push_mtext(mtext),
            DrawingEntity::Dimension(dimension) => self.push_dimension(dimension),
            DrawingEntity::Hatch(hatch) => {
                let id = next_id();
                buckets.hatch.insert(id.clone(), hatch_record(id, hatch));
            }
            DrawingEntity::LwPolyline(polyline) => {
                for part in polyline.virtual_entities() {
                    self.route(&part);
                }
            }
            DrawingEntity::Other { kind, layer, .. } => {
                debug!(kind = %kind, layer = %layer, "跳过未建模的实体");
            }
        }
    }

    fn push_text(&mut self, text: &Text) {
        let record = MTextRecord {
            id: next_id(),
            kind: EntityType::Mtext,
            layer: text.layer.clone(),
            color: text.color,
            text: String::new(),
            font_size: text.height,
            anchor: Some(TEXT_ANCHOR),
            insert: text.insert,
        };
        self.graph.texts.push(PendingText {
            record,
            annotation: decompose(Some(&text.content)),
        });
    }

    fn push_mtext(&mut self, mtext: &MText) {
        let record = MTextRecord {
            id: next_id(),
            kind: EntityType::Mtext,
            layer: mtext.layer.clone(),
            color: mtext.color,
            text: String::new(),
            font_size: mtext.height,
            anchor: anchor_for_attachment(mtext.attachment_point),
            insert: mtext.insert,
        };
        self.graph.texts.push(PendingText {
            record,
            annotation: decompose(Some(&mtext.content)),
        });
    }

    fn push_dimension(&mut self, dimension: &Dimension) {
        let id = next_id();
        let font_size = self
            .drawing
            .dimension_text_height(&dimension.style)
            .unwrap_or(DEFAULT_DIMENSION_TEXT_HEIGHT);
        let record = DimensionRecord {
            id: id.clone(),
            kind: EntityType::Dimension,
            layer: dimension.layer.clone(),
            color: dimension.color,
            font_size,
            dimstyle: dimension.style.clone(),
            dimtype: dimension.dimension_type,
            axis: None,
            distance: None,
            entity1: None,
            entity2: None,
            label: String::new(),
            tolerance_range: String::new(),
        };
        self.graph.dimensions.insert(
            id,
            PendingDimension {
                record,
                defpoint: dimension.definition_point.truncate(),
                defpoint2: dimension.first_point.truncate(),
                defpoint3: dimension.second_point.truncate(),
                annotation: decompose(dimension.text.as_deref()),
            },
        );
    }
}

fn hatch_record(id: String, hatch: &Hatch) -> HatchRecord {
    let mut paths = Vec::new();
    for boundary in &hatch.boundaries {
        match boundary {
            HatchBoundary::Edges(edges) if !edges.is_empty() => {
                let edges = edges
                    .iter()
                    .filter_map(|edge| match edge {
                        HatchEdge::Line { start, end } => Some(HatchEdgeRecord {
                            start: start.as_vec2().to_array(),
                            end: end.as_vec2().to_array(),
                        }),
                        HatchEdge::Curve { .. } => None,
                    })
                    .collect();
                paths.push(HatchPath::Edges { edges });
            }
            HatchBoundary::Polyline { vertices, .. } if !vertices.is_empty() => {
                paths.push(HatchPath::Polyline {
                    vertices: vertices
                        .iter()
                        .map(|vertex| [vertex.position.x(), vertex.position.y(), vertex.bulge])
                        .collect(),
                });
            }
            _ => {}
        }
    }
    HatchRecord {
        id,
        kind: EntityType::Hatch,
        layer: hatch.layer.clone(),
        color: hatch.color,
        paths,
    }
}

pub(crate) fn next_id() -> String {
    Uuid::new_v4().to_string()
}
