//! 读写两个方向的转换入口。

use cadbridge_core::{
    drawing::{
        DEFAULT_DIMENSION_TEXT_HEIGHT, Drawing, HatchBoundary, HatchEdge, PolylineVertex,
    },
    geometry::Point2,
    interchange::{CadData, HatchPath, LayerRecord},
};
use tracing::{debug, info};

use crate::flatten::flatten;
use crate::graph::{EntityGraphBuilder, attachment_for_anchor};
use crate::matcher::{MatchOptions, SpatialMatcher};
use crate::reconstruct::DimensionReconstructor;

/// 该图层只承载标注定义点，由 CAD 软件自动维护。
const DEFPOINTS_LAYER: &str = "Defpoints";

/// 图纸 → 交换数据：建实体图、做空间匹配。
pub fn read_drawing(drawing: &Drawing, options: &MatchOptions) -> CadData {
    debug!(kinds = ?drawing.kind_counts(), "输入图纸实体统计");
    let graph = EntityGraphBuilder::build(drawing);
    let data = SpatialMatcher::new(*options).match_all(graph);
    let entities = &data.entities;
    info!(
        tolerance = options.tolerance,
        layers = data.layers.len(),
        lines = entities.line.len(),
        arcs = entities.arc.len(),
        circles = entities.circle.len(),
        texts = entities.mtext.len(),
        dimensions = entities.dimension.len(),
        hatches = entities.hatch.len(),
        "图纸读取完成"
    );
    data
}

/// 交换数据 → 图纸：合并整棵组合图后逐节点绘制。
pub fn write_drawing(data: &CadData) -> Drawing {
    let pool = flatten(data);
    let reconstructor = DimensionReconstructor::new(&pool);
    let mut drawing = Drawing::new();

    for layer in collect_layers(data) {
        if layer.name == DEFPOINTS_LAYER {
            continue;
        }
        drawing.add_layer(layer.name.clone(), layer.color);
    }

    let mut skipped = 0usize;
    let mut stack = vec![data];
    while let Some(node) = stack.pop() {
        skipped += draw_node(&mut drawing, node, &reconstructor);
        for partner in node.partners.iter().rev() {
            stack.push(partner);
        }
        for component in node.components.data.iter().rev() {
            stack.push(component);
        }
    }

    info!(
        nodes = data.node_count(),
        layers = drawing.layers().count(),
        entities = drawing.entity_count(),
        kinds = ?drawing.kind_counts(),
        skipped_dimensions = skipped,
        "图纸生成完成"
    );
    drawing
}

/// 按 自身、partners、components 的顺序收集全部图层。
fn collect_layers(root: &CadData) -> Vec<&LayerRecord> {
    let mut layers = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        layers.extend(node.layers.values());
        for child in node.components.data.iter().rev() {
            stack.push(child);
        }
        for partner in node.partners.iter().rev() {
            stack.push(partner);
        }
    }
    layers
}

/// 绘制单个节点自身的实体，返回被跳过的标注数量。
fn draw_node(
    drawing: &mut Drawing,
    node: &CadData,
    reconstructor: &DimensionReconstructor<'_>,
) -> usize {
    let entities = &node.entities;
    for line in entities.line.values() {
        drawing.add_line(line.start, line.end, line.layer.clone(), line.color);
    }
    for circle in entities.circle.values() {
        drawing.add_circle(circle.center, circle.radius, circle.layer.clone(), circle.color);
    }
    for arc in entities.arc.values() {
        drawing.add_arc(
            arc.center,
            arc.radius,
            arc.start_angle,
            arc.end_angle,
            !arc.clockwise,
            arc.layer.clone(),
            arc.color,
        );
    }
    for mtext in entities.mtext.values() {
        let height = if mtext.font_size > 0.0 {
            mtext.font_size
        } else {
            DEFAULT_DIMENSION_TEXT_HEIGHT
        };
        drawing.add_mtext(
            mtext.insert,
            mtext.text.clone(),
            height,
            attachment_for_anchor(mtext.anchor),
            mtext.layer.clone(),
            mtext.color,
        );
    }

    let mut skipped = 0;
    for dimension in entities.dimension.values() {
        match reconstructor.reconstruct(dimension) {
            Some(linear) => drawing.add_linear_dimension(linear),
            None => skipped += 1,
        }
    }

    for hatch in entities.hatch.values() {
        let boundaries = hatch
            .paths
            .iter()
            .map(|path| match path {
                HatchPath::Edges { edges } => HatchBoundary::Edges(
                    edges
                        .iter()
                        .map(|edge| HatchEdge::Line {
                            start: Point2::new(edge.start[0], edge.start[1]),
                            end: Point2::new(edge.end[0], edge.end[1]),
                        })
                        .collect(),
                ),
                HatchPath::Polyline { vertices } => HatchBoundary::Polyline {
                    vertices: vertices
                        .iter()
                        .map(|[x, y, bulge]| {
                            PolylineVertex::with_bulge(Point2::new(*x, *y), *bulge)
                        })
                        .collect(),
                    is_closed: true,
                },
            })
            .collect();
        drawing.add_hatch(boundaries, hatch.layer.clone(), hatch.color);
    }

    if skipped > 0 {
        debug!(skipped, "部分标注未能重建");
    }
    skipped
}
