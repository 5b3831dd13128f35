//! 空间匹配：按容差带判断标注、文字属于哪条线段，并把拆解后的文字写到线段上。

use std::collections::HashSet;

use cadbridge_core::{
    geometry::{Point2, Vector2},
    interchange::{Axis, CadData, EndpointRef, LineRecord, Role},
};
use indexmap::IndexMap;
use tracing::debug;

use crate::annotation::Annotation;
use crate::graph::{EntityGraph, PendingDimension, PendingText};

pub const DEFAULT_TOLERANCE: f64 = 20.0;
pub const DEFAULT_AXIS_EPSILON: f64 = 0.1;

/// 浮点边界判断的余量，保证落在容差带边上的点被计入。
const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    pub tolerance: f64,
    pub axis_epsilon: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            axis_epsilon: DEFAULT_AXIS_EPSILON,
        }
    }
}

impl MatchOptions {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }
}

/// 线段两侧各偏移 `tolerance` 形成的矩形缓冲区。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferZone {
    start: Point2,
    end: Point2,
    direction: Vector2,
    normal: Vector2,
    length: f64,
    tolerance: f64,
}

impl BufferZone {
    /// 零长度线段没有方向，返回 `None`。
    pub fn around(start: Point2, end: Point2, tolerance: f64) -> Option<Self> {
        let chord = start.vector_to(end);
        let direction = chord.normalize()?;
        Some(Self {
            start,
            end,
            direction,
            normal: direction.perp(),
            length: chord.length(),
            tolerance,
        })
    }

    /// 四个角点，依次为起点左侧、终点左侧、终点右侧、起点右侧。
    pub fn corners(&self) -> [Point2; 4] {
        let offset = self.normal.scale(self.tolerance);
        [
            self.start.translate(offset),
            self.end.translate(offset),
            self.end.translate(offset.scale(-1.0)),
            self.start.translate(offset.scale(-1.0)),
        ]
    }

    /// 点是否落在缓冲矩形内（含边界）。
    pub fn contains(&self, point: Point2) -> bool {
        let local = self.start.vector_to(point);
        let along = local.dot(self.direction);
        let across = local.dot(self.normal);
        along >= -BOUNDARY_EPSILON
            && along <= self.length + BOUNDARY_EPSILON
            && across.abs() <= self.tolerance + BOUNDARY_EPSILON
    }

    /// 点到线段所在直线的垂距不超过容差，且位于外扩容差后的线段包围盒内。
    pub fn on_segment(&self, point: Point2) -> bool {
        let distance = self.start.vector_to(point).dot(self.normal).abs();
        if distance > self.tolerance + BOUNDARY_EPSILON {
            return false;
        }
        let min_x = self.start.x().min(self.end.x()) - self.tolerance;
        let max_x = self.start.x().max(self.end.x()) + self.tolerance;
        let min_y = self.start.y().min(self.end.y()) - self.tolerance;
        let max_y = self.start.y().max(self.end.y()) + self.tolerance;
        (min_x..=max_x).contains(&point.x()) && (min_y..=max_y).contains(&point.y())
    }

    /// 靠近端点（容差的十分之一以内）时记为端点，否则记为中点。
    pub fn role_of(&self, point: Point2) -> Role {
        let snap = self.tolerance / 10.0;
        if point.distance(self.start) <= snap {
            Role::Start
        } else if point.distance(self.end) <= snap {
            Role::End
        } else {
            Role::Center
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSlot {
    First,
    Second,
}

/// 标注的某个定义点落在线段上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHit {
    pub dimension_id: String,
    pub slot: EndpointSlot,
    pub reference: EndpointRef,
}

/// 单条线段的匹配结果，尚未作用到工作记录上。
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub line: LineRecord,
    pub hits: Vec<EndpointHit>,
    /// 两个定义点都落在本线段上的标注。
    pub folds: Vec<String>,
    pub texts: Vec<String>,
}

impl PendingDimension {
    /// 比较尺寸线位置与第二延伸线原点：x 相同为 y 向标注，y 相同为 x 向标注。
    pub fn orientation(&self, epsilon: f64) -> Option<(Axis, f64)> {
        let dx = self.defpoint.x() - self.defpoint3.x();
        let dy = self.defpoint.y() - self.defpoint3.y();
        if dx.abs() < epsilon {
            Some((Axis::Y, dy))
        } else if dy.abs() < epsilon {
            Some((Axis::X, dx))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialMatcher {
    options: MatchOptions,
}

impl SpatialMatcher {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    /// 计算一条线段的匹配结果，不修改任何输入。零长度线段返回 `None`。
    pub fn match_line(
        &self,
        line: &LineRecord,
        dimensions: &IndexMap<String, PendingDimension>,
        texts: &[PendingText],
    ) -> Option<LineMatch> {
        let zone = BufferZone::around(
            line.start.truncate(),
            line.end.truncate(),
            self.options.tolerance,
        )?;
        let mut result = LineMatch {
            line: line.clone(),
            hits: Vec::new(),
            folds: Vec::new(),
            texts: Vec::new(),
        };

        for (id, dimension) in dimensions {
            let first_on_line = zone.on_segment(dimension.defpoint2);
            let second_on_line = zone.on_segment(dimension.defpoint3);
            if first_on_line {
                result.hits.push(EndpointHit {
                    dimension_id: id.clone(),
                    slot: EndpointSlot::First,
                    reference: EndpointRef::new(&line.id, zone.role_of(dimension.defpoint2)),
                });
            }
            if second_on_line {
                result.hits.push(EndpointHit {
                    dimension_id: id.clone(),
                    slot: EndpointSlot::Second,
                    reference: EndpointRef::new(&line.id, zone.role_of(dimension.defpoint3)),
                });
            }
            if first_on_line && second_on_line {
                annotate(&mut result.line, &dimension.annotation);
                result.folds.push(id.clone());
            }
        }

        for text in texts {
            if zone.contains(text.insert()) {
                annotate(&mut result.line, &text.annotation);
                result.texts.push(text.record.id.clone());
            }
        }
        Some(result)
    }

    /// 依线段顺序匹配整张实体图，返回可直接输出的交换数据。
    pub fn match_all(&self, graph: EntityGraph) -> CadData {
        let EntityGraph {
            mut data,
            mut dimensions,
            texts,
        } = graph;
        let mut folded: HashSet<String> = HashSet::new();
        let mut matched_lines = 0usize;

        for line in data.entities.line.values_mut() {
            let Some(result) = self.match_line(line, &dimensions, &texts) else {
                debug!(line = %line.id, "跳过零长度线段");
                continue;
            };
            matched_lines += 1;
            for hit in result.hits {
                // 后出现的线段覆盖先前的引用
                if let Some(dimension) = dimensions.get_mut(&hit.dimension_id) {
                    match hit.slot {
                        EndpointSlot::First => dimension.record.entity1 = Some(hit.reference),
                        EndpointSlot::Second => dimension.record.entity2 = Some(hit.reference),
                    }
                }
            }
            folded.extend(result.folds);
            *line = result.line;
        }

        self.finish(data, dimensions, texts, &folded, matched_lines > 0)
    }

    /// 丢弃定义点与原始文字，把未折叠的标注和全部文字写入输出桶。
    fn finish(
        &self,
        mut data: CadData,
        dimensions: IndexMap<String, PendingDimension>,
        texts: Vec<PendingText>,
        folded: &HashSet<String>,
        dimension_pass_ran: bool,
    ) -> CadData {
        for (id, pending) in dimensions {
            let orientation = pending.orientation(self.options.axis_epsilon);
            let mut record = pending.record;
            if dimension_pass_ran {
                if let Some((axis, distance)) = orientation {
                    record.axis = Some(axis);
                    record.distance = Some(distance);
                }
                // 公式只写到线段上，不回写标注
                record.label = pending.annotation.label;
                record.tolerance_range = pending.annotation.tolerance_range;
            }
            if folded.contains(&id) {
                debug!(dimension = %id, "标注已折叠到线段");
                continue;
            }
            data.entities.dimension.insert(id, record);
        }
        for text in texts {
            let mut record = text.record;
            record.text = text.annotation.full_text;
            data.entities.mtext.insert(record.id.clone(), record);
        }
        data
    }
}

fn annotate(line: &mut LineRecord, annotation: &Annotation) {
    line.label = annotation.label.clone();
    line.tolerance_range = annotation.tolerance_range.clone();
    line.formula = annotation.formula.clone();
}

#[cfg(test)]
mod tests {
    use cadbridge_core::{
        geometry::Point3,
        interchange::{DimensionRecord, EntityType, MTextRecord},
    };

    use super::*;
    use crate::annotation::decompose;

    fn line(id: &str, start: (f64, f64), end: (f64, f64)) -> LineRecord {
        LineRecord::new(
            id,
            "0",
            256,
            Point3::new(start.0, start.1, 0.0),
            Point3::new(end.0, end.1, 0.0),
        )
    }

    fn text(id: &str, at: (f64, f64), raw: &str) -> PendingText {
        PendingText {
            record: MTextRecord {
                id: id.into(),
                kind: EntityType::Mtext,
                layer: "0".into(),
                color: 256,
                text: String::new(),
                font_size: 2.5,
                anchor: Some([0.0, 1.0]),
                insert: Point3::new(at.0, at.1, 0.0),
            },
            annotation: decompose(Some(raw)),
        }
    }

    fn dimension(
        id: &str,
        defpoint: (f64, f64),
        defpoint2: (f64, f64),
        defpoint3: (f64, f64),
        raw: &str,
    ) -> (String, PendingDimension) {
        let record = DimensionRecord {
            id: id.into(),
            kind: EntityType::Dimension,
            layer: "0".into(),
            color: 256,
            font_size: 2.5,
            dimstyle: "Standard".into(),
            dimtype: 0,
            axis: None,
            distance: None,
            entity1: None,
            entity2: None,
            label: String::new(),
            tolerance_range: String::new(),
        };
        (
            id.to_string(),
            PendingDimension {
                record,
                defpoint: Point2::new(defpoint.0, defpoint.1),
                defpoint2: Point2::new(defpoint2.0, defpoint2.1),
                defpoint3: Point2::new(defpoint3.0, defpoint3.1),
                annotation: decompose(Some(raw)),
            },
        )
    }

    fn graph_with(
        lines: Vec<LineRecord>,
        dimensions: Vec<(String, PendingDimension)>,
        texts: Vec<PendingText>,
    ) -> EntityGraph {
        let mut graph = EntityGraph::default();
        for line in lines {
            graph.data.entities.line.insert(line.id.clone(), line);
        }
        graph.dimensions = dimensions.into_iter().collect();
        graph.texts = texts;
        graph
    }

    #[test]
    fn buffer_zone_is_inclusive_and_bounded() {
        let zone = BufferZone::around(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), 1.0)
            .expect("非零长度");
        assert!(zone.contains(Point2::new(5.0, 0.5)));
        assert!(!zone.contains(Point2::new(5.0, 2.0)));
        assert!(zone.contains(Point2::new(5.0, 1.0)));
        assert!(zone.contains(Point2::new(10.0, -1.0)));
        assert!(!zone.contains(Point2::new(10.5, 0.0)));
        assert!(!zone.contains(Point2::new(-0.5, 0.0)));

        let corners = zone.corners();
        assert_eq!(corners[0], Point2::new(0.0, 1.0));
        assert_eq!(corners[2], Point2::new(10.0, -1.0));
    }

    #[test]
    fn buffer_zone_follows_diagonal_segments() {
        let zone = BufferZone::around(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0), 1.0)
            .expect("非零长度");
        assert!(zone.contains(Point2::new(5.0, 5.5)));
        assert!(!zone.contains(Point2::new(5.0, 7.0)));
        assert!(zone.on_segment(Point2::new(5.5, 5.0)));
        assert!(!zone.on_segment(Point2::new(12.0, 12.0)));
    }

    #[test]
    fn degenerate_lines_are_skipped() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        let point = line("p", (3.0, 3.0), (3.0, 3.0));
        let texts = vec![text("t", (3.0, 3.0), "标签")];
        assert!(matcher.match_line(&point, &IndexMap::new(), &texts).is_none());
    }

    #[test]
    fn zero_length_lines_leave_dimensions_untouched() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        let graph = graph_with(
            vec![line("p", (3.0, 3.0), (3.0, 3.0))],
            vec![dimension("d", (20.0, 15.0), (0.0, 0.0), (20.0, 0.0), "W;3/4")],
            vec![text("t", (3.0, 3.0), "标签")],
        );
        let data = matcher.match_all(graph);
        // 没有可匹配的线段时，方向与标签都不刷新
        let record = &data.entities.dimension["d"];
        assert!(record.axis.is_none());
        assert!(record.distance.is_none());
        assert!(record.entity1.is_none());
        assert_eq!(record.label, "");
        assert_eq!(record.tolerance_range, "");
        assert_eq!(data.entities.line["p"].label, "");
        assert_eq!(data.entities.mtext["t"].text, "标签");
    }

    #[test]
    fn text_inside_buffer_annotates_line() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        let graph = graph_with(
            vec![line("a", (0.0, 0.0), (10.0, 0.0))],
            Vec::new(),
            vec![
                text("near", (5.0, 0.5), "宽度;5~10"),
                text("far", (5.0, 2.0), "高度"),
            ],
        );
        let data = matcher.match_all(graph);
        let line = &data.entities.line["a"];
        assert_eq!(line.label, "宽度");
        assert_eq!(line.tolerance_range, "5~10");
        assert_eq!(data.entities.mtext.len(), 2);
        assert_eq!(data.entities.mtext["near"].text, "宽度;5~10");
    }

    #[test]
    fn text_may_annotate_several_lines() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(2.0));
        let lines = vec![
            line("a", (0.0, 0.0), (10.0, 0.0)),
            line("b", (0.0, 1.0), (10.0, 1.0)),
        ];
        let texts = vec![text("t", (5.0, 0.5), "L1=100")];
        let graph = graph_with(lines, Vec::new(), texts);
        let data = matcher.match_all(graph);
        assert_eq!(data.entities.line["a"].formula, "L1=100");
        assert_eq!(data.entities.line["b"].formula, "L1=100");
    }

    #[test]
    fn fully_matched_dimension_is_folded_into_line() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        let graph = graph_with(
            vec![line("a", (0.0, 0.0), (10.0, 0.0))],
            vec![dimension(
                "d",
                (10.0, 5.0),
                (0.05, 0.0),
                (9.95, 0.0),
                "长度;1~2;L=100",
            )],
            Vec::new(),
        );
        let data = matcher.match_all(graph);
        assert!(data.entities.dimension.is_empty());
        let line = &data.entities.line["a"];
        assert_eq!(line.label, "长度");
        assert_eq!(line.tolerance_range, "1~2");
        assert_eq!(line.formula, "L=100");
    }

    #[test]
    fn endpoint_roles_and_orientation_are_recorded() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        let (id, pending) = dimension("d", (20.0, 15.0), (0.0, 0.0), (20.0, 0.0), "W;3/4;W=2*H");
        let dimensions: IndexMap<String, PendingDimension> = [(id, pending)].into_iter().collect();

        let first = line("a", (0.0, 0.0), (10.0, 0.0));
        let result = matcher
            .match_line(&first, &dimensions, &[])
            .expect("非零长度");
        assert!(result.folds.is_empty());
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].slot, EndpointSlot::First);
        assert_eq!(result.hits[0].reference, EndpointRef::new("a", Role::Start));

        let graph = graph_with(
            vec![first, line("b", (10.0, 0.0), (20.0, 0.0))],
            dimensions.into_iter().collect(),
            Vec::new(),
        );
        let data = matcher.match_all(graph);
        let record = &data.entities.dimension["d"];
        assert_eq!(record.entity1, Some(EndpointRef::new("a", Role::Start)));
        assert_eq!(record.entity2, Some(EndpointRef::new("b", Role::End)));
        assert_eq!(record.axis, Some(Axis::Y));
        assert_eq!(record.distance, Some(15.0));
        assert_eq!(record.label, "W");
        assert_eq!(record.tolerance_range, "3, 4");
        // 公式只传播到线段
        let encoded = serde_json::to_value(record).unwrap();
        assert!(encoded.get("gongshi").is_none());
        assert_eq!(data.entities.line["a"].formula, "");
    }

    #[test]
    fn center_role_for_points_away_from_endpoints() {
        let zone = BufferZone::around(Point2::new(0.0, 0.0), Point2::new(0.0, 100.0), 20.0)
            .expect("非零长度");
        assert_eq!(zone.role_of(Point2::new(0.0, 1.5)), Role::Start);
        assert_eq!(zone.role_of(Point2::new(0.0, 98.5)), Role::End);
        assert_eq!(zone.role_of(Point2::new(0.0, 50.0)), Role::Center);
    }

    #[test]
    fn later_lines_overwrite_endpoint_references() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        let graph = graph_with(
            vec![
                line("a", (0.0, 0.0), (10.0, 0.0)),
                line("b", (0.0, 0.5), (10.0, 0.5)),
            ],
            vec![dimension("d", (0.0, 30.0), (0.0, 0.0), (0.0, 40.0), "X")],
            Vec::new(),
        );
        let data = matcher.match_all(graph);
        let record = &data.entities.dimension["d"];
        // 距 b 的起点 0.5，超出端点吸附距离，记为中点
        assert_eq!(record.entity1, Some(EndpointRef::new("b", Role::Center)));
        assert!(record.entity2.is_none());
        assert_eq!(record.axis, Some(Axis::Y));
        assert_eq!(record.distance, Some(-10.0));
    }

    #[test]
    fn vertical_dimension_uses_x_axis() {
        let (_, pending) = dimension("d", (130.0, 50.0), (100.0, 0.0), (100.0, 50.0), "");
        assert_eq!(pending.orientation(0.1), Some((Axis::X, 30.0)));
        let (_, skewed) = dimension("s", (5.0, 5.0), (0.0, 0.0), (1.0, 1.0), "");
        assert_eq!(skewed.orientation(0.1), None);
    }

    #[test]
    fn folding_is_idempotent_across_lines() {
        let matcher = SpatialMatcher::new(MatchOptions::with_tolerance(1.0));
        // 两条重合线段都能完整解释同一个标注
        let graph = graph_with(
            vec![
                line("a", (0.0, 0.0), (10.0, 0.0)),
                line("b", (0.0, 0.0), (10.0, 0.0)),
            ],
            vec![dimension("d", (10.0, 5.0), (0.0, 0.0), (10.0, 0.0), "宽")],
            Vec::new(),
        );
        let data = matcher.match_all(graph);
        assert!(data.entities.dimension.is_empty());
        assert_eq!(data.entities.line["a"].label, "宽");
        assert_eq!(data.entities.line["b"].label, "宽");
    }
}
