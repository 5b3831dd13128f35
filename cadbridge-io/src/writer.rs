use std::borrow::Cow;
use std::io::{self, Write};

use cadbridge_core::{
    drawing::{
        Arc, Circle, Dimension, Drawing, DrawingEntity, Hatch, HatchBoundary, HatchEdge, Line,
        LwPolyline, MText, Text,
    },
    geometry::{Point2, Point3},
};

/// MTEXT 单个组码值的最大长度，超出部分拆为组码 3 前置片段。
const MTEXT_CHUNK: usize = 250;

/// 最小化的 ASCII DXF 输出：不写句柄与块定义，只保证本库的读取器和常见查看器能识别。
pub(crate) struct DxfWriter<W: Write> {
    out: W,
}

impl<W: Write> DxfWriter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out }
    }

    pub(crate) fn write_drawing(mut self, drawing: &Drawing) -> io::Result<()> {
        self.section("HEADER")?;
        self.pair(9, "$ACADVER")?;
        self.pair(1, "AC1009")?;
        self.pair(0, "ENDSEC")?;

        self.section("TABLES")?;
        self.write_layer_table(drawing)?;
        self.write_dimension_style_table(drawing)?;
        self.pair(0, "ENDSEC")?;

        self.section("ENTITIES")?;
        for entity in drawing.entities() {
            self.write_entity(entity)?;
        }
        self.pair(0, "ENDSEC")?;
        self.pair(0, "EOF")?;
        self.out.flush()
    }

    fn section(&mut self, name: &str) -> io::Result<()> {
        self.pair(0, "SECTION")?;
        self.pair(2, name)
    }

    fn pair(&mut self, code: i32, value: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{code:>3}")?;
        writeln!(self.out, "{value}")
    }

    /// 字符串值不能跨行，否则组码与值错位。
    fn text(&mut self, code: i32, value: &str) -> io::Result<()> {
        self.pair(code, single_line(value))
    }

    fn point(&mut self, base: i32, point: Point3) -> io::Result<()> {
        self.pair(base, point.x())?;
        self.pair(base + 10, point.y())?;
        self.pair(base + 20, point.z())
    }

    fn point2(&mut self, base: i32, point: Point2) -> io::Result<()> {
        self.pair(base, point.x())?;
        self.pair(base + 10, point.y())
    }

    fn common(&mut self, kind: &str, layer: &str, color: i32) -> io::Result<()> {
        self.pair(0, kind)?;
        self.text(8, layer)?;
        self.pair(62, color)
    }

    fn write_layer_table(&mut self, drawing: &Drawing) -> io::Result<()> {
        self.pair(0, "TABLE")?;
        self.pair(2, "LAYER")?;
        self.pair(70, drawing.layers().count())?;
        for layer in drawing.layers() {
            self.pair(0, "LAYER")?;
            self.text(2, &layer.name)?;
            self.pair(70, 0)?;
            self.pair(62, layer.color)?;
            self.pair(6, "CONTINUOUS")?;
        }
        self.pair(0, "ENDTAB")
    }

    fn write_dimension_style_table(&mut self, drawing: &Drawing) -> io::Result<()> {
        self.pair(0, "TABLE")?;
        self.pair(2, "DIMSTYLE")?;
        self.pair(70, drawing.dimension_styles().count())?;
        for style in drawing.dimension_styles() {
            self.pair(0, "DIMSTYLE")?;
            self.text(2, &style.name)?;
            self.pair(70, 0)?;
            self.pair(140, style.text_height)?;
        }
        self.pair(0, "ENDTAB")
    }

    fn write_entity(&mut self, entity: &DrawingEntity) -> io::Result<()> {
        match entity {
            DrawingEntity::Line(line) => self.write_line(line),
            DrawingEntity::Circle(circle) => self.write_circle(circle),
            DrawingEntity::Arc(arc) => self.write_arc(arc),
            DrawingEntity::Text(text) => self.write_text(text),
            DrawingEntity::MText(mtext) => self.write_mtext(mtext),
            DrawingEntity::Dimension(dimension) => self.write_dimension(dimension),
            DrawingEntity::Hatch(hatch) => self.write_hatch(hatch),
            DrawingEntity::LwPolyline(polyline) => self.write_lwpolyline(polyline),
            // 未建模实体没有几何数据可写
            DrawingEntity::Other { .. } => Ok(()),
        }
    }

    fn write_line(&mut self, line: &Line) -> io::Result<()> {
        self.common("LINE", &line.layer, line.color)?;
        self.point(10, line.start)?;
        self.point(11, line.end)
    }

    fn write_circle(&mut self, circle: &Circle) -> io::Result<()> {
        self.common("CIRCLE", &circle.layer, circle.color)?;
        self.point(10, circle.center)?;
        self.pair(40, circle.radius)
    }

    fn write_arc(&mut self, arc: &Arc) -> io::Result<()> {
        self.common("ARC", &arc.layer, arc.color)?;
        self.point(10, arc.center)?;
        self.pair(40, arc.radius)?;
        self.pair(50, arc.start_angle)?;
        self.pair(51, arc.end_angle)
    }

    fn write_text(&mut self, text: &Text) -> io::Result<()> {
        self.common("TEXT", &text.layer, text.color)?;
        self.point(10, text.insert)?;
        self.pair(40, text.height)?;
        self.text(1, &text.content)
    }

    fn write_mtext(&mut self, mtext: &MText) -> io::Result<()> {
        self.common("MTEXT", &mtext.layer, mtext.color)?;
        self.point(10, mtext.insert)?;
        self.pair(40, mtext.height)?;
        self.pair(71, mtext.attachment_point)?;
        let chars: Vec<char> = mtext_value(&mtext.content).chars().collect();
        let mut chunks = chars.chunks(MTEXT_CHUNK).peekable();
        if chunks.peek().is_none() {
            return self.pair(1, "");
        }
        while let Some(chunk) = chunks.next() {
            let code = if chunks.peek().is_some() { 3 } else { 1 };
            self.pair(code, chunk.iter().collect::<String>())?;
        }
        Ok(())
    }

    fn write_dimension(&mut self, dimension: &Dimension) -> io::Result<()> {
        self.common("DIMENSION", &dimension.layer, dimension.color)?;
        self.point(10, dimension.definition_point)?;
        if let Some(mid) = dimension.text_midpoint {
            self.point(11, mid)?;
        }
        self.pair(70, dimension.dimension_type)?;
        if let Some(text) = &dimension.text {
            self.text(1, text)?;
        }
        self.text(3, &dimension.style)?;
        self.point(13, dimension.first_point)?;
        self.point(14, dimension.second_point)?;
        self.pair(50, dimension.rotation)
    }

    fn write_hatch(&mut self, hatch: &Hatch) -> io::Result<()> {
        self.common("HATCH", &hatch.layer, hatch.color)?;
        self.point(10, Point3::ORIGIN)?;
        self.text(2, &hatch.pattern_name)?;
        self.pair(70, i32::from(hatch.is_solid))?;
        self.pair(71, 0)?;
        self.pair(91, hatch.boundaries.len())?;
        for boundary in &hatch.boundaries {
            match boundary {
                HatchBoundary::Edges(edges) => {
                    let lines: Vec<(Point2, Point2)> = edges
                        .iter()
                        .filter_map(|edge| match edge {
                            HatchEdge::Line { start, end } => Some((*start, *end)),
                            HatchEdge::Curve { .. } => None,
                        })
                        .collect();
                    self.pair(92, 1)?;
                    self.pair(93, lines.len())?;
                    for (start, end) in lines {
                        self.pair(72, 1)?;
                        self.point2(10, start)?;
                        self.point2(11, end)?;
                    }
                }
                HatchBoundary::Polyline {
                    vertices,
                    is_closed,
                } => {
                    let has_bulge = vertices.iter().any(|vertex| vertex.bulge != 0.0);
                    self.pair(92, 3)?;
                    self.pair(72, i32::from(has_bulge))?;
                    self.pair(73, i32::from(*is_closed))?;
                    self.pair(93, vertices.len())?;
                    for vertex in vertices {
                        self.point2(10, vertex.position)?;
                        if has_bulge {
                            self.pair(42, vertex.bulge)?;
                        }
                    }
                }
            }
            self.pair(97, 0)?;
        }
        self.pair(75, 0)?;
        self.pair(76, 1)?;
        self.pair(98, 0)
    }

    fn write_lwpolyline(&mut self, polyline: &LwPolyline) -> io::Result<()> {
        self.common("LWPOLYLINE", &polyline.layer, polyline.color)?;
        self.pair(90, polyline.vertices.len())?;
        self.pair(70, i32::from(polyline.is_closed))?;
        self.pair(38, polyline.elevation)?;
        for vertex in &polyline.vertices {
            self.point2(10, vertex.position)?;
            if vertex.bulge != 0.0 {
                self.pair(42, vertex.bulge)?;
            }
        }
        Ok(())
    }
}

/// MTEXT 内的换行写作 `\P`。
fn mtext_value(content: &str) -> String {
    content.replace("\r\n", "\\P").replace(['\r', '\n'], "\\P")
}

fn single_line(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        Cow::Owned(value.replace("\r\n", " ").replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
