use cadbridge_core::{
    drawing::{
        Arc, COLOR_BY_LAYER, Circle, DEFAULT_DIMENSION_STYLE, DEFAULT_DIMENSION_TEXT_HEIGHT,
        DEFAULT_LAYER, Dimension, Drawing, DrawingEntity, Hatch, HatchBoundary, HatchEdge, Line,
        LwPolyline, MText, PolylineVertex, Text,
    },
    geometry::{Point2, Point3},
};

use crate::DxfError;

const BINARY_SENTINEL: &str = "AutoCAD Binary DXF";

pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Drawing, DxfError> {
        if self.reader.starts_with(BINARY_SENTINEL) {
            return Err(DxfError::unsupported("二进制 DXF"));
        }
        let mut drawing = Drawing::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            match (code, value.as_str()) {
                // 文件头部注释
                (999, _) => continue,
                (0, "SECTION") => {
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
                        "TABLES" => self.parse_tables(&mut drawing)?,
                        "ENTITIES" => self.parse_entities(&mut drawing)?,
                        _ => self.skip_section()?,
                    }
                }
                (0, "EOF") => break,
                (0, unexpected) => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
                (code, _) => {
                    return Err(DxfError::invalid(format!(
                        "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                    )));
                }
            }
        }
        Ok(drawing)
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

    fn parse_tables(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("TABLES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "TABLES 段遇到组码 {code}（期望 0 表示表项起始）"
                )));
            }
            match value.as_str() {
                "ENDSEC" => break,
                "LAYER" => self.parse_layer(drawing)?,
                "DIMSTYLE" => self.parse_dimension_style(drawing)?,
                // TABLE/ENDTAB 及其他表项只需跳过
                _ => self.skip_entity_body()?,
            }
        }
        Ok(())
    }

    fn parse_layer(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        let mut name = None;
        let mut color = 7;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => name = Some(value.trim().to_string()),
                Some((62, value)) => color = parse_i32(&value, "LAYER 颜色（组码 62）")?,
                Some(_) => {}
                None => return Err(DxfError::invalid("LAYER 表项未正确结束")),
            }
        }
        let name = name.ok_or_else(|| DxfError::invalid("LAYER 缺少名称（组码 2）"))?;
        drawing.add_layer(name, color);
        Ok(())
    }

    fn parse_dimension_style(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        let mut name = None;
        let mut text_height = DEFAULT_DIMENSION_TEXT_HEIGHT;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => name = Some(value.trim().to_string()),
                Some((140, value)) => {
                    text_height = parse_f64(&value, "DIMSTYLE 文字高度（组码 140）")?
                }
                Some(_) => {}
                None => return Err(DxfError::invalid("DIMSTYLE 表项未正确结束")),
            }
        }
        let name = name.ok_or_else(|| DxfError::invalid("DIMSTYLE 缺少名称（组码 2）"))?;
        drawing.set_dimension_style(name, text_height);
        Ok(())
    }

    fn parse_entities(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
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
                // POLYLINE 的子记录随父实体一并视为未建模实体
                "VERTEX" | "SEQEND" => self.skip_entity_body()?,
                entity => {
                    let parsed = self.parse_entity(entity)?;
                    drawing.add_entity(parsed);
                }
            }
        }
        Ok(())
    }

    fn parse_entity(&mut self, kind: &str) -> Result<DrawingEntity, DxfError> {
        match kind {
            "LINE" => self.parse_line(),
            "CIRCLE" => self.parse_circle(),
            "ARC" => self.parse_arc(),
            "TEXT" => self.parse_text(),
            "MTEXT" => self.parse_mtext(),
            "DIMENSION" => self.parse_dimension(),
            "HATCH" => self.parse_hatch(),
            "LWPOLYLINE" => self.parse_lwpolyline(),
            other => self.parse_other(other),
        }
    }

    fn parse_line(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut start = CoordSlots::default();
        let mut end = CoordSlots::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "LINE 颜色")?),
                    10 => assign_coord(&mut start.x, &value, "LINE 起点 X（组码 10）")?,
                    20 => assign_coord(&mut start.y, &value, "LINE 起点 Y（组码 20）")?,
                    30 => assign_coord(&mut start.z, &value, "LINE 起点 Z（组码 30）")?,
                    11 => assign_coord(&mut end.x, &value, "LINE 终点 X（组码 11）")?,
                    21 => assign_coord(&mut end.y, &value, "LINE 终点 Y（组码 21）")?,
                    31 => assign_coord(&mut end.z, &value, "LINE 终点 Z（组码 31）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        Ok(DrawingEntity::Line(Line {
            start: start.required("LINE 起点（组码 10/20）")?,
            end: end.required("LINE 终点（组码 11/21）")?,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_circle(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut center = CoordSlots::default();
        let mut radius = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "CIRCLE 颜色")?),
                    10 => assign_coord(&mut center.x, &value, "CIRCLE 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center.y, &value, "CIRCLE 圆心 Y（组码 20）")?,
                    30 => assign_coord(&mut center.z, &value, "CIRCLE 圆心 Z（组码 30）")?,
                    40 => assign_coord(&mut radius, &value, "CIRCLE 半径（组码 40）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("CIRCLE 未正确结束")),
            }
        }

        let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;
        Ok(DrawingEntity::Circle(Circle {
            center: center.required("CIRCLE 圆心（组码 10/20）")?,
            radius,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_arc(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut center = CoordSlots::default();
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "ARC 颜色")?),
                    10 => assign_coord(&mut center.x, &value, "ARC 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center.y, &value, "ARC 圆心 Y（组码 20）")?,
                    30 => assign_coord(&mut center.z, &value, "ARC 圆心 Z（组码 30）")?,
                    40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                    50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                    51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
        let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;

        Ok(DrawingEntity::Arc(Arc {
            center: center.required("ARC 圆心（组码 10/20）")?,
            radius,
            start_angle,
            end_angle,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_text(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut insert = CoordSlots::default();
        let mut height = None;
        let mut content = String::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "TEXT 颜色")?),
                    10 => assign_coord(&mut insert.x, &value, "TEXT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert.y, &value, "TEXT 插入点 Y（组码 20）")?,
                    30 => assign_coord(&mut insert.z, &value, "TEXT 插入点 Z（组码 30）")?,
                    40 => assign_coord(&mut height, &value, "TEXT 高度（组码 40）")?,
                    1 => content = value,
                    _ => {}
                },
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        Ok(DrawingEntity::Text(Text {
            insert: insert.required("TEXT 插入点（组码 10/20）")?,
            content,
            height: height.unwrap_or(DEFAULT_DIMENSION_TEXT_HEIGHT),
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_mtext(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut insert = CoordSlots::default();
        let mut height = None;
        let mut attachment_point: i16 = 1;
        let mut fragments: Vec<String> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "MTEXT 颜色")?),
                    10 => assign_coord(&mut insert.x, &value, "MTEXT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert.y, &value, "MTEXT 插入点 Y（组码 20）")?,
                    30 => assign_coord(&mut insert.z, &value, "MTEXT 插入点 Z（组码 30）")?,
                    40 => assign_coord(&mut height, &value, "MTEXT 高度（组码 40）")?,
                    71 => {
                        attachment_point = parse_i16(&value, "MTEXT 附着点 (组码 71)")?;
                    }
                    // 组码 3 为前置片段，组码 1 为末段，按出现顺序拼接
                    1 | 3 => fragments.push(value),
                    _ => {}
                },
                None => return Err(DxfError::invalid("MTEXT 未正确结束")),
            }
        }

        Ok(DrawingEntity::MText(MText {
            insert: insert.required("MTEXT 插入点（组码 10/20）")?,
            // 段落分隔符 `\P` 还原为换行
            content: fragments.concat().replace("\\P", "\n"),
            height: height.unwrap_or(DEFAULT_DIMENSION_TEXT_HEIGHT),
            attachment_point,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_dimension(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut definition = CoordSlots::default();
        let mut first = CoordSlots::default();
        let mut second = CoordSlots::default();
        let mut text_mid = CoordSlots::default();
        let mut text = None;
        let mut style = None;
        let mut dimension_type: i16 = 0;
        let mut rotation = 0.0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "DIMENSION 颜色")?),
                    1 => text = Some(value),
                    3 => style = Some(value.trim().to_string()),
                    70 => dimension_type = parse_i16(&value, "DIMENSION 类型标志（组码 70）")?,
                    50 => rotation = parse_f64(&value, "DIMENSION 旋转角（组码 50）")?,
                    10 => assign_coord(&mut definition.x, &value, "DIMENSION 定义点 X（组码 10）")?,
                    20 => assign_coord(&mut definition.y, &value, "DIMENSION 定义点 Y（组码 20）")?,
                    30 => assign_coord(&mut definition.z, &value, "DIMENSION 定义点 Z（组码 30）")?,
                    11 => assign_coord(&mut text_mid.x, &value, "DIMENSION 文本位置 X（组码 11）")?,
                    21 => assign_coord(&mut text_mid.y, &value, "DIMENSION 文本位置 Y（组码 21）")?,
                    31 => assign_coord(&mut text_mid.z, &value, "DIMENSION 文本位置 Z（组码 31）")?,
                    13 => assign_coord(&mut first.x, &value, "DIMENSION 延伸线起点 X（组码 13）")?,
                    23 => assign_coord(&mut first.y, &value, "DIMENSION 延伸线起点 Y（组码 23）")?,
                    33 => assign_coord(&mut first.z, &value, "DIMENSION 延伸线起点 Z（组码 33）")?,
                    14 => assign_coord(&mut second.x, &value, "DIMENSION 延伸线终点 X（组码 14）")?,
                    24 => assign_coord(&mut second.y, &value, "DIMENSION 延伸线终点 Y（组码 24）")?,
                    34 => assign_coord(&mut second.z, &value, "DIMENSION 延伸线终点 Z（组码 34）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("DIMENSION 未正确结束")),
            }
        }

        // 半径、角度等标注没有组码 13/14，缺省按原点处理
        Ok(DrawingEntity::Dimension(Dimension {
            definition_point: definition.required("DIMENSION 定义点（组码 10/20）")?,
            first_point: first.or_origin(),
            second_point: second.or_origin(),
            text_midpoint: text_mid.optional(),
            text,
            style: style.unwrap_or_else(|| DEFAULT_DIMENSION_STYLE.to_string()),
            dimension_type,
            rotation,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_hatch(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut pattern_name = String::new();
        let mut is_solid = false;
        let mut boundaries = Vec::new();
        let mut current: Option<BoundaryBuilder> = None;
        // 组码 75/98 之后是图案与种子点数据，其中的 10/20 不属于边界
        let mut in_boundary_data = true;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "HATCH 颜色")?),
                    2 if current.is_none() => pattern_name = value.trim().to_string(),
                    70 if current.is_none() => {
                        is_solid = parse_i32(&value, "HATCH 实体填充标志（组码 70）")? == 1
                    }
                    92 if in_boundary_data => {
                        if let Some(builder) = current.take() {
                            boundaries.push(builder.finish()?);
                        }
                        let flags = parse_i32(&value, "HATCH 边界类型（组码 92）")?;
                        current = Some(BoundaryBuilder::new(flags));
                    }
                    75 | 98 if in_boundary_data => {
                        in_boundary_data = false;
                        if let Some(builder) = current.take() {
                            boundaries.push(builder.finish()?);
                        }
                    }
                    _ if in_boundary_data => {
                        if let Some(builder) = current.as_mut() {
                            builder.accept(code, &value)?;
                        }
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("HATCH 未正确结束")),
            }
        }
        if let Some(builder) = current.take() {
            boundaries.push(builder.finish()?);
        }

        Ok(DrawingEntity::Hatch(Hatch {
            pattern_name,
            is_solid,
            boundaries,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_lwpolyline(&mut self) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        let mut is_closed = false;
        let mut elevation = 0.0;
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut pending_x: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    62 => color = Some(parse_i32(&value, "LWPOLYLINE 颜色")?),
                    38 => elevation = parse_f64(&value, "LWPOLYLINE 标高（组码 38）")?,
                    70 => {
                        let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                        is_closed = flag & 0x01 == 0x01;
                    }
                    10 => {
                        let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                        if pending_x.replace(x).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 Y（组码 20）",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                        let x = pending_x.take().ok_or_else(|| {
                            DxfError::invalid("LWPOLYLINE 顶点缺少对应的 X（组码 10）")
                        })?;
                        vertices.push(PolylineVertex::new(Point2::new(x, y)));
                    }
                    42 => {
                        let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                        let vertex = vertices.last_mut().ok_or_else(|| {
                            DxfError::invalid("LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）")
                        })?;
                        vertex.bulge = bulge;
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }

        Ok(DrawingEntity::LwPolyline(LwPolyline {
            vertices,
            is_closed,
            elevation,
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        }))
    }

    fn parse_other(&mut self, kind: &str) -> Result<DrawingEntity, DxfError> {
        let mut layer = None;
        let mut color = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((8, value)) => layer = Some(value.trim().to_string()),
                Some((62, value)) => color = Some(parse_i32(&value, "实体颜色")?),
                Some(_) => {}
                None => return Err(DxfError::invalid(format!("{kind} 未正确结束"))),
            }
        }
        Ok(DrawingEntity::Other {
            kind: kind.to_string(),
            layer: layer_or_default(layer),
            color: color.unwrap_or(COLOR_BY_LAYER),
        })
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

/// HATCH 单条边界的增量解析状态。
enum BoundaryBuilder {
    Polyline {
        vertices: Vec<PolylineVertex>,
        is_closed: bool,
        pending_x: Option<f64>,
    },
    Edges {
        edges: Vec<HatchEdge>,
        current: Option<EdgeBuilder>,
    },
}

struct EdgeBuilder {
    edge_type: i32,
    start: CoordSlots,
    end: CoordSlots,
}

impl EdgeBuilder {
    fn finish(self) -> Result<HatchEdge, DxfError> {
        if self.edge_type != 1 {
            return Ok(HatchEdge::Curve {
                edge_type: self.edge_type,
            });
        }
        let start = self.start.required("HATCH 直线边起点（组码 10/20）")?;
        let end = self.end.required("HATCH 直线边终点（组码 11/21）")?;
        Ok(HatchEdge::Line {
            start: start.truncate(),
            end: end.truncate(),
        })
    }
}

impl BoundaryBuilder {
    fn new(flags: i32) -> Self {
        if flags & 0x02 != 0 {
            Self::Polyline {
                vertices: Vec::new(),
                is_closed: false,
                pending_x: None,
            }
        } else {
            Self::Edges {
                edges: Vec::new(),
                current: None,
            }
        }
    }

    fn accept(&mut self, code: i32, value: &str) -> Result<(), DxfError> {
        match self {
            Self::Polyline {
                vertices,
                is_closed,
                pending_x,
            } => match code {
                73 => *is_closed = parse_i32(value, "HATCH 多段线闭合标志（组码 73）")? != 0,
                10 => {
                    let x = parse_f64(value, "HATCH 顶点 X")?;
                    if pending_x.replace(x).is_some() {
                        return Err(DxfError::invalid("HATCH 顶点缺少对应的 Y（组码 20）"));
                    }
                }
                20 => {
                    let y = parse_f64(value, "HATCH 顶点 Y")?;
                    let x = pending_x
                        .take()
                        .ok_or_else(|| DxfError::invalid("HATCH 顶点缺少对应的 X（组码 10）"))?;
                    vertices.push(PolylineVertex::new(Point2::new(x, y)));
                }
                42 => {
                    let bulge = parse_f64(value, "HATCH 顶点 bulge")?;
                    if let Some(vertex) = vertices.last_mut() {
                        vertex.bulge = bulge;
                    }
                }
                _ => {}
            },
            Self::Edges { edges, current } => match code {
                72 => {
                    if let Some(edge) = current.take() {
                        edges.push(edge.finish()?);
                    }
                    *current = Some(EdgeBuilder {
                        edge_type: parse_i32(value, "HATCH 边类型（组码 72）")?,
                        start: CoordSlots::default(),
                        end: CoordSlots::default(),
                    });
                }
                10 | 20 | 11 | 21 => {
                    if let Some(edge) = current.as_mut().filter(|edge| edge.edge_type == 1) {
                        let (slot, context) = match code {
                            10 => (&mut edge.start.x, "HATCH 直线边起点 X"),
                            20 => (&mut edge.start.y, "HATCH 直线边起点 Y"),
                            11 => (&mut edge.end.x, "HATCH 直线边终点 X"),
                            _ => (&mut edge.end.y, "HATCH 直线边终点 Y"),
                        };
                        assign_coord(slot, value, context)?;
                    }
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn finish(self) -> Result<HatchBoundary, DxfError> {
        match self {
            Self::Polyline {
                vertices,
                is_closed,
                pending_x,
            } => {
                if let Some(x) = pending_x {
                    return Err(DxfError::invalid(format!(
                        "HATCH 顶点 X={x} 缺少对应的 Y 坐标"
                    )));
                }
                Ok(HatchBoundary::Polyline {
                    vertices,
                    is_closed,
                })
            }
            Self::Edges { mut edges, current } => {
                if let Some(edge) = current {
                    edges.push(edge.finish()?);
                }
                Ok(HatchBoundary::Edges(edges))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CoordSlots {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl CoordSlots {
    fn optional(self) -> Option<Point3> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Point3::new(x, y, self.z.unwrap_or(0.0))),
            _ => None,
        }
    }

    fn required(self, context: &str) -> Result<Point3, DxfError> {
        self.optional()
            .ok_or_else(|| DxfError::invalid(format!("缺少{context}")))
    }

    fn or_origin(self) -> Point3 {
        self.optional().unwrap_or(Point3::ORIGIN)
    }
}

struct DxfReader<'a> {
    source: &'a str,
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            source,
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.source.starts_with(prefix)
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
                    if line.trim().is_empty() {
                        continue;
                    }
                    break line;
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
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}

fn layer_or_default(layer: Option<String>) -> String {
    layer
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_LAYER.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn dxf(body: &[(&str, &str)]) -> String {
        let mut out = String::new();
        for (code, value) in body {
            out.push_str(code);
            out.push('\n');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    #[test]
    fn hatch_seed_points_are_not_boundary_vertices() {
        let source = dxf(&[
            ("0", "SECTION"),
            ("2", "ENTITIES"),
            ("0", "HATCH"),
            ("8", "FILL"),
            ("2", "SOLID"),
            ("70", "1"),
            ("91", "2"),
            ("92", "1"),
            ("93", "2"),
            ("72", "1"),
            ("10", "0"),
            ("20", "0"),
            ("11", "5"),
            ("21", "0"),
            ("72", "2"),
            ("10", "1"),
            ("20", "1"),
            ("40", "1"),
            ("97", "0"),
            ("92", "3"),
            ("72", "1"),
            ("73", "1"),
            ("93", "2"),
            ("10", "0"),
            ("20", "0"),
            ("42", "0.5"),
            ("10", "4"),
            ("20", "0"),
            ("42", "0"),
            ("97", "0"),
            ("75", "0"),
            ("76", "1"),
            ("98", "1"),
            ("10", "99"),
            ("20", "99"),
            ("0", "ENDSEC"),
            ("0", "EOF"),
        ]);
        let drawing = DxfParser::new(&source).parse().expect("解析 HATCH");
        let Some(DrawingEntity::Hatch(hatch)) = drawing.entities().next() else {
            panic!("应解析出 HATCH");
        };
        assert!(hatch.is_solid);
        assert_eq!(hatch.layer, "FILL");
        assert_eq!(hatch.boundaries.len(), 2);
        match &hatch.boundaries[0] {
            HatchBoundary::Edges(edges) => {
                assert_eq!(edges.len(), 2);
                assert_eq!(
                    edges[0],
                    HatchEdge::Line {
                        start: Point2::new(0.0, 0.0),
                        end: Point2::new(5.0, 0.0)
                    }
                );
                assert_eq!(edges[1], HatchEdge::Curve { edge_type: 2 });
            }
            other => panic!("期望直线边界，实际为 {other:?}"),
        }
        match &hatch.boundaries[1] {
            HatchBoundary::Polyline {
                vertices,
                is_closed,
            } => {
                assert!(*is_closed);
                assert_eq!(vertices.len(), 2);
                assert_eq!(vertices[0].bulge, 0.5);
                assert_eq!(vertices[1].position, Point2::new(4.0, 0.0));
            }
            other => panic!("期望多段线边界，实际为 {other:?}"),
        }
    }

    #[test]
    fn unknown_entities_keep_layer_and_color() {
        let source = dxf(&[
            ("0", "SECTION"),
            ("2", "ENTITIES"),
            ("0", "SPLINE"),
            ("8", "CURVES"),
            ("62", "4"),
            ("10", "1"),
            ("0", "ENDSEC"),
            ("0", "EOF"),
        ]);
        let drawing = DxfParser::new(&source).parse().expect("解析未知实体");
        match drawing.entities().next() {
            Some(DrawingEntity::Other { kind, layer, color }) => {
                assert_eq!(kind, "SPLINE");
                assert_eq!(layer, "CURVES");
                assert_eq!(*color, 4);
            }
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn binary_dxf_is_rejected() {
        let err = DxfParser::new("AutoCAD Binary DXF\r\n\u{1a}\0").parse();
        assert!(matches!(err, Err(DxfError::Unsupported { .. })));
    }

    #[test]
    fn duplicate_coordinates_are_invalid() {
        let source = dxf(&[
            ("0", "SECTION"),
            ("2", "ENTITIES"),
            ("0", "LINE"),
            ("10", "0"),
            ("10", "1"),
            ("20", "0"),
            ("11", "1"),
            ("21", "1"),
            ("0", "ENDSEC"),
            ("0", "EOF"),
        ]);
        let err = DxfParser::new(&source).parse();
        assert!(matches!(err, Err(DxfError::Invalid { .. })));
    }
}
