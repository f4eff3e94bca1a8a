//! 实体级解析：把单个 DXF 实体转换为核心库的 SVG 元素。

use dxfsvg_core::arc::{Arc, SweepDirection, validate_radius};
use dxfsvg_core::collection::block_id;
use dxfsvg_core::colour::{BYBLOCK, BYLAYER};
use dxfsvg_core::element::{Circle, Line, Reference};
use dxfsvg_core::ellipse::{Ellipse, validate_axes};
use dxfsvg_core::hatch::{Hatch, HatchValue, POLYLINE_BOUNDARY_FLAG};
use dxfsvg_core::polyline::Polyline;
use dxfsvg_core::style::EntityStyle;
use dxfsvg_core::text::{self, Text, TextAnchor};
use dxfsvg_core::{Point, SvgElement};
use glam::DVec2;
use tracing::{debug, warn};

use crate::DxfError;
use crate::parser::{DxfParser, declare_layer};
use crate::reader::{DxfReader, fill_once, parse_f64, parse_i32, require};

/// 逐对读取实体组码，直到下一个 0 组码。
fn read_entity_body<F>(reader: &mut DxfReader<'_>, kind: &str, mut on_code: F) -> Result<(), DxfError>
where
    F: FnMut(i32, String) -> Result<(), DxfError>,
{
    loop {
        match reader.next_pair()? {
            Some((0, value)) => {
                reader.put_back((0, value));
                return Ok(());
            }
            Some((code, value)) => on_code(code, value)?,
            None => return Err(DxfError::invalid(format!("{kind} 未正确结束"))),
        }
    }
}

/// 所有实体共享的组码：8 图层、62 颜色、6 线型、48 线型比例、60 可见性。
fn apply_common(style: &mut EntityStyle, code: i32, value: &str) -> Result<bool, DxfError> {
    match code {
        8 => style.layer = value.trim().to_string(),
        62 => {
            let colour = parse_i32(value, "颜色号（组码 62）")?;
            // 块引用颜色不向下传递，BYBLOCK 按随层处理
            if colour == BYBLOCK {
                style.colour = BYLAYER;
            } else {
                style.set_colour(colour);
            }
        }
        6 => style.set_line_type(value.trim()),
        48 => style.line_type_scale = parse_f64(value, "线型比例（组码 48）")?,
        60 => style.visible = parse_i32(value, "可见性（组码 60）")? == 0,
        _ => return Ok(false),
    }
    Ok(true)
}

/// 法向量 Z 为负时，OCS 相对 WCS 沿 X 镜像。
fn is_mirrored(extrusion_z: f64) -> bool {
    extrusion_z < 0.0
}

impl DxfParser<'_> {
    /// 按类型分派。`Ok(None)` 表示附属记录（VERTEX、ATTRIB、SEQEND），已静默跳过。
    pub(crate) fn parse_entity(&mut self, kind: &str) -> Result<Option<SvgElement>, DxfError> {
        let element = match kind {
            "LINE" => self.parse_line()?,
            "CIRCLE" => self.parse_circle()?,
            "ARC" => self.parse_arc()?,
            "ELLIPSE" => self.parse_ellipse()?,
            "LWPOLYLINE" => self.parse_lwpolyline()?,
            "HATCH" => self.parse_hatch()?,
            "TEXT" => self.parse_text()?,
            "MTEXT" => self.parse_mtext()?,
            "INSERT" => self.parse_insert()?,
            "VERTEX" | "ATTRIB" | "SEQEND" => {
                self.reader.skip_entity_body()?;
                return Ok(None);
            }
            other => return Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}"))),
        };
        Ok(Some(element))
    }

    fn parse_line(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let (mut sx, mut sy, mut ex, mut ey) = (None, None, None, None);
        read_entity_body(&mut self.reader, "LINE", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                10 => fill_once(&mut sx, &value, "LINE 起点 X（组码 10）"),
                20 => fill_once(&mut sy, &value, "LINE 起点 Y（组码 20）"),
                11 => fill_once(&mut ex, &value, "LINE 终点 X（组码 11）"),
                21 => fill_once(&mut ey, &value, "LINE 终点 Y（组码 21）"),
                _ => Ok(()),
            }
        })?;

        let mut line = Line::from_dxf(
            &self.drawing.context.space,
            require(sx, "LINE 起点 X（组码 10）")?,
            require(sy, "LINE 起点 Y（组码 20）")?,
            require(ex, "LINE 终点 X（组码 11）")?,
            require(ey, "LINE 终点 Y（组码 21）")?,
        );
        line.style = style;
        Ok(line.into())
    }

    fn parse_circle(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let (mut cx, mut cy, mut radius) = (None, None, None);
        let mut extrusion_z = 1.0;
        read_entity_body(&mut self.reader, "CIRCLE", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                10 => fill_once(&mut cx, &value, "CIRCLE 圆心 X（组码 10）"),
                20 => fill_once(&mut cy, &value, "CIRCLE 圆心 Y（组码 20）"),
                40 => fill_once(&mut radius, &value, "CIRCLE 半径（组码 40）"),
                230 => {
                    extrusion_z = parse_f64(&value, "CIRCLE 法向量 Z")?;
                    Ok(())
                }
                _ => Ok(()),
            }
        })?;

        let mut cx = require(cx, "CIRCLE 圆心 X（组码 10）")?;
        if is_mirrored(extrusion_z) {
            cx = -cx;
        }
        let radius = validate_radius(require(radius, "CIRCLE 半径（组码 40）")?)?;
        let mut circle = Circle::from_dxf(
            &self.drawing.context.space,
            cx,
            require(cy, "CIRCLE 圆心 Y（组码 20）")?,
            radius,
        );
        circle.style = style;
        Ok(circle.into())
    }

    fn parse_arc(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let (mut cx, mut cy, mut radius) = (None, None, None);
        let (mut start, mut end) = (None, None);
        let mut extrusion_z = 1.0;
        read_entity_body(&mut self.reader, "ARC", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                10 => fill_once(&mut cx, &value, "ARC 圆心 X（组码 10）"),
                20 => fill_once(&mut cy, &value, "ARC 圆心 Y（组码 20）"),
                40 => fill_once(&mut radius, &value, "ARC 半径（组码 40）"),
                50 => fill_once(&mut start, &value, "ARC 起始角（组码 50）"),
                51 => fill_once(&mut end, &value, "ARC 终止角（组码 51）"),
                230 => {
                    extrusion_z = parse_f64(&value, "ARC 法向量 Z")?;
                    Ok(())
                }
                _ => Ok(()),
            }
        })?;

        let mut cx = require(cx, "ARC 圆心 X（组码 10）")?;
        let mut start = require(start, "ARC 起始角（组码 50）")?;
        let mut end = require(end, "ARC 终止角（组码 51）")?;
        if is_mirrored(extrusion_z) {
            // 镜像后方向不变：起止角互换并关于 Y 轴对称
            cx = -cx;
            (start, end) = (180.0 - end, 180.0 - start);
        }
        let radius = validate_radius(require(radius, "ARC 半径（组码 40）")?)?;
        let mut arc = Arc::from_dxf(
            &self.drawing.context.space,
            cx,
            require(cy, "ARC 圆心 Y（组码 20）")?,
            radius,
            start,
            end,
        );
        arc.set_direction(SweepDirection::CounterClockwise);
        arc.style = style;
        Ok(arc.into())
    }

    fn parse_ellipse(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let (mut cx, mut cy, mut major_x, mut major_y, mut ratio) = (None, None, None, None, None);
        let (mut start, mut end) = (None, None);
        let mut extrusion_z = 1.0;
        read_entity_body(&mut self.reader, "ELLIPSE", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                10 => fill_once(&mut cx, &value, "ELLIPSE 圆心 X（组码 10）"),
                20 => fill_once(&mut cy, &value, "ELLIPSE 圆心 Y（组码 20）"),
                11 => fill_once(&mut major_x, &value, "ELLIPSE 主轴向量 X（组码 11）"),
                21 => fill_once(&mut major_y, &value, "ELLIPSE 主轴向量 Y（组码 21）"),
                40 => fill_once(&mut ratio, &value, "ELLIPSE 半径比（组码 40）"),
                41 => fill_once(&mut start, &value, "ELLIPSE 起始参数（组码 41）"),
                42 => fill_once(&mut end, &value, "ELLIPSE 终止参数（组码 42）"),
                230 => {
                    extrusion_z = parse_f64(&value, "ELLIPSE 法向量 Z")?;
                    Ok(())
                }
                _ => Ok(()),
            }
        })?;

        let major_x = require(major_x, "ELLIPSE 主轴向量 X（组码 11）")?;
        let major_y = require(major_y, "ELLIPSE 主轴向量 Y（组码 21）")?;
        let ratio = ratio.unwrap_or(1.0);
        validate_axes(DVec2::new(major_x, major_y), ratio)?;

        let mut ellipse = Ellipse::from_dxf(
            &self.drawing.context.space,
            require(cx, "ELLIPSE 圆心 X（组码 10）")?,
            require(cy, "ELLIPSE 圆心 Y（组码 20）")?,
            major_x,
            major_y,
            ratio,
        );
        if let Some(start) = start {
            ellipse.set_start_angle(start);
        }
        if let Some(end) = end {
            ellipse.set_end_angle(end);
        }
        ellipse.set_z_extrusion_negative(is_mirrored(extrusion_z));
        ellipse.style = style;
        Ok(ellipse.into())
    }

    fn parse_lwpolyline(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let mut closed = false;
        let mut extrusion_z = 1.0;
        // (x, y, 离开该顶点的凸度)
        let mut vertices: Vec<(f64, f64, f64)> = Vec::new();
        let mut pending_x: Option<f64> = None;
        read_entity_body(&mut self.reader, "LWPOLYLINE", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                70 => closed = parse_i32(&value, "LWPOLYLINE 标志")? & 0x01 == 0x01,
                10 => {
                    let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                    if pending_x.replace(x).is_some() {
                        return Err(DxfError::invalid("LWPOLYLINE 顶点缺少对应的 Y（组码 20）"));
                    }
                }
                20 => {
                    let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                    let x = pending_x
                        .take()
                        .ok_or_else(|| DxfError::invalid("LWPOLYLINE 顶点缺少对应的 X（组码 10）"))?;
                    vertices.push((x, y, 0.0));
                }
                42 => {
                    let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                    let vertex = vertices.last_mut().ok_or_else(|| {
                        DxfError::invalid("LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）")
                    })?;
                    vertex.2 = bulge;
                }
                230 => extrusion_z = parse_f64(&value, "LWPOLYLINE 法向量 Z")?,
                _ => {}
            }
            Ok(())
        })?;

        if pending_x.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }
        if vertices.is_empty() {
            return Err(DxfError::invalid("LWPOLYLINE 未解析到任何顶点"));
        }

        let mirrored = is_mirrored(extrusion_z);
        let space = &self.drawing.context.space;
        let mut polyline = Polyline::from_dxf_vertices(
            vertices.into_iter().map(|(x, y, bulge)| {
                if mirrored {
                    (Point::from_dxf(space, -x, y), -bulge)
                } else {
                    (Point::from_dxf(space, x, y), bulge)
                }
            }),
            closed,
        );
        polyline.style = style;
        Ok(polyline.into())
    }

    /// HATCH 的组码按上下文映射为状态机输入。
    fn parse_hatch(&mut self) -> Result<SvgElement, DxfError> {
        let mut hatch = Hatch::new("", false);
        let mut polyline_loop = false;
        let context = &mut self.drawing.context;
        read_entity_body(&mut self.reader, "HATCH", |code, value| {
            if apply_common(&mut hatch.style, code, &value)? {
                if code == 8 {
                    declare_layer(context, &hatch.style.layer);
                }
                return Ok(());
            }
            let input = match code {
                2 => {
                    hatch.set_pattern_name(value.trim());
                    return Ok(());
                }
                70 => {
                    hatch.solid = parse_i32(&value, "HATCH 实体填充标志")? & 0x01 != 0;
                    return Ok(());
                }
                10 => HatchValue::PointX(parse_f64(&value, "HATCH X（组码 10）")?),
                20 => HatchValue::PointY(parse_f64(&value, "HATCH Y（组码 20）")?),
                11 => HatchValue::EndPointX(parse_f64(&value, "HATCH 终点 X（组码 11）")?),
                21 => HatchValue::EndPointY(parse_f64(&value, "HATCH 终点 Y（组码 21）")?),
                42 => HatchValue::Bulge(parse_f64(&value, "HATCH 凸度（组码 42）")?),
                91 => HatchValue::NewBoundaryCount(parse_i32(&value, "HATCH 边界数（组码 91）")?),
                92 => {
                    let flags = parse_i32(&value, "HATCH 边界类型（组码 92）")?;
                    polyline_loop = flags & POLYLINE_BOUNDARY_FLAG != 0;
                    HatchValue::NewBoundaryStart(flags)
                }
                // 多段线边界中 72 为“是否带凸度”标志
                72 if polyline_loop => return Ok(()),
                72 => HatchValue::EdgeTypeSelector(parse_i32(&value, "HATCH 边类型（组码 72）")?),
                73 if polyline_loop => {
                    HatchValue::PolylineClosed(parse_i32(&value, "HATCH 闭合标志（组码 73）")? != 0)
                }
                73 => HatchValue::CcwFlag(SweepDirection::try_from(parse_i32(
                    &value,
                    "HATCH 逆时针标志（组码 73）",
                )?)?),
                40 => HatchValue::Radius(parse_f64(&value, "HATCH 半径（组码 40）")?),
                50 => HatchValue::StartAngle(parse_f64(&value, "HATCH 起始角（组码 50）")?),
                51 => HatchValue::EndAngle(parse_f64(&value, "HATCH 终止角（组码 51）")?),
                75 => {
                    polyline_loop = false;
                    HatchValue::HatchStyleSelector(parse_i32(&value, "HATCH 填充样式（组码 75）")?)
                }
                53 => HatchValue::PatternAngle(parse_f64(&value, "HATCH 图案线角度（组码 53）")?),
                43 => HatchValue::PatternBaseX(parse_f64(&value, "HATCH 图案基点 X（组码 43）")?),
                44 => HatchValue::PatternBaseY(parse_f64(&value, "HATCH 图案基点 Y（组码 44）")?),
                45 => HatchValue::PatternOffsetX(parse_f64(&value, "HATCH 图案偏移 X（组码 45）")?),
                46 => HatchValue::PatternOffsetY(parse_f64(&value, "HATCH 图案偏移 Y（组码 46）")?),
                79 => HatchValue::DashCount(parse_i32(&value, "HATCH 虚线段数（组码 79）")?),
                49 => HatchValue::DashLength(parse_f64(&value, "HATCH 虚线段长度（组码 49）")?),
                41 => HatchValue::PatternScale(parse_f64(&value, "HATCH 图案比例（组码 41）")?),
                78 => HatchValue::PatternLineCount(parse_i32(&value, "HATCH 图案线数（组码 78）")?),
                98 => HatchValue::SeedCount(parse_i32(&value, "HATCH 种子点数（组码 98）")?),
                _ => return Ok(()),
            };
            hatch.feed(context, input)?;
            Ok(())
        })?;

        declare_layer(&mut self.drawing.context, &hatch.style.layer);
        hatch.finish(&mut self.drawing.context)?;
        Ok(hatch.into())
    }

    fn font_for(&self, style_name: Option<&str>) -> Option<String> {
        let name = style_name?;
        let font = self.text_styles.get(&name.to_ascii_uppercase()).cloned();
        if font.is_none() {
            debug!(style = name, "文字样式没有可用字体，使用默认字体");
        }
        font
    }

    fn parse_text(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let mut content = String::new();
        let mut style_name: Option<String> = None;
        let (mut x, mut y, mut align_x, mut align_y) = (None, None, None, None);
        let mut height = None;
        let mut width_factor = 1.0;
        let mut rotation = 0.0;
        let (mut horizontal, mut vertical) = (0, 0);
        read_entity_body(&mut self.reader, "TEXT", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                1 => content = value,
                7 => style_name = Some(value.trim().to_string()),
                10 => fill_once(&mut x, &value, "TEXT 插入点 X（组码 10）")?,
                20 => fill_once(&mut y, &value, "TEXT 插入点 Y（组码 20）")?,
                11 => fill_once(&mut align_x, &value, "TEXT 对齐点 X（组码 11）")?,
                21 => fill_once(&mut align_y, &value, "TEXT 对齐点 Y（组码 21）")?,
                40 => fill_once(&mut height, &value, "TEXT 字高（组码 40）")?,
                41 => width_factor = parse_f64(&value, "TEXT 宽度因子（组码 41）")?,
                50 => rotation = parse_f64(&value, "TEXT 旋转角（组码 50）")?,
                72 => horizontal = parse_i32(&value, "TEXT 水平对齐（组码 72）")?,
                73 => vertical = parse_i32(&value, "TEXT 垂直对齐（组码 73）")?,
                _ => {}
            }
            Ok(())
        })?;

        // 非默认对齐（对齐、布满除外）以第二对齐点为锚点
        let uses_alignment_point = matches!(horizontal, 1 | 2 | 4) || vertical != 0;
        let (anchor_x, anchor_y) = match (uses_alignment_point, align_x, align_y) {
            (true, Some(ax), Some(ay)) => (ax, ay),
            _ => (
                require(x, "TEXT 插入点 X（组码 10）")?,
                require(y, "TEXT 插入点 Y（组码 20）")?,
            ),
        };
        let height = require(height, "TEXT 字高（组码 40）")?;
        let anchor = Point::from_dxf(&self.drawing.context.space, anchor_x, anchor_y);
        let mut text = Text::single_line(anchor, text::decode_special_codes(&content), height);
        text.width_factor = width_factor;
        text.rotation = rotation;
        text.alignment = TextAnchor::from_text_justification(horizontal);
        text.font_family = self.font_for(style_name.as_deref());
        text.style = style;
        Ok(text.into())
    }

    fn parse_mtext(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let mut content = String::new();
        let mut style_name: Option<String> = None;
        let (mut x, mut y, mut height) = (None, None, None);
        let mut reference_width = None;
        let mut attachment = 1;
        let mut rotation = 0.0;
        let (mut direction_x, mut direction_y) = (None, None);
        read_entity_body(&mut self.reader, "MTEXT", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                // 3 为前置分块，1 为最后一块
                1 | 3 => content.push_str(&value),
                7 => style_name = Some(value.trim().to_string()),
                10 => fill_once(&mut x, &value, "MTEXT 插入点 X（组码 10）")?,
                20 => fill_once(&mut y, &value, "MTEXT 插入点 Y（组码 20）")?,
                40 => fill_once(&mut height, &value, "MTEXT 字高（组码 40）")?,
                41 => reference_width = Some(parse_f64(&value, "MTEXT 参考宽度（组码 41）")?),
                71 => attachment = parse_i32(&value, "MTEXT 附着点（组码 71）")?,
                50 => rotation = parse_f64(&value, "MTEXT 旋转角（组码 50）")?,
                11 => direction_x = Some(parse_f64(&value, "MTEXT 方向 X（组码 11）")?),
                21 => direction_y = Some(parse_f64(&value, "MTEXT 方向 Y（组码 21）")?),
                _ => {}
            }
            Ok(())
        })?;

        let anchor = Point::from_dxf(
            &self.drawing.context.space,
            require(x, "MTEXT 插入点 X（组码 10）")?,
            require(y, "MTEXT 插入点 Y（组码 20）")?,
        );
        let mut text = Text::multi_line(anchor, content, require(height, "MTEXT 字高（组码 40）")?);
        text.reference_width = reference_width.filter(|width| *width > 0.0);
        text.alignment = TextAnchor::from_attachment(attachment);
        // 方向向量优先于旋转角
        text.rotation = match (direction_x, direction_y) {
            (Some(dx), Some(dy)) if dx != 0.0 || dy != 0.0 => dy.atan2(dx).to_degrees(),
            _ => rotation,
        };
        text.font_family = self.font_for(style_name.as_deref());
        text.style = style;
        Ok(text.into())
    }

    fn parse_insert(&mut self) -> Result<SvgElement, DxfError> {
        let mut style = EntityStyle::default();
        let mut name: Option<String> = None;
        let (mut x, mut y) = (None, None);
        let (mut scale_x, mut scale_y) = (1.0, 1.0);
        let mut rotation = 0.0;
        read_entity_body(&mut self.reader, "INSERT", |code, value| {
            if apply_common(&mut style, code, &value)? {
                return Ok(());
            }
            match code {
                2 => name = Some(value.trim().to_string()),
                10 => fill_once(&mut x, &value, "INSERT 插入点 X（组码 10）")?,
                20 => fill_once(&mut y, &value, "INSERT 插入点 Y（组码 20）")?,
                41 => scale_x = parse_f64(&value, "INSERT X 比例（组码 41）")?,
                42 => scale_y = parse_f64(&value, "INSERT Y 比例（组码 42）")?,
                50 => rotation = parse_f64(&value, "INSERT 旋转角（组码 50）")?,
                _ => {}
            }
            Ok(())
        })?;

        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        if !self.drawing.has_declaration(&name) {
            warn!(block = %name, "引用了未定义的块");
        }
        let anchor = Point::from_dxf(
            &self.drawing.context.space,
            require(x, "INSERT 插入点 X（组码 10）")?,
            require(y, "INSERT 插入点 Y（组码 20）")?,
        );
        let mut reference = Reference::new(block_id(&name), anchor);
        reference.rotation = rotation;
        reference.scale_x = scale_x;
        reference.scale_y = scale_y;
        reference.style = style;
        Ok(reference.into())
    }
}
