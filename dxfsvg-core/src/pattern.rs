//! 填充图案：斜线族的瓦片包围盒计算与镜像补齐。

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::context::SpaceConverter;
use crate::format::{self, TagBuilder};

const ANGLE_EPSILON: f64 = 1e-9;

/// 线的角度所在象限（按 90° 分桶）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    UpperRight,
    UpperLeft,
    LowerLeft,
    LowerRight,
}

impl Quadrant {
    pub fn of_angle(degrees: f64) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        if normalized < 90.0 {
            Quadrant::UpperRight
        } else if normalized < 180.0 {
            Quadrant::UpperLeft
        } else if normalized < 270.0 {
            Quadrant::LowerLeft
        } else {
            Quadrant::LowerRight
        }
    }

    /// 镜像副本的水平偏移方向。
    fn repeat_sign(self) -> f64 {
        match self {
            Quadrant::UpperRight | Quadrant::LowerLeft => -1.0,
            Quadrant::UpperLeft | Quadrant::LowerRight => 1.0,
        }
    }
}

/// 图案中的一条线族定义（DXF 单位）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchLine {
    /// 角度，单位为度。
    pub angle: f64,
    pub base: DVec2,
    pub offset: DVec2,
    /// 正值为实线段，负值为空白，0 为点。
    pub dashes: Vec<f64>,
    /// 声明的线段数量（组码 79），用于校验。
    pub dash_count: Option<usize>,
}

impl HatchLine {
    pub fn new(angle: f64) -> Self {
        Self {
            angle,
            base: DVec2::ZERO,
            offset: DVec2::ZERO,
            dashes: Vec::new(),
            dash_count: None,
        }
    }

    pub fn with_base(mut self, x: f64, y: f64) -> Self {
        self.base = DVec2::new(x, y);
        self
    }

    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset = DVec2::new(x, y);
        self
    }

    pub fn with_dashes(mut self, dashes: Vec<f64>) -> Self {
        self.dashes = dashes;
        self
    }

    pub fn quadrant(&self) -> Quadrant {
        Quadrant::of_angle(self.angle)
    }

    fn dash_length(&self) -> f64 {
        self.dashes.iter().map(|d| d.abs()).sum()
    }

    /// 由基点、偏移点与 X 轴构成的三角形推导出的瓦片宽高。
    pub fn bounding_box(&self) -> (f64, f64) {
        let radians = self.angle.to_radians();
        let (sin, cos) = radians.sin_cos();
        let spacing = self.offset.length();
        if sin.abs() < ANGLE_EPSILON {
            let width = self.dash_length().max(self.offset.x.abs());
            let width = if width > 0.0 { width } else { spacing };
            (width, self.offset.y.abs())
        } else if cos.abs() < ANGLE_EPSILON {
            let height = self.dash_length().max(self.offset.y.abs());
            let height = if height > 0.0 { height } else { spacing };
            (self.offset.x.abs(), height)
        } else {
            let width = (spacing / sin).abs();
            (width, (width * radians.tan()).abs())
        }
    }
}

/// 命名的图案瓦片定义。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatchPattern {
    name: String,
    scale: f64,
    lines: Vec<HatchLine>,
    repeats: Vec<HatchLine>,
    width: f64,
    height: f64,
    /// 线条颜色，不参与相等比较。
    colour: String,
}

/// 名称、宽、高、比例与线数完全一致即视为同一图案。
impl PartialEq for HatchPattern {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.width == other.width
            && self.height == other.height
            && self.scale == other.scale
            && self.lines.len() == other.lines.len()
    }
}

impl HatchPattern {
    pub fn new(name: impl Into<String>, scale: f64) -> Self {
        Self {
            name: name.into(),
            scale,
            lines: Vec::new(),
            repeats: Vec::new(),
            width: 0.0,
            height: 0.0,
            colour: "#000000".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub fn lines(&self) -> &[HatchLine] {
        &self.lines
    }

    pub fn repeats(&self) -> &[HatchLine] {
        &self.repeats
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn colour(&self) -> &str {
        &self.colour
    }

    pub fn set_colour(&mut self, colour: impl Into<String>) {
        self.colour = colour.into();
    }

    /// 追加一条线；`last` 为真时计算瓦片尺寸，多线图案还会生成镜像副本。
    pub fn add_line(&mut self, line: HatchLine, last: bool) {
        self.lines.push(line);
        if last {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let (width, height) = self
            .lines
            .iter()
            .map(HatchLine::bounding_box)
            .fold((0.0_f64, 0.0_f64), |(w, h), (lw, lh)| (w.max(lw), h.max(lh)));
        self.width = width;
        self.height = height;
        self.repeats.clear();
        if self.lines.len() > 1 {
            self.repeats = self
                .lines
                .iter()
                .map(|line| {
                    let mut copy = line.clone();
                    copy.base.x += line.quadrant().repeat_sign() * width;
                    copy
                })
                .collect();
        }
    }

    /// 输出 `<pattern>` 定义。
    pub fn to_svg(&self, id: &str, space: &dyn SpaceConverter, stroke_width: f64) -> String {
        let width = space.scale_length(self.width);
        let height = space.scale_length(self.height);
        let mut out = TagBuilder::new("pattern")
            .attr("id", id)
            .attr("patternUnits", "userSpaceOnUse")
            .attr("width", space.fmt(width))
            .attr("height", space.fmt(height))
            .open();
        out.push('\n');
        for line in self.lines.iter().chain(self.repeats.iter()) {
            out.push_str(&self.line_svg(line, space, width, height, stroke_width));
            out.push('\n');
        }
        out.push_str("</pattern>");
        out
    }

    fn line_svg(
        &self,
        line: &HatchLine,
        space: &dyn SpaceConverter,
        width: f64,
        height: f64,
        stroke_width: f64,
    ) -> String {
        let (sin, cos) = line.angle.to_radians().sin_cos();
        let x1 = space.scale_length(line.base.x);
        let y1 = height - space.scale_length(line.base.y);
        let (dx, dy) = if sin.abs() < ANGLE_EPSILON {
            (width * cos.signum(), 0.0)
        } else if cos.abs() < ANGLE_EPSILON {
            (0.0, -height * sin.signum())
        } else {
            (width * cos.signum(), -height * sin.signum())
        };
        let dashes: Vec<String> = line
            .dashes
            .iter()
            .map(|dash| space.fmt(space.scale_length(dash.abs())))
            .collect();
        let dash_array = if line.dashes.iter().any(|d| d.abs() > 0.0) {
            Some(dashes.join(","))
        } else {
            None
        };
        TagBuilder::new("line")
            .attr("x1", space.fmt(x1))
            .attr("y1", space.fmt(y1))
            .attr("x2", space.fmt(x1 + dx))
            .attr("y2", space.fmt(y1 + dy))
            .attr("stroke", &self.colour)
            .attr("stroke-width", format::fmt_trimmed(stroke_width, space.precision()))
            .attr_opt("stroke-dasharray", dash_array)
            .self_closing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DrawingSpace;

    fn ansi31(offset: f64) -> HatchPattern {
        let mut pattern = HatchPattern::new("ANSI31", 1.0);
        pattern.add_line(HatchLine::new(45.0).with_offset(-offset, offset), true);
        pattern
    }

    #[test]
    fn quadrant_buckets() {
        assert_eq!(Quadrant::of_angle(45.0), Quadrant::UpperRight);
        assert_eq!(Quadrant::of_angle(90.0), Quadrant::UpperLeft);
        assert_eq!(Quadrant::of_angle(200.0), Quadrant::LowerLeft);
        assert_eq!(Quadrant::of_angle(-45.0), Quadrant::LowerRight);
        assert_eq!(Quadrant::of_angle(405.0), Quadrant::UpperRight);
    }

    #[test]
    fn diagonal_line_bounding_box() {
        let line = HatchLine::new(45.0).with_offset(-2.0, 2.0);
        let (w, h) = line.bounding_box();
        assert!((w - 4.0).abs() < 1e-9);
        assert!((h - 4.0).abs() < 1e-9);
    }

    #[test]
    fn single_line_has_no_repeats() {
        let pattern = ansi31(2.0);
        assert!(pattern.repeats().is_empty());
        assert!((pattern.width() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn multi_line_pattern_mirrors_by_quadrant() {
        let mut pattern = HatchPattern::new("CROSS", 1.0);
        pattern.add_line(HatchLine::new(45.0).with_offset(-1.0, 1.0), false);
        pattern.add_line(HatchLine::new(135.0).with_offset(-1.0, -1.0), true);
        let width = pattern.width();
        assert_eq!(pattern.repeats().len(), 2);
        assert!((pattern.repeats()[0].base.x + width).abs() < 1e-9);
        assert!((pattern.repeats()[1].base.x - width).abs() < 1e-9);
    }

    #[test]
    fn equality_contract() {
        assert_eq!(ansi31(2.0), ansi31(2.0));
        assert_ne!(ansi31(2.0), ansi31(3.0));
        let mut renamed = ansi31(2.0);
        renamed.name = "ANSI32".into();
        assert_ne!(ansi31(2.0), renamed);
        let mut rescaled = ansi31(2.0);
        rescaled.set_scale(2.0);
        assert_ne!(ansi31(2.0), rescaled);
        let mut extra = HatchPattern::new("ANSI31", 1.0);
        extra.add_line(HatchLine::new(45.0).with_offset(-2.0, 2.0), false);
        extra.add_line(HatchLine::new(45.0).with_offset(-2.0, 2.0), true);
        assert_ne!(ansi31(2.0), extra);
    }

    #[test]
    fn renders_user_space_pattern() {
        let space = DrawingSpace::new(1.0, 2, 0.01);
        let mut pattern = HatchPattern::new("DASH", 1.0);
        pattern.add_line(
            HatchLine::new(0.0)
                .with_offset(0.0, 2.0)
                .with_dashes(vec![1.0, -0.5]),
            true,
        );
        let svg = pattern.to_svg("hatch-DASH", &space, 1.0);
        assert!(svg.starts_with(
            "<pattern id=\"hatch-DASH\" patternUnits=\"userSpaceOnUse\" width=\"1.5\" height=\"2\">"
        ));
        assert!(svg.contains("stroke-dasharray=\"1,0.5\""));
        assert!(svg.ends_with("</pattern>"));
    }
}
