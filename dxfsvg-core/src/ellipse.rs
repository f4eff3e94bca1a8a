//! 椭圆与椭圆弧。
//!
//! 完整椭圆输出为 `<ellipse>`，部分椭圆弧输出为 `<path>`；类型由最终字段值
//! 推导，不随 setter 调用顺序变化。

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::arc::{ArcFlags, clamp_radius};
use crate::context::{ConversionContext, SpaceConverter};
use crate::element::{HasStyle, Renderable, write_element};
use crate::errors::GeometryError;
use crate::format::{self, TagBuilder};
use crate::geometry::{Point, PointFormat};
use crate::locality::DoubleEnded;
use crate::style::EntityStyle;

/// 起止点重合时对终点 X 的扰动量。
pub const COINCIDENT_END_NUDGE: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EllipseShape {
    /// 原生 `<ellipse>`。
    Full,
    /// 椭圆弧 `<path>`。
    Arc,
}

/// 旋转椭圆上参数角 `angle` 处的点。
///
/// `rotation` 与 `angle` 均为弧度；调用方负责把 DXF 角度转换为 SVG 朝向（取负）。
pub fn calculate_end_point_of_ellipse(
    center: DVec2,
    rx: f64,
    ry: f64,
    rotation: f64,
    angle: f64,
) -> DVec2 {
    let (sin_a, cos_a) = angle.sin_cos();
    let (sin_r, cos_r) = rotation.sin_cos();
    DVec2::new(
        center.x + rx * cos_a * cos_r - ry * sin_a * sin_r,
        center.y + ry * sin_a * cos_r + rx * cos_a * sin_r,
    )
}

/// 长轴相对 X 轴的逆时针角度，范围 `[0, 2π)`。
///
/// `atan` 只能给出 ±π/2 内的值，这里按长轴端点所在象限修正。
pub fn major_axis_rotation(major_axis: DVec2) -> f64 {
    let DVec2 { x, y } = major_axis;
    if x == 0.0 {
        return if y >= 0.0 { FRAC_PI_2 } else { PI + FRAC_PI_2 };
    }
    let base = (y / x).abs().atan();
    match (x > 0.0, y >= 0.0) {
        (true, true) => base,
        (false, true) => PI - base,
        (false, false) => PI + base,
        (true, false) => TAU - base,
    }
}

/// 主轴向量不能为零，半径比必须为正。
pub fn validate_axes(major_axis: DVec2, ratio: f64) -> Result<(), GeometryError> {
    if !major_axis.is_finite() || major_axis.length_squared() < f64::EPSILON * f64::EPSILON {
        return Err(GeometryError::DegenerateGeometry(format!(
            "ellipse major axis {major_axis} has zero length"
        )));
    }
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(GeometryError::DegenerateGeometry(format!(
            "ellipse axis ratio must be positive, got {ratio}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ellipse {
    center: Point,
    /// 长轴端点相对圆心的向量，DXF 单位。
    major_axis: DVec2,
    ratio: f64,
    unit_scale: f64,
    /// 弧度。
    start_angle: Option<f64>,
    end_angle: Option<f64>,
    counter_clockwise: bool,
    z_extrusion_negative: bool,
    pub style: EntityStyle,
}

impl Ellipse {
    pub fn new(center: Point, major_axis: DVec2, ratio: f64, unit_scale: f64) -> Self {
        Self {
            center,
            major_axis,
            ratio: ratio.abs(),
            unit_scale,
            start_angle: None,
            end_angle: None,
            counter_clockwise: true,
            z_extrusion_negative: false,
            style: EntityStyle::default(),
        }
    }

    pub fn from_dxf<S: SpaceConverter + ?Sized>(
        space: &S,
        cx: f64,
        cy: f64,
        major_x: f64,
        major_y: f64,
        ratio: f64,
    ) -> Self {
        Self::new(
            Point::from_dxf(space, cx, cy),
            DVec2::new(major_x, major_y),
            ratio,
            space.unit_scale(),
        )
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn major_axis(&self) -> DVec2 {
        self.major_axis
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn set_center(&mut self, center: Point) {
        self.center = center;
    }

    pub fn set_major_axis(&mut self, major_axis: DVec2) {
        self.major_axis = major_axis;
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.abs();
    }

    pub fn set_start_angle(&mut self, radians: f64) {
        self.start_angle = Some(radians);
    }

    pub fn set_end_angle(&mut self, radians: f64) {
        self.end_angle = Some(radians);
    }

    pub fn set_counter_clockwise(&mut self, ccw: bool) {
        self.counter_clockwise = ccw;
    }

    pub fn set_z_extrusion_negative(&mut self, negative: bool) {
        self.z_extrusion_negative = negative;
    }

    /// 起止角都给出且不是 `0 → 2π` 时为椭圆弧。
    pub fn shape(&self) -> EllipseShape {
        match (self.start_angle, self.end_angle) {
            (Some(start), Some(end)) if !(start == 0.0 && end >= TAU) => EllipseShape::Arc,
            _ => EllipseShape::Full,
        }
    }

    fn is_mirrored(&self) -> bool {
        self.z_extrusion_negative ^ !self.counter_clockwise
    }

    /// 参与绘制的起止角；镜像时取 `π + (π - angle)`。
    pub fn effective_angles(&self) -> (f64, f64) {
        let start = self.start_angle.unwrap_or(0.0);
        let end = self.end_angle.unwrap_or(TAU);
        if self.is_mirrored() {
            (PI + (PI - start), PI + (PI - end))
        } else {
            (start, end)
        }
    }

    /// 长轴逆时针旋转角（DXF 朝向，弧度）。
    pub fn rotation(&self) -> f64 {
        major_axis_rotation(self.major_axis)
    }

    /// SVG 朝向的旋转角（度）。
    pub fn svg_rotation_degrees(&self) -> f64 {
        -self.major_axis.y.atan2(self.major_axis.x).to_degrees()
    }

    pub fn rx(&self) -> f64 {
        self.major_axis.length() * self.unit_scale
    }

    pub fn ry(&self) -> f64 {
        self.rx() * self.ratio
    }

    /// 沿绘制方向扫过的角度，范围 `(0, 2π]`。
    pub fn swept_angle(&self) -> f64 {
        let start = self.start_angle.unwrap_or(0.0);
        let end = self.end_angle.unwrap_or(TAU);
        let span = (end - start).rem_euclid(TAU);
        if span == 0.0 { TAU } else { span }
    }

    pub fn flags(&self) -> ArcFlags {
        ArcFlags {
            large_arc: self.swept_angle().to_degrees() >= 180.0,
            sweep: self.is_mirrored(),
        }
    }

    fn svg_point(&self, rotation: f64, angle: f64) -> Point {
        let pos = calculate_end_point_of_ellipse(
            self.center.pos(),
            self.rx(),
            self.ry(),
            -rotation,
            -angle,
        );
        Point::from_svg(pos.x, pos.y, self.center.fuzz())
    }

    /// 旋转后的绝对起止点。
    pub fn endpoints(&self) -> (Point, Point) {
        let rotation = self.rotation();
        let (start, end) = self.effective_angles();
        match self.shape() {
            EllipseShape::Full => {
                let point = self.svg_point(rotation, 0.0);
                (point, point)
            }
            EllipseShape::Arc => (self.svg_point(rotation, start), self.svg_point(rotation, end)),
        }
    }

    /// 终点字符串；与起点格式化结果相同时把 X 减去 [`COINCIDENT_END_NUDGE`]。
    /// 只影响输出文本，不回写几何数据。
    fn end_text(start: &Point, end: &Point, precision: usize) -> String {
        let start_text = start.format(PointFormat::Default, precision);
        let end_text = end.format(PointFormat::Default, precision);
        if start_text != end_text {
            return end_text;
        }
        let nudged = format::trim(end.x(), precision) - COINCIDENT_END_NUDGE;
        format!(
            "{},{}",
            format::fmt_trimmed(nudged, precision + 4),
            format::fmt_trimmed(end.y(), precision)
        )
    }

    fn radii_text(&self, precision: usize) -> String {
        format!(
            "{},{}",
            format::fmt_raw(clamp_radius(self.rx(), precision)),
            format::fmt_raw(clamp_radius(self.ry(), precision))
        )
    }

    /// 独立 `<path>` 的路径数据：未旋转的局部点，旋转由 `transform` 承担。
    pub fn local_path_data<S: SpaceConverter + ?Sized>(&self, space: &S) -> String {
        let precision = space.precision();
        let (start, end) = self.effective_angles();
        let start = self.svg_point(0.0, start);
        let end = self.svg_point(0.0, end);
        format!(
            "M {} A {} 0 {} {}",
            start.format(PointFormat::Default, precision),
            self.radii_text(precision),
            self.flags().as_str(),
            Self::end_text(&start, &end, precision)
        )
    }

    /// 绕原点旋转后把圆心移回原位所需的平移量。
    pub fn rotation_translation(&self) -> DVec2 {
        let center = self.center.pos();
        let distance = center.length();
        let base = center.y.atan2(center.x);
        let turned = base + self.svg_rotation_degrees().to_radians();
        DVec2::new(
            center.x - distance * turned.cos(),
            center.y - distance * turned.sin(),
        )
    }

    /// 拼接用的绝对弧命令（填充边界使用）。完整椭圆拆成两段半弧。
    pub fn arc_command<S: SpaceConverter + ?Sized>(&self, space: &S, continued: bool) -> String {
        let precision = space.precision();
        let rotation = self.rotation();
        let radii = self.radii_text(precision);
        let x_rotation = space.fmt(self.svg_rotation_degrees());
        let mut data = String::new();
        match self.shape() {
            EllipseShape::Full => {
                let first = self.svg_point(rotation, 0.0);
                let half = self.svg_point(rotation, PI);
                let sweep = u8::from(self.is_mirrored());
                if !continued {
                    data.push_str(&format!("M {} ", first.format(PointFormat::Default, precision)));
                }
                data.push_str(&format!(
                    "A {radii} {x_rotation} 0,{sweep} {} A {radii} {x_rotation} 0,{sweep} {}",
                    half.format(PointFormat::Default, precision),
                    first.format(PointFormat::Default, precision)
                ));
            }
            EllipseShape::Arc => {
                let (start, end) = self.endpoints();
                if !continued {
                    data.push_str(&format!("M {} ", start.format(PointFormat::Default, precision)));
                }
                data.push_str(&format!(
                    "A {radii} {x_rotation} {} {}",
                    self.flags().as_str(),
                    Self::end_text(&start, &end, precision)
                ));
            }
        }
        data
    }
}

impl DoubleEnded for Ellipse {
    fn start_point(&self) -> Option<Point> {
        Some(self.endpoints().0)
    }

    fn end_point(&self) -> Option<Point> {
        match self.shape() {
            EllipseShape::Full => None,
            EllipseShape::Arc => Some(self.endpoints().1),
        }
    }
}

impl HasStyle for Ellipse {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Ellipse {
    fn tag(&self) -> &'static str {
        match self.shape() {
            EllipseShape::Full => "ellipse",
            EllipseShape::Arc => "path",
        }
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let precision = ctx.precision();
        let rotation = ctx.trim(self.svg_rotation_degrees());
        let tag = match self.shape() {
            EllipseShape::Full => {
                let centre = self.center.format(PointFormat::CircleCentre, precision);
                let transform = (rotation != 0.0).then(|| {
                    format!(
                        "rotate({} {})",
                        format::fmt_raw(rotation),
                        self.center.format(PointFormat::Raw, precision)
                    )
                });
                TagBuilder::new("ellipse")
                    .raw(&centre)
                    .attr("rx", format::fmt_raw(clamp_radius(self.rx(), precision)))
                    .attr("ry", format::fmt_raw(clamp_radius(self.ry(), precision)))
                    .attr_opt("transform", transform)
            }
            EllipseShape::Arc => {
                let transform = (rotation != 0.0).then(|| {
                    let shift = self.rotation_translation();
                    format!(
                        "{} rotate({})",
                        Point::from_svg(shift.x, shift.y, 0.0)
                            .format(PointFormat::Transform, precision),
                        format::fmt_raw(rotation)
                    )
                });
                TagBuilder::new("path")
                    .attr("d", self.local_path_data(ctx))
                    .attr_opt("transform", transform)
            }
        };
        write_element(tag, &self.style, ctx, out);
    }
}
