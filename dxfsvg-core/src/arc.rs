//! 圆弧路径生成：DXF 的圆心/半径/起止角 → SVG 椭圆弧命令。

use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use crate::context::{ConversionContext, SpaceConverter};
use crate::element::{HasStyle, Renderable, write_element};
use crate::errors::GeometryError;
use crate::format::{self, TagBuilder};
use crate::geometry::{Point, PointFormat};
use crate::locality::DoubleEnded;
use crate::style::EntityStyle;

/// 半径裁剪为 0 时输出的替代值。
pub const MIN_RADIUS: f64 = 0.001;

/// 弧的绘制方向，对应 DXF 的 0/1 标志。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    Clockwise,
    CounterClockwise,
}

impl TryFrom<i32> for SweepDirection {
    type Error = GeometryError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SweepDirection::Clockwise),
            1 => Ok(SweepDirection::CounterClockwise),
            other => Err(GeometryError::IllegalSweepFlag(other)),
        }
    }
}

/// SVG 弧命令的两个标志位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcFlags {
    pub large_arc: bool,
    pub sweep: bool,
}

impl ArcFlags {
    pub fn as_str(self) -> String {
        format!("{},{}", u8::from(self.large_arc), u8::from(self.sweep))
    }
}

/// 半径裁剪后为 0 时替换为 [`MIN_RADIUS`]，避免渲染器崩溃。
pub fn clamp_radius(radius: f64, precision: usize) -> f64 {
    let trimmed = format::trim(radius.abs(), precision);
    if trimmed == 0.0 { MIN_RADIUS } else { trimmed }
}

/// 半径必须是有限正数。
pub fn validate_radius(radius: f64) -> Result<f64, GeometryError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(radius)
    } else {
        Err(GeometryError::DegenerateGeometry(format!(
            "radius must be positive, got {radius}"
        )))
    }
}

/// 圆弧。圆心位于 SVG 空间，半径为 SVG 单位，角度为 DXF 约定的度数。
#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    center: Point,
    radius: f64,
    start_angle: f64,
    end_angle: f64,
    counter_clockwise: bool,
    pub style: EntityStyle,
    endpoints: OnceCell<(Point, Point)>,
}

impl Arc {
    pub fn new(center: Point, radius: f64, start_angle: f64, end_angle: f64) -> Self {
        Self {
            center,
            radius: radius.abs(),
            start_angle,
            end_angle,
            counter_clockwise: true,
            style: EntityStyle::default(),
            endpoints: OnceCell::new(),
        }
    }

    /// 由 DXF 空间数值构造；半径按单位比例换算。
    pub fn from_dxf<S: SpaceConverter + ?Sized>(
        space: &S,
        cx: f64,
        cy: f64,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    ) -> Self {
        Self::new(
            Point::from_dxf(space, cx, cy),
            space.scale_length(radius),
            start_angle,
            end_angle,
        )
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn start_angle(&self) -> f64 {
        self.start_angle
    }

    pub fn end_angle(&self) -> f64 {
        self.end_angle
    }

    pub fn is_counter_clockwise(&self) -> bool {
        self.counter_clockwise
    }

    pub fn set_center(&mut self, center: Point) {
        self.center = center;
        self.endpoints.take();
    }

    pub fn set_radius(&mut self, radius: f64) {
        self.radius = radius.abs();
        self.endpoints.take();
    }

    pub fn set_start_angle(&mut self, degrees: f64) {
        self.start_angle = degrees;
        self.endpoints.take();
    }

    pub fn set_end_angle(&mut self, degrees: f64) {
        self.end_angle = degrees;
        self.endpoints.take();
    }

    pub fn set_direction(&mut self, direction: SweepDirection) {
        self.counter_clockwise = direction == SweepDirection::CounterClockwise;
        self.endpoints.take();
    }

    /// 顺时针数据按 `360 - angle` 镜像。
    fn effective_angles(&self) -> (f64, f64) {
        if self.counter_clockwise {
            (self.start_angle, self.end_angle)
        } else {
            (360.0 - self.start_angle, 360.0 - self.end_angle)
        }
    }

    fn point_at(&self, degrees: f64) -> Point {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Point::from_svg(
            self.center.x() + self.radius * cos,
            self.center.y() - self.radius * sin,
            self.center.fuzz(),
        )
    }

    /// 起点与终点，首次访问时计算并缓存。
    pub fn endpoints(&self) -> (Point, Point) {
        *self.endpoints.get_or_init(|| {
            let (start, end) = self.effective_angles();
            (self.point_at(start), self.point_at(end))
        })
    }

    /// 沿绘制方向扫过的角度，范围 (0, 360]。
    pub fn swept_angle(&self) -> f64 {
        let span = (self.end_angle - self.start_angle).rem_euclid(360.0);
        if span == 0.0 { 360.0 } else { span }
    }

    fn is_degenerate_full_circle(&self) -> bool {
        self.start_angle.rem_euclid(360.0) == self.end_angle.rem_euclid(360.0)
    }

    pub fn flags(&self) -> ArcFlags {
        ArcFlags {
            large_arc: self.swept_angle() >= 180.0,
            sweep: !self.counter_clockwise,
        }
    }

    /// 生成路径数据。`continued` 为真时省略 `M`，用于拼接到已有路径。
    pub fn path_data<S: SpaceConverter + ?Sized>(&self, space: &S, continued: bool) -> String {
        let precision = space.precision();
        let (start, end) = self.endpoints();
        let radius = format::fmt_raw(clamp_radius(self.radius, precision));
        let mut data = String::new();
        if !continued {
            let start_y = if self.is_degenerate_full_circle() {
                format::fmt_trimmed(start.y(), 0)
            } else {
                space.fmt(start.y())
            };
            data.push_str(&format!("M {},{} ", space.fmt(start.x()), start_y));
        }
        data.push_str(&format!(
            "A {radius},{radius} 0 {} {}",
            self.flags().as_str(),
            end.format(PointFormat::Default, precision)
        ));
        data
    }
}

impl DoubleEnded for Arc {
    fn start_point(&self) -> Option<Point> {
        Some(self.endpoints().0)
    }

    fn end_point(&self) -> Option<Point> {
        Some(self.endpoints().1)
    }
}

impl HasStyle for Arc {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Arc {
    fn tag(&self) -> &'static str {
        "path"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let tag = TagBuilder::new("path").attr("d", self.path_data(ctx, false));
        write_element(tag, &self.style, ctx, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin_arc(start: f64, end: f64) -> Arc {
        Arc::new(Point::from_svg(10.0, 10.0, 0.01), 1.0, start, end)
    }

    #[test]
    fn quarter_arc_counter_clockwise() {
        let arc = origin_arc(0.0, 90.0);
        let (start, end) = arc.endpoints();
        assert!((start.x() - 11.0).abs() < 1e-9);
        assert!((start.y() - 10.0).abs() < 1e-9);
        assert!((end.x() - 10.0).abs() < 1e-9);
        assert!((end.y() - 9.0).abs() < 1e-9);
        assert_eq!(
            arc.flags(),
            ArcFlags {
                large_arc: false,
                sweep: false
            }
        );
        let space = crate::context::DrawingSpace::default();
        assert_eq!(arc.path_data(&space, false), "M 11,10 A 1,1 0 0,0 10,9");
        assert_eq!(arc.path_data(&space, true), "A 1,1 0 0,0 10,9");
    }

    #[test]
    fn clockwise_data_is_mirrored() {
        let mut arc = origin_arc(0.0, 270.0);
        arc.set_direction(SweepDirection::Clockwise);
        let (_, end) = arc.endpoints();
        // 360 - 270 = 90°：终点位于圆心上方
        assert!((end.y() - 9.0).abs() < 1e-9);
        let flags = arc.flags();
        assert!(flags.sweep);
        assert!(flags.large_arc);
    }

    #[test]
    fn large_arc_tracks_swept_angle() {
        for (start, end, large) in [
            (0.0, 90.0, false),
            (0.0, 180.0, true),
            (0.0, 181.0, true),
            (350.0, 10.0, false),
            (10.0, 350.0, true),
        ] {
            assert_eq!(origin_arc(start, end).flags().large_arc, large, "{start}->{end}");
        }
    }

    #[test]
    fn sweep_is_complement_of_direction() {
        for direction in [SweepDirection::Clockwise, SweepDirection::CounterClockwise] {
            let mut arc = origin_arc(30.0, 60.0);
            arc.set_direction(direction);
            assert_eq!(arc.flags().sweep, !arc.is_counter_clockwise());
        }
    }

    #[test]
    fn zero_radius_is_clamped() {
        let arc = Arc::new(Point::from_svg(0.0, 0.0, 0.0), 0.0001, 0.0, 90.0);
        let space = crate::context::DrawingSpace::default();
        assert!(arc.path_data(&space, true).starts_with("A 0.001,0.001 "));
    }

    #[test]
    fn degenerate_full_circle_trims_start_y() {
        let arc = Arc::new(Point::from_svg(5.0, 5.4, 0.0), 2.0, 90.0, 90.0);
        let space = crate::context::DrawingSpace::default();
        // 起点 y = 5.4 - 2 = 3.4，输出时截到整数
        assert!(arc.path_data(&space, false).starts_with("M 5,3 "));
    }

    #[test]
    fn setters_invalidate_cached_endpoints() {
        let mut arc = origin_arc(0.0, 90.0);
        let before = arc.endpoints();
        arc.set_end_angle(180.0);
        assert_ne!(arc.endpoints().1, before.1);
    }

    #[test]
    fn non_positive_radius_is_degenerate() {
        assert_eq!(validate_radius(2.5), Ok(2.5));
        assert!(matches!(validate_radius(0.0), Err(GeometryError::DegenerateGeometry(_))));
        assert!(matches!(validate_radius(-1.0), Err(GeometryError::DegenerateGeometry(_))));
        assert!(validate_radius(f64::NAN).is_err());
    }

    #[test]
    fn sweep_flag_parsing() {
        assert_eq!(SweepDirection::try_from(1), Ok(SweepDirection::CounterClockwise));
        assert_eq!(
            SweepDirection::try_from(2),
            Err(GeometryError::IllegalSweepFlag(2))
        );
    }
}
