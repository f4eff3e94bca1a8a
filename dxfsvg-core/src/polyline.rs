//! 多段线：凸度（bulge）到圆弧命令的转换。

use serde::{Deserialize, Serialize};

use crate::arc::{ArcFlags, clamp_radius};
use crate::context::{ConversionContext, SpaceConverter};
use crate::element::{HasStyle, Renderable, write_element};
use crate::format::{self, TagBuilder};
use crate::geometry::{Point, PointFormat};
use crate::locality::DoubleEnded;
use crate::style::EntityStyle;

/// 每输出多少段插入一次换行。
const SEGMENTS_PER_LINE: usize = 4;

/// 多段线顶点。`bulge` 描述到达该顶点的那一段；0 表示直线段。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexPoint {
    pub point: Point,
    pub bulge: f64,
}

impl VertexPoint {
    pub fn new(point: Point) -> Self {
        Self { point, bulge: 0.0 }
    }

    #[inline]
    pub fn has_bulge(&self) -> bool {
        self.bulge != 0.0
    }
}

/// 由凸度推导出的圆弧参数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulgeArc {
    /// 圆弧包含角（弧度），`4·atan(bulge)`。
    pub included_angle: f64,
    pub radius: f64,
    /// 度。
    pub x_rotation: f64,
    pub flags: ArcFlags,
}

impl BulgeArc {
    pub fn between(from: &Point, to: &Point, bulge: f64) -> Self {
        let delta = to.pos() - from.pos();
        let included_angle = 4.0 * bulge.atan();
        let chord = delta.length();
        let half_sin = (included_angle / 2.0).sin();
        let radius = if half_sin == 0.0 {
            0.0
        } else {
            ((chord / 2.0) / half_sin).abs()
        };
        Self {
            included_angle,
            radius,
            x_rotation: delta.y.abs().atan2(delta.x.abs()).to_degrees(),
            flags: ArcFlags {
                large_arc: bulge.abs() >= 1.0,
                sweep: bulge < 0.0,
            },
        }
    }
}

/// 根据数据推导出的输出形态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolylineKind {
    Polyline,
    Polygon,
    Path,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polyline {
    vertices: Vec<VertexPoint>,
    closed: bool,
    /// 最近一次读到、尚未挂到顶点上的凸度。
    pending_bulge: f64,
    pub style: EntityStyle,
}

impl Polyline {
    pub fn new(closed: bool) -> Self {
        Self {
            closed,
            ..Self::default()
        }
    }

    /// 由 DXF 顺序的 (顶点, 离开该顶点的凸度) 序列构造。
    pub fn from_dxf_vertices<I>(vertices: I, closed: bool) -> Self
    where
        I: IntoIterator<Item = (Point, f64)>,
    {
        let mut polyline = Self::new(closed);
        for (point, bulge) in vertices {
            polyline.push_vertex(point);
            polyline.set_bulge(bulge);
        }
        polyline
    }

    /// 追加顶点，并把待处理的凸度挂到这一段上。
    pub fn push_vertex(&mut self, point: Point) {
        let bulge = std::mem::take(&mut self.pending_bulge);
        self.vertices.push(VertexPoint { point, bulge });
    }

    /// 设置从最后一个顶点出发那一段的凸度。
    pub fn set_bulge(&mut self, bulge: f64) {
        self.pending_bulge = bulge;
    }

    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn vertices(&self) -> &[VertexPoint] {
        &self.vertices
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// 参与路径生成的顶点；闭合时复制首顶点并带上待处理凸度。
    pub fn path_vertices(&self) -> Vec<VertexPoint> {
        let mut vertices = self.vertices.clone();
        if self.closed {
            if let Some(first) = self.vertices.first() {
                vertices.push(VertexPoint {
                    point: first.point,
                    bulge: self.pending_bulge,
                });
            }
        }
        vertices
    }

    pub fn kind(&self) -> PolylineKind {
        if self.path_vertices().iter().any(VertexPoint::has_bulge) {
            PolylineKind::Path
        } else if self.closed {
            PolylineKind::Polygon
        } else {
            PolylineKind::Polyline
        }
    }

    fn segment_command(from: &Point, to: &VertexPoint, precision: usize) -> String {
        let end = to.point.format(PointFormat::Default, precision);
        if !to.has_bulge() {
            return format!("L {end}");
        }
        let arc = BulgeArc::between(from, &to.point, to.bulge);
        let radius = format::fmt_raw(clamp_radius(arc.radius, precision));
        format!(
            "A {radius},{radius} {} {} {end}",
            format::fmt_trimmed(arc.x_rotation, precision),
            arc.flags.as_str()
        )
    }

    /// 路径数据。`continued` 为真时省略起始 `M`。
    pub fn path_data<S: SpaceConverter + ?Sized>(&self, space: &S, continued: bool) -> String {
        let precision = space.precision();
        let vertices = self.path_vertices();
        let Some(first) = vertices.first() else {
            return String::new();
        };
        let mut data = String::new();
        if !continued {
            data.push_str("M ");
            data.push_str(&first.point.format(PointFormat::Default, precision));
        }
        for (index, pair) in vertices.windows(2).enumerate() {
            if index > 0 && index % SEGMENTS_PER_LINE == 0 {
                data.push('\n');
            } else if !data.is_empty() {
                data.push(' ');
            }
            data.push_str(&Self::segment_command(&pair[0].point, &pair[1], precision));
        }
        data
    }

    /// `points` 属性值。
    pub fn points_attribute(&self, precision: usize) -> String {
        let mut points = String::new();
        for vertex in &self.vertices {
            vertex.point.append_to(&mut points, precision);
        }
        points.trim_end().to_string()
    }
}

impl DoubleEnded for Polyline {
    fn start_point(&self) -> Option<Point> {
        self.vertices.first().map(|v| v.point)
    }

    fn end_point(&self) -> Option<Point> {
        self.path_vertices().last().map(|v| v.point)
    }

    fn segment_points(&self) -> Vec<Point> {
        self.path_vertices().iter().map(|v| v.point).collect()
    }
}

impl HasStyle for Polyline {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Polyline {
    fn tag(&self) -> &'static str {
        match self.kind() {
            PolylineKind::Polyline => "polyline",
            PolylineKind::Polygon => "polygon",
            PolylineKind::Path => "path",
        }
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let tag = match self.kind() {
            PolylineKind::Path => TagBuilder::new("path").attr("d", self.path_data(ctx, false)),
            _ => TagBuilder::new(self.tag()).attr("points", self.points_attribute(ctx.precision())),
        };
        write_element(tag, &self.style, ctx, out);
    }
}
