//! SVG 元素：能力 trait、基础图元（直线、圆、块引用）以及统一的元素枚举。

use serde::{Deserialize, Serialize};

use crate::arc::{Arc, clamp_radius};
use crate::collection::Group;
use crate::context::{ConversionContext, SpaceConverter};
use crate::ellipse::Ellipse;
use crate::format::{self, TagBuilder};
use crate::geometry::{Point, PointFormat};
use crate::hatch::Hatch;
use crate::locality::DoubleEnded;
use crate::polyline::Polyline;
use crate::style::{self, EntityStyle};
use crate::text::Text;

/// 可序列化为 SVG 片段。
pub trait Renderable {
    fn tag(&self) -> &'static str;

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String);

    fn to_svg(&self, ctx: &ConversionContext) -> String {
        let mut out = String::new();
        self.write_svg(ctx, &mut out);
        out
    }
}

/// 携带实体样式。
pub trait HasStyle {
    fn style(&self) -> &EntityStyle;

    fn style_mut(&mut self) -> &mut EntityStyle;
}

/// 追加样式属性并以自闭合标签输出。
pub fn write_element(tag: TagBuilder, style: &EntityStyle, ctx: &ConversionContext, out: &mut String) {
    write_element_with(tag, style, ctx, &[], out);
}

/// 同 [`write_element`]，额外的声明追加在最后，优先级最高。
pub fn write_element_with(
    tag: TagBuilder,
    style: &EntityStyle,
    ctx: &ConversionContext,
    extra: &[&str],
    out: &mut String,
) {
    let mut declarations: Vec<String> = style::graphic_style(style, ctx).into_iter().collect();
    declarations.extend(extra.iter().map(|decl| decl.to_string()));
    let style_attr = (!declarations.is_empty()).then(|| declarations.join(";"));
    out.push_str(&tag.attr_opt("style", style_attr).self_closing());
}

/// 直线。
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    start: Point,
    end: Point,
    pub style: EntityStyle,
}

impl Line {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            style: EntityStyle::default(),
        }
    }

    pub fn from_dxf<S: SpaceConverter + ?Sized>(space: &S, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Point::from_dxf(space, x1, y1), Point::from_dxf(space, x2, y2))
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn path_data<S: SpaceConverter + ?Sized>(&self, space: &S, continued: bool) -> String {
        let precision = space.precision();
        let end = self.end.format(PointFormat::Default, precision);
        if continued {
            format!("L {end}")
        } else {
            format!("M {} L {end}", self.start.format(PointFormat::Default, precision))
        }
    }
}

impl DoubleEnded for Line {
    fn start_point(&self) -> Option<Point> {
        Some(self.start)
    }

    fn end_point(&self) -> Option<Point> {
        Some(self.end)
    }
}

impl HasStyle for Line {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Line {
    fn tag(&self) -> &'static str {
        "line"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let precision = ctx.precision();
        let tag = TagBuilder::new("line")
            .raw(&self.start.format(PointFormat::Start, precision))
            .raw(&self.end.format(PointFormat::End, precision));
        write_element(tag, &self.style, ctx, out);
    }
}

/// 圆。
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    center: Point,
    radius: f64,
    pub style: EntityStyle,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self {
            center,
            radius: radius.abs(),
            style: EntityStyle::default(),
        }
    }

    pub fn from_dxf<S: SpaceConverter + ?Sized>(space: &S, cx: f64, cy: f64, radius: f64) -> Self {
        Self::new(Point::from_dxf(space, cx, cy), space.scale_length(radius))
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl HasStyle for Circle {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Circle {
    fn tag(&self) -> &'static str {
        "circle"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let precision = ctx.precision();
        let tag = TagBuilder::new("circle")
            .raw(&self.center.format(PointFormat::CircleCentre, precision))
            .attr("r", format::fmt_raw(clamp_radius(self.radius, precision)));
        write_element(tag, &self.style, ctx, out);
    }
}

/// 块引用（INSERT），输出为 `<use>`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub target: String,
    pub anchor: Point,
    /// 度，DXF 逆时针约定。
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub style: EntityStyle,
}

impl Reference {
    pub fn new(target: impl Into<String>, anchor: Point) -> Self {
        Self {
            target: target.into(),
            anchor,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            style: EntityStyle::default(),
        }
    }

    /// `translate rotate scale`，旋转取负以适配 SVG 的顺时针方向。
    pub fn transform(&self, precision: usize) -> String {
        let mut transform = self.anchor.format(PointFormat::Transform, precision);
        let rotation = format::trim(-self.rotation, precision);
        if rotation != 0.0 {
            transform.push_str(&format!(" rotate({})", format::fmt_raw(rotation)));
        }
        let sx = format::trim(self.scale_x, precision);
        let sy = format::trim(self.scale_y, precision);
        if sx != 1.0 || sy != 1.0 {
            transform.push_str(&format!(
                " scale({} {})",
                format::fmt_raw(sx),
                format::fmt_raw(sy)
            ));
        }
        transform
    }
}

impl HasStyle for Reference {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Reference {
    fn tag(&self) -> &'static str {
        "use"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let tag = TagBuilder::new("use")
            .attr("xlink:href", format!("#{}", self.target))
            .attr("transform", self.transform(ctx.precision()));
        write_element(tag, &self.style, ctx, out);
    }
}

/// 所有可放入集合的元素。
#[derive(Debug, Clone)]
pub enum SvgElement {
    Line(Line),
    Circle(Circle),
    Arc(Arc),
    Ellipse(Ellipse),
    Polyline(Polyline),
    Hatch(Hatch),
    Text(Text),
    Reference(Reference),
    Group(Group),
}

impl SvgElement {
    /// 直线、圆弧与多段线具有首尾端点。
    pub fn as_double_ended(&self) -> Option<&dyn DoubleEnded> {
        match self {
            SvgElement::Line(line) => Some(line as &dyn DoubleEnded),
            SvgElement::Arc(arc) => Some(arc as &dyn DoubleEnded),
            SvgElement::Polyline(polyline) => Some(polyline as &dyn DoubleEnded),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SvgElement::Text(_))
    }

    pub fn style(&self) -> Option<&EntityStyle> {
        match self {
            SvgElement::Line(e) => Some(e.style()),
            SvgElement::Circle(e) => Some(e.style()),
            SvgElement::Arc(e) => Some(e.style()),
            SvgElement::Ellipse(e) => Some(e.style()),
            SvgElement::Polyline(e) => Some(e.style()),
            SvgElement::Hatch(e) => Some(e.style()),
            SvgElement::Text(e) => Some(e.style()),
            SvgElement::Reference(e) => Some(e.style()),
            SvgElement::Group(_) => None,
        }
    }

    pub fn style_mut(&mut self) -> Option<&mut EntityStyle> {
        match self {
            SvgElement::Line(e) => Some(e.style_mut()),
            SvgElement::Circle(e) => Some(e.style_mut()),
            SvgElement::Arc(e) => Some(e.style_mut()),
            SvgElement::Ellipse(e) => Some(e.style_mut()),
            SvgElement::Polyline(e) => Some(e.style_mut()),
            SvgElement::Hatch(e) => Some(e.style_mut()),
            SvgElement::Text(e) => Some(e.style_mut()),
            SvgElement::Reference(e) => Some(e.style_mut()),
            SvgElement::Group(_) => None,
        }
    }

    pub fn layer(&self) -> Option<&str> {
        self.style().map(|style| style.layer.as_str())
    }

    fn as_renderable(&self) -> &dyn Renderable {
        match self {
            SvgElement::Line(e) => e as &dyn Renderable,
            SvgElement::Circle(e) => e as &dyn Renderable,
            SvgElement::Arc(e) => e as &dyn Renderable,
            SvgElement::Ellipse(e) => e as &dyn Renderable,
            SvgElement::Polyline(e) => e as &dyn Renderable,
            SvgElement::Hatch(e) => e as &dyn Renderable,
            SvgElement::Text(e) => e as &dyn Renderable,
            SvgElement::Reference(e) => e as &dyn Renderable,
            SvgElement::Group(e) => e as &dyn Renderable,
        }
    }
}

impl Renderable for SvgElement {
    fn tag(&self) -> &'static str {
        self.as_renderable().tag()
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        self.as_renderable().write_svg(ctx, out);
    }
}

macro_rules! impl_from_element {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for SvgElement {
                fn from(value: $variant) -> Self {
                    SvgElement::$variant(value)
                }
            }
        )*
    };
}

impl_from_element!(Line, Circle, Arc, Ellipse, Polyline, Hatch, Text, Reference, Group);
