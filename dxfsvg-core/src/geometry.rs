//! 点模型：SVG 空间坐标 + 邻近容差，以及各类输出格式。

use std::fmt::Write as _;
use std::ptr;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::context::SpaceConverter;
use crate::errors::GeometryError;
use crate::format;

/// 两点之间的方位关系。`Local` 是两个对齐位的按位或。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    NotLocal,
    VerticallyAligned,
    HorizontallyAligned,
    Local,
    /// 同一个对象。
    Same,
}

impl Relationship {
    pub const VERTICAL_BIT: u8 = 0b01;
    pub const HORIZONTAL_BIT: u8 = 0b10;

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Relationship::NotLocal,
            Self::VERTICAL_BIT => Relationship::VerticallyAligned,
            Self::HORIZONTAL_BIT => Relationship::HorizontallyAligned,
            _ => Relationship::Local,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Relationship::NotLocal => 0,
            Relationship::VerticallyAligned => Self::VERTICAL_BIT,
            Relationship::HorizontallyAligned => Self::HORIZONTAL_BIT,
            Relationship::Local | Relationship::Same => Self::VERTICAL_BIT | Self::HORIZONTAL_BIT,
        }
    }
}

/// 点的字符串化方式。所有模式都先裁剪再格式化。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFormat {
    /// `x,y`
    Default,
    /// `x1="…" y1="…"`
    Start,
    /// `x2="…" y2="…"`
    End,
    /// `cx="…" cy="…"`
    CircleCentre,
    /// `x y`
    Raw,
    /// `x,y `，用于 `points` 属性的逐点追加。
    PolylineList,
    /// `translate(x y)`
    Transform,
    /// `x="…" y="…"`
    Anchor,
}

/// SVG 空间中的点。
///
/// 通过 DXF 构造函数创建时坐标已经完成翻转、缩放与图纸偏移；
/// `*_uu` 系列方法直接写入 SVG 空间数值，不做任何转换。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pos: DVec2,
    fuzz: f64,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            pos: DVec2::ZERO,
            fuzz: 0.0,
        }
    }
}

impl Point {
    /// 由 DXF 空间坐标构造，容差取自转换上下文。
    pub fn from_dxf<S: SpaceConverter + ?Sized>(space: &S, x: f64, y: f64) -> Self {
        Self {
            pos: DVec2::new(space.to_svg_x(x), space.to_svg_y(y)),
            fuzz: space.fuzz(),
        }
    }

    /// 由 DXF 空间坐标构造，并覆盖容差（DXF 单位，按单位比例换算）。
    pub fn from_dxf_with_fuzz<S: SpaceConverter + ?Sized>(
        space: &S,
        x: f64,
        y: f64,
        fuzz: f64,
    ) -> Self {
        Self {
            pos: DVec2::new(space.to_svg_x(x), space.to_svg_y(y)),
            fuzz: space.scale_length(fuzz.abs()),
        }
    }

    /// 由已经处于 SVG 空间的数值构造。
    pub fn from_svg(x: f64, y: f64, fuzz: f64) -> Self {
        Self {
            pos: DVec2::new(x, y),
            fuzz: fuzz.abs(),
        }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.pos.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.pos.y
    }

    #[inline]
    pub fn pos(&self) -> DVec2 {
        self.pos
    }

    #[inline]
    pub fn fuzz(&self) -> f64 {
        self.fuzz
    }

    pub fn set_x_uu(&mut self, x: f64) {
        self.pos.x = x;
    }

    pub fn set_y_uu(&mut self, y: f64) {
        self.pos.y = y;
    }

    /// 通过 DXF 空间数值设置坐标。
    pub fn set_x<S: SpaceConverter + ?Sized>(&mut self, space: &S, x: f64) {
        self.pos.x = space.to_svg_x(x);
    }

    pub fn set_y<S: SpaceConverter + ?Sized>(&mut self, space: &S, y: f64) {
        self.pos.y = space.to_svg_y(y);
    }

    pub fn set_fuzz(&mut self, fuzz: f64) {
        self.fuzz = fuzz.abs();
    }

    /// 逆转换回 DXF 空间。
    pub fn to_dxf<S: SpaceConverter + ?Sized>(&self, space: &S) -> DVec2 {
        DVec2::new(space.to_dxf_x(self.pos.x), space.to_dxf_y(self.pos.y))
    }

    pub fn offset(&self, delta: DVec2) -> Self {
        Self {
            pos: self.pos + delta,
            fuzz: self.fuzz,
        }
    }

    /// 将坐标与容差复制到目标点，不重新做空间转换。
    pub fn copy_into(&self, target: Option<&mut Point>) -> Result<(), GeometryError> {
        let target = target.ok_or(GeometryError::NullPoint {
            operation: "copy_into",
        })?;
        target.pos = self.pos;
        target.fuzz = self.fuzz;
        Ok(())
    }

    /// 比较两点在两个轴上的对齐关系。容差取双方较大者，保证结果对称。
    pub fn test_relationship(&self, other: &Point) -> Relationship {
        if ptr::eq(self, other) {
            return Relationship::Same;
        }
        let fuzz = self.fuzz.max(other.fuzz);
        let delta = (self.pos - other.pos).abs();
        let mut bits = 0;
        if delta.x <= fuzz {
            bits |= Relationship::VERTICAL_BIT;
        }
        if delta.y <= fuzz {
            bits |= Relationship::HORIZONTAL_BIT;
        }
        Relationship::from_bits(bits)
    }

    pub fn relationship_to(&self, other: Option<&Point>) -> Result<Relationship, GeometryError> {
        other
            .map(|other| self.test_relationship(other))
            .ok_or(GeometryError::NullPoint {
                operation: "test_relationship",
            })
    }

    /// 两个轴都在容差内。
    pub fn is_same_place(&self, other: &Point) -> bool {
        self.test_relationship(other) == Relationship::Local
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        self.pos.distance(other.pos)
    }

    pub fn format(&self, mode: PointFormat, precision: usize) -> String {
        let x = format::fmt_trimmed(self.pos.x, precision);
        let y = format::fmt_trimmed(self.pos.y, precision);
        match mode {
            PointFormat::Default => format!("{x},{y}"),
            PointFormat::Start => format!("x1=\"{x}\" y1=\"{y}\""),
            PointFormat::End => format!("x2=\"{x}\" y2=\"{y}\""),
            PointFormat::CircleCentre => format!("cx=\"{x}\" cy=\"{y}\""),
            PointFormat::Raw => format!("{x} {y}"),
            PointFormat::PolylineList => format!("{x},{y} "),
            PointFormat::Transform => format!("translate({x} {y})"),
            PointFormat::Anchor => format!("x=\"{x}\" y=\"{y}\""),
        }
    }

    /// 以 `PolylineList` 格式追加到缓冲区。
    pub fn append_to(&self, buffer: &mut String, precision: usize) {
        let _ = write!(
            buffer,
            "{},{} ",
            format::fmt_trimmed(self.pos.x, precision),
            format::fmt_trimmed(self.pos.y, precision)
        );
    }
}
