//! 填充（HATCH）状态机。
//!
//! DXF 用同一批组码描述不同类型的边界边与图案线，含义取决于当前所处的状态。
//! [`HatchBoundary::feed`] 按状态把每个 [`HatchValue`] 路由到正在构建的子图形上，
//! 最终得到若干闭合边界环以及（可选的）平铺图案定义。

use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::arc::{Arc, SweepDirection, validate_radius};
use crate::colour;
use crate::context::{ConversionContext, SpaceConverter};
use crate::element::{HasStyle, Line, Renderable, write_element_with};
use crate::ellipse::{Ellipse, validate_axes};
use crate::errors::HatchError;
use crate::format::TagBuilder;
use crate::geometry::Point;
use crate::locality::DoubleEnded;
use crate::pattern::{HatchLine, HatchPattern};
use crate::polyline::Polyline;
use crate::style::EntityStyle;

/// 状态机状态。数值与 [`HatchState::code`] 对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HatchState {
    Elevation,
    Pline,
    Line,
    CArc,
    EArc,
    Spline,
    Pattern,
    Seed,
}

impl HatchState {
    pub fn code(self) -> i32 {
        match self {
            HatchState::Elevation => 0,
            HatchState::Pline => 1,
            HatchState::Line => 2,
            HatchState::CArc => 3,
            HatchState::EArc => 4,
            HatchState::Spline => 5,
            HatchState::Pattern => 6,
            HatchState::Seed => 7,
        }
    }

    pub fn from_code(value: i32, last_state: HatchState) -> Result<Self, HatchError> {
        match value {
            0 => Ok(HatchState::Elevation),
            1 => Ok(HatchState::Pline),
            2 => Ok(HatchState::Line),
            3 => Ok(HatchState::CArc),
            4 => Ok(HatchState::EArc),
            5 => Ok(HatchState::Spline),
            6 => Ok(HatchState::Pattern),
            7 => Ok(HatchState::Seed),
            other => Err(HatchError::UndefinedState {
                value: other,
                last_state,
            }),
        }
    }
}

/// 边界边类型选择值（组码 72）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Polyline,
    Line,
    CircularArc,
    EllipticalArc,
    Spline,
}

impl TryFrom<i32> for EdgeType {
    type Error = HatchError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EdgeType::Polyline),
            1 => Ok(EdgeType::Line),
            2 => Ok(EdgeType::CircularArc),
            3 => Ok(EdgeType::EllipticalArc),
            4 => Ok(EdgeType::Spline),
            other => Err(HatchError::UndefinedEdge(other)),
        }
    }
}

impl EdgeType {
    fn state(self) -> HatchState {
        match self {
            EdgeType::Polyline => HatchState::Pline,
            EdgeType::Line => HatchState::Line,
            EdgeType::CircularArc => HatchState::CArc,
            EdgeType::EllipticalArc => HatchState::EArc,
            EdgeType::Spline => HatchState::Spline,
        }
    }
}

/// 状态机的输入值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HatchValue {
    PointX(f64),
    PointY(f64),
    EndPointX(f64),
    EndPointY(f64),
    Bulge(f64),
    NewBoundaryCount(i32),
    /// 携带边界类型标志；0x02 表示多段线边界。
    NewBoundaryStart(i32),
    EdgeTypeSelector(i32),
    HatchStyleSelector(i32),
    Radius(f64),
    StartAngle(f64),
    EndAngle(f64),
    CcwFlag(SweepDirection),
    SeedCount(i32),
    PatternAngle(f64),
    PatternBaseX(f64),
    PatternBaseY(f64),
    PatternOffsetX(f64),
    PatternOffsetY(f64),
    DashCount(i32),
    DashLength(f64),
    PatternScale(f64),
    PatternLineCount(i32),
    PolylineClosed(bool),
}

/// 边界多段线标志位。
pub const POLYLINE_BOUNDARY_FLAG: i32 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillRule {
    EvenOdd,
    NonZero,
}

impl FillRule {
    pub fn from_style(style: i32) -> Self {
        match style {
            0 => FillRule::EvenOdd,
            _ => FillRule::NonZero,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FillRule::EvenOdd => "evenodd",
            FillRule::NonZero => "nonzero",
        }
    }
}

/// 样条边占位：接受数据但暂不生成几何。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SplineStub;

/// 已闭合的边界边。
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryEdge {
    Polyline(Polyline),
    Line(Line),
    CircularArc(Arc),
    EllipticalArc(Ellipse),
    Spline(SplineStub),
}

impl BoundaryEdge {
    pub fn kind(&self) -> EdgeType {
        match self {
            BoundaryEdge::Polyline(_) => EdgeType::Polyline,
            BoundaryEdge::Line(_) => EdgeType::Line,
            BoundaryEdge::CircularArc(_) => EdgeType::CircularArc,
            BoundaryEdge::EllipticalArc(_) => EdgeType::EllipticalArc,
            BoundaryEdge::Spline(_) => EdgeType::Spline,
        }
    }

    fn path_command<S: SpaceConverter + ?Sized>(&self, space: &S, continued: bool) -> String {
        match self {
            BoundaryEdge::Polyline(polyline) => polyline.path_data(space, continued),
            BoundaryEdge::Line(line) => line.path_data(space, continued),
            BoundaryEdge::CircularArc(arc) => arc.path_data(space, continued),
            BoundaryEdge::EllipticalArc(ellipse) => ellipse.arc_command(space, continued),
            BoundaryEdge::Spline(_) => String::new(),
        }
    }
}

impl DoubleEnded for BoundaryEdge {
    fn start_point(&self) -> Option<Point> {
        match self {
            BoundaryEdge::Polyline(polyline) => polyline.start_point(),
            BoundaryEdge::Line(line) => line.start_point(),
            BoundaryEdge::CircularArc(arc) => arc.start_point(),
            BoundaryEdge::EllipticalArc(ellipse) => ellipse.start_point(),
            BoundaryEdge::Spline(_) => None,
        }
    }

    fn end_point(&self) -> Option<Point> {
        match self {
            BoundaryEdge::Polyline(polyline) => polyline.end_point(),
            BoundaryEdge::Line(line) => line.end_point(),
            BoundaryEdge::CircularArc(arc) => arc.end_point(),
            BoundaryEdge::EllipticalArc(ellipse) => ellipse.end_point().or_else(|| ellipse.start_point()),
            BoundaryEdge::Spline(_) => None,
        }
    }
}

fn require(value: Option<f64>, kind: &'static str, missing: &'static str) -> Result<f64, HatchError> {
    value.ok_or(HatchError::IncompleteEdge { kind, missing })
}

#[derive(Debug, Clone, Default)]
struct PolylineEdge {
    polyline: Polyline,
    pending_x: Option<f64>,
}

impl PolylineEdge {
    fn starting_at(point: Point, bulge: f64) -> Self {
        let mut polyline = Polyline::new(false);
        polyline.push_vertex(point);
        polyline.set_bulge(bulge);
        Self {
            polyline,
            pending_x: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LineEdge {
    start_x: Option<f64>,
    start_y: Option<f64>,
    end_x: Option<f64>,
    end_y: Option<f64>,
}

impl LineEdge {
    fn anchor<S: SpaceConverter + ?Sized>(&self, space: &S) -> Result<Point, HatchError> {
        let x = require(self.start_x, "line", "start x")?;
        let y = require(self.start_y, "line", "start y")?;
        Ok(Point::from_dxf(space, x, y))
    }

    fn build<S: SpaceConverter + ?Sized>(&self, space: &S) -> Result<Line, HatchError> {
        let start = self.anchor(space)?;
        let x = require(self.end_x, "line", "end x")?;
        let y = require(self.end_y, "line", "end y")?;
        Ok(Line::new(start, Point::from_dxf(space, x, y)))
    }
}

#[derive(Debug, Clone)]
struct ArcEdge {
    center_x: Option<f64>,
    center_y: Option<f64>,
    radius: Option<f64>,
    start_angle: Option<f64>,
    end_angle: Option<f64>,
    direction: SweepDirection,
}

impl Default for ArcEdge {
    fn default() -> Self {
        Self {
            center_x: None,
            center_y: None,
            radius: None,
            start_angle: None,
            end_angle: None,
            direction: SweepDirection::CounterClockwise,
        }
    }
}

impl ArcEdge {
    fn build<S: SpaceConverter + ?Sized>(&self, space: &S) -> Result<Arc, HatchError> {
        let radius = validate_radius(require(self.radius, "circular arc", "radius")?)?;
        let mut arc = Arc::from_dxf(
            space,
            require(self.center_x, "circular arc", "center x")?,
            require(self.center_y, "circular arc", "center y")?,
            radius,
            require(self.start_angle, "circular arc", "start angle")?,
            require(self.end_angle, "circular arc", "end angle")?,
        );
        arc.set_direction(self.direction);
        Ok(arc)
    }
}

#[derive(Debug, Clone)]
struct EllipseEdge {
    center_x: Option<f64>,
    center_y: Option<f64>,
    major_x: Option<f64>,
    major_y: Option<f64>,
    ratio: Option<f64>,
    start_angle: Option<f64>,
    end_angle: Option<f64>,
    direction: SweepDirection,
}

impl Default for EllipseEdge {
    fn default() -> Self {
        Self {
            center_x: None,
            center_y: None,
            major_x: None,
            major_y: None,
            ratio: None,
            start_angle: None,
            end_angle: None,
            direction: SweepDirection::CounterClockwise,
        }
    }
}

impl EllipseEdge {
    fn build<S: SpaceConverter + ?Sized>(&self, space: &S) -> Result<Ellipse, HatchError> {
        let major_x = require(self.major_x, "elliptical arc", "major axis x")?;
        let major_y = require(self.major_y, "elliptical arc", "major axis y")?;
        let ratio = require(self.ratio, "elliptical arc", "minor axis ratio")?;
        validate_axes(DVec2::new(major_x, major_y), ratio)?;
        let mut ellipse = Ellipse::from_dxf(
            space,
            require(self.center_x, "elliptical arc", "center x")?,
            require(self.center_y, "elliptical arc", "center y")?,
            major_x,
            major_y,
            ratio,
        );
        // 填充边界中的椭圆角度以度为单位
        ellipse.set_start_angle(require(self.start_angle, "elliptical arc", "start angle")?.to_radians());
        ellipse.set_end_angle(require(self.end_angle, "elliptical arc", "end angle")?.to_radians());
        ellipse.set_counter_clockwise(self.direction == SweepDirection::CounterClockwise);
        Ok(ellipse)
    }
}

/// 正在构建中的子图形。
#[derive(Debug, Clone)]
enum OpenEdge {
    Polyline(PolylineEdge),
    Line(LineEdge),
    CircularArc(ArcEdge),
    EllipticalArc(EllipseEdge),
    Spline,
}

impl OpenEdge {
    fn for_type(edge: EdgeType) -> Self {
        match edge {
            EdgeType::Polyline => OpenEdge::Polyline(PolylineEdge::default()),
            EdgeType::Line => OpenEdge::Line(LineEdge::default()),
            EdgeType::CircularArc => OpenEdge::CircularArc(ArcEdge::default()),
            EdgeType::EllipticalArc => OpenEdge::EllipticalArc(EllipseEdge::default()),
            EdgeType::Spline => OpenEdge::Spline,
        }
    }

    fn close<S: SpaceConverter + ?Sized>(self, space: &S) -> Result<Option<BoundaryEdge>, HatchError> {
        let edge = match self {
            OpenEdge::Polyline(edge) => {
                if edge.polyline.is_empty() {
                    debug!("空的多段线边界，忽略");
                    return Ok(None);
                }
                BoundaryEdge::Polyline(edge.polyline)
            }
            OpenEdge::Line(edge) => BoundaryEdge::Line(edge.build(space)?),
            OpenEdge::CircularArc(edge) => BoundaryEdge::CircularArc(edge.build(space)?),
            OpenEdge::EllipticalArc(edge) => BoundaryEdge::EllipticalArc(edge.build(space)?),
            OpenEdge::Spline => BoundaryEdge::Spline(SplineStub),
        };
        Ok(Some(edge))
    }
}

#[derive(Debug, Clone, Default)]
struct PatternLineBuilder {
    angle: f64,
    base_x: Option<f64>,
    base_y: Option<f64>,
    offset_x: Option<f64>,
    offset_y: Option<f64>,
    dash_count: Option<usize>,
    dashes: Vec<f64>,
}

impl PatternLineBuilder {
    fn build(self) -> Result<HatchLine, HatchError> {
        let angle = self.angle;
        let missing = |what: &str| HatchError::IncompletePatternLine(format!("{what} (angle {angle})"));
        let offset_x = self.offset_x.ok_or_else(|| missing("offset x"))?;
        let offset_y = self.offset_y.ok_or_else(|| missing("offset y"))?;
        if let Some(expected) = self.dash_count {
            if expected != self.dashes.len() {
                warn!(
                    expected,
                    actual = self.dashes.len(),
                    "图案线声明的虚线段数与实际不符"
                );
            }
        }
        let mut line = HatchLine::new(angle)
            .with_base(self.base_x.unwrap_or(0.0), self.base_y.unwrap_or(0.0))
            .with_offset(offset_x, offset_y)
            .with_dashes(self.dashes);
        line.dash_count = self.dash_count;
        Ok(line)
    }
}

/// 边界环集合与状态机。
#[derive(Debug, Clone)]
pub struct HatchBoundary {
    state: HatchState,
    loops: Vec<Vec<BoundaryEdge>>,
    boundary_index: Option<usize>,
    declared_loops: Option<usize>,
    open_edge: Option<OpenEdge>,
    fill_rule: FillRule,
    pattern_name: String,
    pattern: Option<HatchPattern>,
    open_pattern_line: Option<PatternLineBuilder>,
    declared_pattern_lines: Option<usize>,
    completed_pattern_lines: usize,
    pattern_id: Option<String>,
    pattern_colour: String,
}

impl HatchBoundary {
    pub fn new(pattern_name: impl Into<String>) -> Self {
        Self {
            state: HatchState::Elevation,
            loops: Vec::new(),
            boundary_index: None,
            declared_loops: None,
            open_edge: None,
            fill_rule: FillRule::EvenOdd,
            pattern_name: pattern_name.into(),
            pattern: None,
            open_pattern_line: None,
            declared_pattern_lines: None,
            completed_pattern_lines: 0,
            pattern_id: None,
            pattern_colour: "#000000".to_string(),
        }
    }

    pub fn state(&self) -> HatchState {
        self.state
    }

    pub fn loops(&self) -> &[Vec<BoundaryEdge>] {
        &self.loops
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    pub fn pattern_id(&self) -> Option<&str> {
        self.pattern_id.as_deref()
    }

    pub fn set_pattern_name(&mut self, name: impl Into<String>) {
        self.pattern_name = name.into();
    }

    pub fn set_pattern_colour(&mut self, colour: impl Into<String>) {
        self.pattern_colour = colour.into();
    }

    /// 按数值切换状态；未知值报告最后一个有效状态。
    pub fn enter_state(&mut self, raw: i32) -> Result<(), HatchError> {
        let next = HatchState::from_code(raw, self.state)?;
        trace!(from = ?self.state, to = ?next, "填充状态切换");
        self.state = next;
        Ok(())
    }

    /// 把当前打开的子图形闭合并追加到当前边界环。
    fn close_open_edge(&mut self, space: &dyn SpaceConverter) -> Result<(), HatchError> {
        let Some(open) = self.open_edge.take() else {
            return Ok(());
        };
        let Some(edge) = open.close(space)? else {
            return Ok(());
        };
        let index = self.boundary_index.ok_or(HatchError::NoActiveBoundary { state: self.state })?;
        match self.loops.get_mut(index) {
            Some(boundary) => {
                boundary.push(edge);
                Ok(())
            }
            None => Err(HatchError::NoActiveBoundary { state: self.state }),
        }
    }

    fn open(&mut self, edge: EdgeType) -> Result<(), HatchError> {
        if self.boundary_index.is_none() {
            return Err(HatchError::NoActiveBoundary { state: self.state });
        }
        self.open_edge = Some(OpenEdge::for_type(edge));
        self.enter_state(edge.state().code())
    }

    fn start_boundary(&mut self, flags: i32, space: &dyn SpaceConverter) -> Result<(), HatchError> {
        self.close_open_edge(space)?;
        self.loops.push(Vec::new());
        self.boundary_index = Some(self.loops.len() - 1);
        trace!(index = self.loops.len() - 1, flags, "新边界环");
        if flags & POLYLINE_BOUNDARY_FLAG != 0 {
            self.open(EdgeType::Polyline)?;
        }
        Ok(())
    }

    /// 闭合当前图案线。达到组码 78 声明的线数时即为最后一条；`force_last` 用于输入结束。
    fn finish_pattern_line(&mut self, force_last: bool) -> Result<(), HatchError> {
        let Some(builder) = self.open_pattern_line.take() else {
            return Ok(());
        };
        let line = builder.build()?;
        self.completed_pattern_lines += 1;
        if let Some(declared) = self.declared_pattern_lines {
            if self.completed_pattern_lines > declared {
                return Err(HatchError::ExtraPatternLine { declared });
            }
        }
        let last = force_last || self.declared_pattern_lines == Some(self.completed_pattern_lines);
        let name = self.pattern_name.clone();
        self.pattern
            .get_or_insert_with(|| HatchPattern::new(name, 1.0))
            .add_line(line, last);
        Ok(())
    }

    /// 当前线的虚线段已齐且它是声明的最后一条时立即闭合。
    fn close_completed_line(&mut self) -> Result<(), HatchError> {
        let complete = self
            .open_pattern_line
            .as_ref()
            .is_some_and(|line| line.dash_count == Some(line.dashes.len()));
        let is_last = self.declared_pattern_lines == Some(self.completed_pattern_lines + 1);
        if complete && is_last {
            self.finish_pattern_line(false)?;
        }
        Ok(())
    }

    /// 结束图案数据：闭合剩余的线，并核对声明的线数。
    fn complete_pattern(&mut self) -> Result<(), HatchError> {
        self.finish_pattern_line(true)?;
        if let (Some(declared), Some(pattern)) = (self.declared_pattern_lines, self.pattern.as_ref()) {
            if declared != pattern.lines().len() {
                warn!(
                    declared,
                    actual = pattern.lines().len(),
                    pattern = pattern.name(),
                    "图案线数量与声明不符"
                );
            }
        }
        Ok(())
    }

    /// 把完成的图案交给转换上下文注册。只在整个填充成功后调用。
    fn register_pattern(&mut self, ctx: &mut ConversionContext) {
        let Some(mut pattern) = self.pattern.take() else {
            return;
        };
        if pattern.lines().is_empty() {
            return;
        }
        pattern.set_colour(self.pattern_colour.clone());
        self.pattern_id = Some(ctx.register_pattern(pattern));
    }

    fn pattern_line(&mut self) -> Option<&mut PatternLineBuilder> {
        if self.open_pattern_line.is_none() {
            trace!("图案线数据先于角度出现，按 0° 处理");
            self.open_pattern_line = Some(PatternLineBuilder::default());
        }
        self.open_pattern_line.as_mut()
    }

    /// 状态机入口：按当前状态路由一个输入值。
    pub fn feed(&mut self, ctx: &ConversionContext, value: HatchValue) -> Result<(), HatchError> {
        match value {
            HatchValue::NewBoundaryCount(count) => {
                self.declared_loops = usize::try_from(count).ok();
                Ok(())
            }
            HatchValue::NewBoundaryStart(flags) => self.start_boundary(flags, &ctx.space),
            HatchValue::EdgeTypeSelector(raw) => {
                let edge = EdgeType::try_from(raw)?;
                self.close_open_edge(&ctx.space)?;
                self.open(edge)
            }
            HatchValue::HatchStyleSelector(style) => {
                self.close_open_edge(&ctx.space)?;
                self.fill_rule = FillRule::from_style(style);
                if let Some(declared) = self.declared_loops {
                    if declared != self.loops.len() {
                        warn!(declared, actual = self.loops.len(), "边界环数量与声明不符");
                    }
                }
                self.enter_state(HatchState::Pattern.code())
            }
            HatchValue::SeedCount(_) => {
                self.close_open_edge(&ctx.space)?;
                self.complete_pattern()?;
                self.enter_state(HatchState::Seed.code())
            }
            other => match self.state {
                HatchState::Pattern => self.feed_pattern(other),
                HatchState::Elevation | HatchState::Seed | HatchState::Spline => {
                    trace!(state = ?self.state, value = ?other, "忽略填充数据");
                    Ok(())
                }
                _ => self.feed_edge(&ctx.space, other),
            },
        }
    }

    fn feed_pattern(&mut self, value: HatchValue) -> Result<(), HatchError> {
        match value {
            HatchValue::PatternScale(scale) => {
                let name = self.pattern_name.clone();
                self.pattern
                    .get_or_insert_with(|| HatchPattern::new(name, scale))
                    .set_scale(scale);
            }
            HatchValue::PatternLineCount(count) => {
                self.declared_pattern_lines = usize::try_from(count).ok();
            }
            HatchValue::PatternAngle(angle) => {
                self.finish_pattern_line(false)?;
                self.open_pattern_line = Some(PatternLineBuilder {
                    angle,
                    ..PatternLineBuilder::default()
                });
            }
            HatchValue::PatternBaseX(x) => {
                if let Some(line) = self.pattern_line() {
                    line.base_x = Some(x);
                }
            }
            HatchValue::PatternBaseY(y) => {
                if let Some(line) = self.pattern_line() {
                    line.base_y = Some(y);
                }
            }
            HatchValue::PatternOffsetX(x) => {
                if let Some(line) = self.pattern_line() {
                    line.offset_x = Some(x);
                }
            }
            HatchValue::PatternOffsetY(y) => {
                if let Some(line) = self.pattern_line() {
                    line.offset_y = Some(y);
                }
            }
            HatchValue::DashCount(count) => {
                if let Some(line) = self.pattern_line() {
                    line.dash_count = usize::try_from(count).ok();
                }
                self.close_completed_line()?;
            }
            HatchValue::DashLength(length) => {
                if let Some(line) = self.pattern_line() {
                    line.dashes.push(length);
                }
                self.close_completed_line()?;
            }
            other => trace!(value = ?other, "图案状态下忽略"),
        }
        Ok(())
    }

    fn feed_edge(&mut self, space: &dyn SpaceConverter, value: HatchValue) -> Result<(), HatchError> {
        let state = self.state;
        if let (Some(OpenEdge::Line(edge)), HatchValue::Bulge(bulge)) = (&self.open_edge, value) {
            // 直线上出现凸度：以直线起点为首顶点退化为多段线
            let anchor = edge.anchor(space)?;
            self.open_edge = Some(OpenEdge::Polyline(PolylineEdge::starting_at(anchor, bulge)));
            return self.enter_state(HatchState::Pline.code());
        }
        let Some(open) = self.open_edge.as_mut() else {
            return Err(HatchError::NoActiveBoundary { state });
        };
        match (open, value) {
            (OpenEdge::Polyline(edge), HatchValue::PointX(x)) => edge.pending_x = Some(x),
            (OpenEdge::Polyline(edge), HatchValue::PointY(y)) => {
                let x = edge.pending_x.take().ok_or(HatchError::IncompleteEdge {
                    kind: "polyline",
                    missing: "vertex x",
                })?;
                edge.polyline.push_vertex(Point::from_dxf(space, x, y));
            }
            (OpenEdge::Polyline(edge), HatchValue::Bulge(bulge)) => edge.polyline.set_bulge(bulge),
            (OpenEdge::Polyline(edge), HatchValue::PolylineClosed(closed)) => {
                edge.polyline.set_closed(closed)
            }

            (OpenEdge::Line(edge), HatchValue::PointX(x)) => edge.start_x = Some(x),
            (OpenEdge::Line(edge), HatchValue::PointY(y)) => edge.start_y = Some(y),
            (OpenEdge::Line(edge), HatchValue::EndPointX(x)) => edge.end_x = Some(x),
            (OpenEdge::Line(edge), HatchValue::EndPointY(y)) => edge.end_y = Some(y),

            (OpenEdge::CircularArc(edge), HatchValue::PointX(x)) => edge.center_x = Some(x),
            (OpenEdge::CircularArc(edge), HatchValue::PointY(y)) => edge.center_y = Some(y),
            (OpenEdge::CircularArc(edge), HatchValue::Radius(r)) => edge.radius = Some(r),
            (OpenEdge::CircularArc(edge), HatchValue::StartAngle(a)) => edge.start_angle = Some(a % 360.0),
            (OpenEdge::CircularArc(edge), HatchValue::EndAngle(a)) => edge.end_angle = Some(a % 360.0),
            (OpenEdge::CircularArc(edge), HatchValue::CcwFlag(direction)) => edge.direction = direction,

            (OpenEdge::EllipticalArc(edge), HatchValue::PointX(x)) => edge.center_x = Some(x),
            (OpenEdge::EllipticalArc(edge), HatchValue::PointY(y)) => edge.center_y = Some(y),
            (OpenEdge::EllipticalArc(edge), HatchValue::EndPointX(x)) => edge.major_x = Some(x),
            (OpenEdge::EllipticalArc(edge), HatchValue::EndPointY(y)) => edge.major_y = Some(y),
            (OpenEdge::EllipticalArc(edge), HatchValue::Radius(r)) => edge.ratio = Some(r),
            (OpenEdge::EllipticalArc(edge), HatchValue::StartAngle(a)) => edge.start_angle = Some(a),
            (OpenEdge::EllipticalArc(edge), HatchValue::EndAngle(a)) => edge.end_angle = Some(a),
            (OpenEdge::EllipticalArc(edge), HatchValue::CcwFlag(direction)) => edge.direction = direction,

            (_, other) => trace!(state = ?state, value = ?other, "当前子图形不接受该值"),
        }
        Ok(())
    }

    /// 输入结束：闭合所有未完成的部分并注册图案。
    pub fn finish(&mut self, ctx: &mut ConversionContext) -> Result<(), HatchError> {
        self.close_open_edge(&ctx.space)?;
        if self.state != HatchState::Seed {
            self.complete_pattern()?;
        }
        self.register_pattern(ctx);
        Ok(())
    }

    /// 所有边界环拼成一条路径；与上一段终点重合的边省略 `M`。
    pub fn path_data<S: SpaceConverter + ?Sized>(&self, space: &S) -> String {
        let mut parts: Vec<String> = Vec::new();
        for boundary in &self.loops {
            let mut previous_end: Option<Point> = None;
            let mut commands: Vec<String> = Vec::new();
            for edge in boundary {
                let continued = match (previous_end, edge.start_point()) {
                    (Some(end), Some(start)) => end.is_same_place(&start),
                    _ => false,
                };
                let command = edge.path_command(space, continued);
                if command.is_empty() {
                    continue;
                }
                commands.push(command);
                previous_end = edge.end_point();
            }
            if !commands.is_empty() {
                commands.push("Z".to_string());
                parts.push(commands.join(" "));
            }
        }
        parts.join("\n")
    }
}

/// HATCH 实体。
#[derive(Debug, Clone)]
pub struct Hatch {
    pub solid: bool,
    pub boundary: HatchBoundary,
    pub style: EntityStyle,
}

impl Hatch {
    pub fn new(pattern_name: impl Into<String>, solid: bool) -> Self {
        Self {
            solid,
            boundary: HatchBoundary::new(pattern_name),
            style: EntityStyle::default(),
        }
    }

    pub fn set_pattern_name(&mut self, name: impl Into<String>) {
        self.boundary.set_pattern_name(name);
    }

    fn resolved_colour(&self, ctx: &ConversionContext) -> String {
        let layer = ctx.layer_style(&self.style.layer);
        colour::aci_to_css(self.style.resolved_colour(layer, &ctx.settings))
    }

    pub fn feed(&mut self, ctx: &ConversionContext, value: HatchValue) -> Result<(), HatchError> {
        self.boundary.feed(ctx, value)
    }

    /// 结束输入并确定填充值（纯色或图案引用）。
    pub fn finish(&mut self, ctx: &mut ConversionContext) -> Result<(), HatchError> {
        let colour = self.resolved_colour(ctx);
        self.boundary.set_pattern_colour(colour.clone());
        self.boundary.finish(ctx)?;
        self.style.fill = match (self.solid, self.boundary.pattern_id()) {
            (false, Some(id)) => Some(format!("url(#{id})")),
            _ => Some(colour),
        };
        Ok(())
    }
}

impl HasStyle for Hatch {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Hatch {
    fn tag(&self) -> &'static str {
        "path"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let data = self.boundary.path_data(ctx);
        if data.is_empty() {
            debug!("填充没有可输出的边界");
            return;
        }
        let tag = TagBuilder::new("path")
            .attr("d", data)
            .attr("fill-rule", self.boundary.fill_rule().as_str());
        write_element_with(tag, &self.style, ctx, &["stroke:none"], out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DrawingSpace, Limits};
    use crate::errors::GeometryError;
    use HatchValue::*;

    fn context() -> ConversionContext {
        let mut space = DrawingSpace::new(1.0, 2, 0.01);
        space.set_limits(Limits::new(0.0, 0.0, 100.0, 100.0));
        ConversionContext::new(space, Default::default())
    }

    fn feed_all(
        boundary: &mut HatchBoundary,
        ctx: &mut ConversionContext,
        values: &[HatchValue],
    ) -> Result<(), HatchError> {
        for value in values {
            boundary.feed(ctx, *value)?;
        }
        Ok(())
    }

    fn line_edge(x1: f64, y1: f64, x2: f64, y2: f64) -> [HatchValue; 5] {
        [EdgeTypeSelector(1), PointX(x1), PointY(y1), EndPointX(x2), EndPointY(y2)]
    }

    #[test]
    fn single_line_loop_with_even_odd() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let mut values = vec![NewBoundaryCount(1), NewBoundaryStart(1)];
        values.extend(line_edge(0.0, 0.0, 10.0, 0.0));
        values.push(HatchStyleSelector(0));
        feed_all(&mut boundary, &mut ctx, &values).unwrap();

        assert_eq!(boundary.loops().len(), 1);
        assert_eq!(boundary.loops()[0].len(), 1);
        assert_eq!(boundary.loops()[0][0].kind(), EdgeType::Line);
        assert_eq!(boundary.fill_rule(), FillRule::EvenOdd);
        assert_eq!(boundary.state(), HatchState::Pattern);
    }

    #[test]
    fn loop_count_matches_boundary_starts() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let mut values = vec![NewBoundaryCount(2), NewBoundaryStart(1)];
        values.extend(line_edge(0.0, 0.0, 10.0, 0.0));
        values.extend(line_edge(10.0, 0.0, 10.0, 10.0));
        values.extend(line_edge(10.0, 10.0, 0.0, 0.0));
        values.push(NewBoundaryStart(1));
        values.extend(line_edge(2.0, 2.0, 4.0, 2.0));
        values.push(HatchStyleSelector(1));
        feed_all(&mut boundary, &mut ctx, &values).unwrap();

        assert_eq!(boundary.loops().len(), 2);
        assert_eq!(boundary.loops()[0].len(), 3);
        assert_eq!(boundary.loops()[1].len(), 1);
        assert_eq!(boundary.fill_rule(), FillRule::NonZero);
    }

    #[test]
    fn polyline_boundary_opens_directly() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [
            NewBoundaryStart(2),
            PolylineClosed(true),
            PointX(0.0),
            PointY(0.0),
            PointX(10.0),
            PointY(0.0),
            Bulge(1.0),
            PointX(10.0),
            PointY(10.0),
            HatchStyleSelector(0),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        let BoundaryEdge::Polyline(polyline) = &boundary.loops()[0][0] else {
            panic!("expected polyline edge");
        };
        assert!(polyline.is_closed());
        assert_eq!(polyline.vertices().len(), 3);
        assert_eq!(polyline.vertices()[2].bulge, 1.0);
    }

    #[test]
    fn bulge_promotes_line_to_polyline() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [
            NewBoundaryStart(0),
            EdgeTypeSelector(1),
            PointX(5.0),
            PointY(5.0),
            Bulge(0.5),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        assert_eq!(boundary.state(), HatchState::Pline);
        boundary.feed(&mut ctx, PointX(8.0)).unwrap();
        boundary.feed(&mut ctx, PointY(5.0)).unwrap();
        boundary.feed(&mut ctx, HatchStyleSelector(0)).unwrap();
        let BoundaryEdge::Polyline(polyline) = &boundary.loops()[0][0] else {
            panic!("expected promoted polyline");
        };
        assert_eq!(polyline.vertices().len(), 2);
        assert_eq!(polyline.vertices()[1].bulge, 0.5);
    }

    #[test]
    fn undefined_edge_and_state_are_errors() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        boundary.feed(&mut ctx, NewBoundaryStart(0)).unwrap();
        assert_eq!(
            boundary.feed(&mut ctx, EdgeTypeSelector(9)),
            Err(HatchError::UndefinedEdge(9))
        );
        boundary.feed(&mut ctx, EdgeTypeSelector(2)).unwrap();
        assert_eq!(
            boundary.enter_state(42),
            Err(HatchError::UndefinedState {
                value: 42,
                last_state: HatchState::CArc
            })
        );
    }

    #[test]
    fn edge_without_boundary_is_rejected() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        assert_eq!(
            boundary.feed(&mut ctx, EdgeTypeSelector(1)),
            Err(HatchError::NoActiveBoundary {
                state: HatchState::Elevation
            })
        );
    }

    #[test]
    fn incomplete_line_reports_missing_field() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [NewBoundaryStart(0), EdgeTypeSelector(1), PointX(1.0), PointY(1.0)];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        assert_eq!(
            boundary.feed(&mut ctx, HatchStyleSelector(0)),
            Err(HatchError::IncompleteEdge {
                kind: "line",
                missing: "end x"
            })
        );
    }

    #[test]
    fn arc_angles_are_normalised() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [
            NewBoundaryStart(0),
            EdgeTypeSelector(2),
            PointX(50.0),
            PointY(50.0),
            Radius(5.0),
            StartAngle(360.0),
            EndAngle(450.0),
            CcwFlag(SweepDirection::CounterClockwise),
            HatchStyleSelector(0),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        let BoundaryEdge::CircularArc(arc) = &boundary.loops()[0][0] else {
            panic!("expected arc edge");
        };
        assert_eq!(arc.start_angle(), 0.0);
        assert_eq!(arc.end_angle(), 90.0);
    }

    #[test]
    fn spline_edges_are_accepted_without_geometry() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [
            NewBoundaryStart(0),
            EdgeTypeSelector(4),
            PointX(1.0),
            PointY(2.0),
            Bulge(1.0),
            HatchStyleSelector(0),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        assert_eq!(boundary.loops()[0][0].kind(), EdgeType::Spline);
        assert!(boundary.path_data(&ctx).is_empty());
    }

    fn ansi31_values() -> Vec<HatchValue> {
        let mut values = vec![NewBoundaryStart(1)];
        values.extend(line_edge(0.0, 0.0, 10.0, 0.0));
        values.extend([
            HatchStyleSelector(1),
            PatternScale(1.0),
            PatternLineCount(1),
            PatternAngle(45.0),
            PatternBaseX(0.0),
            PatternBaseY(0.0),
            PatternOffsetX(-2.0),
            PatternOffsetY(2.0),
            DashCount(0),
            SeedCount(1),
            PointX(3.0),
            PointY(3.0),
        ]);
        values
    }

    #[test]
    fn pattern_is_registered_only_when_finished() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("ANSI31");
        feed_all(&mut boundary, &mut ctx, &ansi31_values()).unwrap();
        assert_eq!(boundary.state(), HatchState::Seed);
        assert!(boundary.pattern_id().is_none());
        assert!(ctx.patterns.is_empty());

        boundary.finish(&mut ctx).unwrap();
        assert_eq!(boundary.pattern_id(), Some("hatch-ANSI31"));
        assert_eq!(ctx.patterns.len(), 1);
    }

    #[test]
    fn failed_hatch_leaves_registry_untouched() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("ANSI31");
        let mut values = ansi31_values();
        // 种子点之后出现未知边类型，整个填充作废
        values.push(EdgeTypeSelector(7));
        assert_eq!(
            feed_all(&mut boundary, &mut ctx, &values),
            Err(HatchError::UndefinedEdge(7))
        );
        assert!(ctx.patterns.is_empty());
    }

    #[test]
    fn last_pattern_line_closes_at_declared_count() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("ANSI37");
        let values = [
            NewBoundaryStart(1),
            EdgeTypeSelector(1),
            PointX(0.0),
            PointY(0.0),
            EndPointX(10.0),
            EndPointY(0.0),
            HatchStyleSelector(1),
            PatternLineCount(2),
            PatternAngle(45.0),
            PatternBaseX(0.0),
            PatternBaseY(0.0),
            PatternOffsetX(-2.0),
            PatternOffsetY(2.0),
            DashCount(0),
            PatternAngle(135.0),
            PatternBaseX(0.0),
            PatternBaseY(0.0),
            PatternOffsetX(-2.0),
            PatternOffsetY(-2.0),
            DashCount(2),
            DashLength(1.0),
            DashLength(-0.5),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        // 第二条线的虚线段读完即闭合，无需等待种子点
        assert!(boundary.open_pattern_line.is_none());
        let pattern = boundary.pattern.as_ref().expect("图案应已生成");
        assert_eq!(pattern.lines().len(), 2);
        assert!(pattern.width() > 0.0);
        let width = pattern.width();
        let repeats = pattern.repeats();
        assert_eq!(repeats.len(), 2);
        assert_eq!(repeats[0].base.x, -width);
        assert_eq!(repeats[1].base.x, width);
        assert_eq!(repeats[1].dashes, vec![1.0, -0.5]);

        boundary.set_pattern_colour("rgb(0,0,255)");
        boundary.finish(&mut ctx).unwrap();
        assert_eq!(boundary.pattern_id(), Some("hatch-ANSI37"));
        let registered: Vec<_> = ctx.patterns.iter().collect();
        assert_eq!(registered.len(), 1);
        let (id, pattern) = registered[0];
        assert_eq!(id, "hatch-ANSI37");
        assert_eq!(pattern.lines().len(), 2);
        assert_eq!(pattern.colour(), "rgb(0,0,255)");
    }

    #[test]
    fn extra_pattern_line_is_rejected() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("ANSI31");
        let values = [
            NewBoundaryStart(1),
            EdgeTypeSelector(1),
            PointX(0.0),
            PointY(0.0),
            EndPointX(10.0),
            EndPointY(0.0),
            HatchStyleSelector(1),
            PatternLineCount(1),
            PatternAngle(45.0),
            PatternOffsetX(-2.0),
            PatternOffsetY(2.0),
            DashCount(0),
            PatternAngle(135.0),
            PatternOffsetX(-2.0),
            PatternOffsetY(-2.0),
            DashCount(0),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        assert_eq!(
            boundary.feed(&mut ctx, SeedCount(0)),
            Err(HatchError::ExtraPatternLine { declared: 1 })
        );
        assert!(ctx.patterns.is_empty());
    }

    #[test]
    fn elliptical_edge_uses_degrees_and_direction() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [
            NewBoundaryStart(0),
            EdgeTypeSelector(3),
            PointX(50.0),
            PointY(50.0),
            EndPointX(10.0),
            EndPointY(0.0),
            Radius(0.5),
            StartAngle(0.0),
            EndAngle(90.0),
            CcwFlag(SweepDirection::Clockwise),
            HatchStyleSelector(0),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        let BoundaryEdge::EllipticalArc(ellipse) = &boundary.loops()[0][0] else {
            panic!("expected elliptical edge");
        };
        assert!((ellipse.swept_angle() - std::f64::consts::FRAC_PI_2).abs() < 1e-9);

        // 顺时针：起止角镜像，扫描标志置 1
        let path = boundary.path_data(&ctx);
        assert!(path.starts_with("M 60,50 A 10,5 "), "{path}");
        assert!(path.ends_with(" 0,1 50,55 Z"), "{path}");
    }

    #[test]
    fn degenerate_arc_edge_is_rejected() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let values = [
            NewBoundaryStart(0),
            EdgeTypeSelector(2),
            PointX(50.0),
            PointY(50.0),
            Radius(0.0),
            StartAngle(0.0),
            EndAngle(90.0),
        ];
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        assert!(matches!(
            boundary.feed(&mut ctx, HatchStyleSelector(0)),
            Err(HatchError::Geometry(GeometryError::DegenerateGeometry(_)))
        ));
    }

    #[test]
    fn path_chains_connected_edges() {
        let mut ctx = context();
        let mut boundary = HatchBoundary::new("SOLID");
        let mut values = vec![NewBoundaryStart(1)];
        values.extend(line_edge(0.0, 0.0, 10.0, 0.0));
        values.extend(line_edge(10.0, 0.0, 10.0, 10.0));
        values.extend(line_edge(10.0, 10.0, 0.0, 0.0));
        values.push(HatchStyleSelector(0));
        feed_all(&mut boundary, &mut ctx, &values).unwrap();
        assert_eq!(
            boundary.path_data(&ctx),
            "M 0,100 L 10,100 L 10,90 L 0,100 Z"
        );
    }

    #[test]
    fn solid_hatch_renders_filled_path() {
        let mut ctx = context();
        let mut hatch = Hatch::new("SOLID", true);
        hatch.style.set_colour(1);
        let mut values = vec![NewBoundaryStart(1)];
        values.extend(line_edge(0.0, 0.0, 10.0, 0.0));
        values.extend(line_edge(10.0, 0.0, 0.0, 10.0));
        values.push(HatchStyleSelector(0));
        for value in values {
            hatch.feed(&mut ctx, value).unwrap();
        }
        hatch.finish(&mut ctx).unwrap();
        let mut out = String::new();
        hatch.write_svg(&ctx, &mut out);
        assert!(out.starts_with("<path d=\"M 0,100 L 10,100 L 0,90 Z\" fill-rule=\"evenodd\" style=\""));
        assert!(out.contains("fill:#ff0000"));
        assert!(out.ends_with("stroke:none\"/>"));
    }
}
