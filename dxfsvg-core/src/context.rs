//! 转换上下文：坐标空间、图层/线型查询表以及填充图案注册表。
//!
//! 所有“每张图纸一份”的状态都集中在 [`ConversionContext`] 中，点的容差同样由
//! 此处注入，不存在进程级共享状态。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::format;
use crate::pattern::HatchPattern;
use crate::style::LayerStyle;

/// DXF 空间中的图纸范围（左下角与右上角）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Limits {
    #[inline]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width() > f64::EPSILON && self.height() > f64::EPSILON)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(0.0, 0.0, 420.0, 297.0)
    }
}

/// 坐标空间转换契约。几何模块只依赖这里的查询，不关心具体实现。
///
/// 转换顺序：水平缩放/平移，垂直翻转并缩放/平移（左下原点 → 左上原点），
/// 最后减去图纸范围偏移，使图纸包围盒从 SVG 原点开始。
pub trait SpaceConverter {
    /// 每个 DXF 单位对应的 SVG 单位数。
    fn unit_scale(&self) -> f64;
    fn delta_x(&self) -> f64;
    fn delta_y(&self) -> f64;
    fn limits(&self) -> Limits;
    /// 输出时保留的小数位数。
    fn precision(&self) -> usize;
    /// SVG 空间中的点邻近容差。
    fn fuzz(&self) -> f64;
    fn points_per_pixel(&self) -> f64;

    fn to_svg_x(&self, x: f64) -> f64 {
        let scale = self.unit_scale();
        x * scale + self.delta_x() - self.limits().min_x * scale
    }

    fn to_svg_y(&self, y: f64) -> f64 {
        let scale = self.unit_scale();
        -y * scale + self.delta_y() + self.limits().max_y * scale
    }

    fn to_dxf_x(&self, x: f64) -> f64 {
        let scale = self.unit_scale();
        (x - self.delta_x() + self.limits().min_x * scale) / scale
    }

    fn to_dxf_y(&self, y: f64) -> f64 {
        let scale = self.unit_scale();
        (self.limits().max_y * scale + self.delta_y() - y) / scale
    }

    /// 长度只缩放，不平移也不翻转。
    fn scale_length(&self, length: f64) -> f64 {
        length * self.unit_scale()
    }

    fn trim(&self, value: f64) -> f64 {
        format::trim(value, self.precision())
    }

    fn fmt(&self, value: f64) -> String {
        format::fmt_trimmed(value, self.precision())
    }
}

/// 默认的坐标空间实现。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingSpace {
    unit_scale: f64,
    delta_x: f64,
    delta_y: f64,
    limits: Limits,
    precision: usize,
    /// DXF 单位下的容差，对外按 `unit_scale` 换算。
    fuzz: f64,
    points_per_pixel: f64,
}

impl Default for DrawingSpace {
    fn default() -> Self {
        Self {
            unit_scale: 1.0,
            delta_x: 0.0,
            delta_y: 0.0,
            limits: Limits::default(),
            precision: 2,
            fuzz: 0.01,
            points_per_pixel: 1.0,
        }
    }
}

impl DrawingSpace {
    pub fn new(unit_scale: f64, precision: usize, fuzz: f64) -> Self {
        let mut space = Self {
            precision,
            fuzz: fuzz.abs(),
            ..Self::default()
        };
        space.set_unit_scale(unit_scale);
        space
    }

    /// 非正或非有限的缩放比例回退为 1。
    pub fn set_unit_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.unit_scale = scale;
        } else {
            warn!(scale, "非法的单位缩放比例，回退为 1.0");
            self.unit_scale = 1.0;
        }
    }

    pub fn set_limits(&mut self, limits: Limits) {
        if limits.is_degenerate() {
            warn!(?limits, "图纸范围退化，保持原有范围");
            return;
        }
        debug!(?limits, "更新图纸范围");
        self.limits = limits;
    }

    pub fn set_deltas(&mut self, delta_x: f64, delta_y: f64) {
        self.delta_x = delta_x;
        self.delta_y = delta_y;
    }

    pub fn set_precision(&mut self, precision: usize) {
        self.precision = precision;
    }

    pub fn set_fuzz(&mut self, fuzz: f64) {
        self.fuzz = fuzz.abs();
    }

    pub fn set_points_per_pixel(&mut self, value: f64) {
        if value.is_finite() && value > 0.0 {
            self.points_per_pixel = value;
        }
    }

    /// 块定义内部使用的局部空间：以块基点为原点，仅翻转 Y 轴，不做图纸偏移。
    pub fn block_local(&self, base_x: f64, base_y: f64) -> Self {
        Self {
            delta_x: 0.0,
            delta_y: 0.0,
            limits: Limits {
                min_x: base_x,
                min_y: base_y,
                max_x: base_x,
                max_y: base_y,
            },
            ..self.clone()
        }
    }

    /// SVG 空间中的画布宽高。
    pub fn canvas_size(&self) -> (f64, f64) {
        (
            self.limits.width() * self.unit_scale,
            self.limits.height() * self.unit_scale,
        )
    }
}

impl SpaceConverter for DrawingSpace {
    fn unit_scale(&self) -> f64 {
        self.unit_scale
    }

    fn delta_x(&self) -> f64 {
        self.delta_x
    }

    fn delta_y(&self) -> f64 {
        self.delta_y
    }

    fn limits(&self) -> Limits {
        self.limits
    }

    fn precision(&self) -> usize {
        self.precision
    }

    fn fuzz(&self) -> f64 {
        self.fuzz * self.unit_scale
    }

    fn points_per_pixel(&self) -> f64 {
        self.points_per_pixel
    }
}

/// 与坐标无关的输出开关。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// 为真时每个元素都输出完整样式，不依赖图层样式表。
    pub inline_styles: bool,
    /// 为真时实体颜色一律由图层决定。
    pub colour_by_layer: bool,
    pub default_font: String,
    /// 平均字宽与字高之比，用于多行文字折行。
    pub glyph_width_ratio: f64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            inline_styles: false,
            colour_by_layer: false,
            default_font: "sans-serif".to_string(),
            glyph_width_ratio: 0.6,
        }
    }
}

/// 图层样式表，保持 DXF 中的声明顺序。
#[derive(Debug, Clone)]
pub struct LayerTable {
    order: Vec<String>,
    styles: HashMap<String, LayerStyle>,
    fallback: LayerStyle,
}

impl Default for LayerTable {
    fn default() -> Self {
        let mut table = Self {
            order: Vec::new(),
            styles: HashMap::new(),
            fallback: LayerStyle::new("0"),
        };
        table.insert(LayerStyle::new("0"));
        table
    }
}

impl LayerTable {
    pub fn insert(&mut self, style: LayerStyle) {
        if !self.styles.contains_key(&style.name) {
            self.order.push(style.name.clone());
        }
        self.styles.insert(style.name.clone(), style);
    }

    pub fn ensure(&mut self, name: &str) {
        if !self.styles.contains_key(name) {
            self.insert(LayerStyle::new(name));
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&LayerStyle> {
        self.styles.get(name)
    }

    /// 查询图层样式；缺失时回退到 0 层。
    pub fn style_for(&self, name: &str) -> &LayerStyle {
        if let Some(style) = self.styles.get(name) {
            return style;
        }
        warn!(layer = name, "引用了不存在的图层，回退到 0 层");
        self.styles.get("0").unwrap_or(&self.fallback)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerStyle> {
        self.order.iter().filter_map(|name| self.styles.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// 线型表：名称 → 虚线段长度（DXF 单位，负值表示空白）。
#[derive(Debug, Clone, Default)]
pub struct LineTypeTable {
    dashes: HashMap<String, Vec<f64>>,
}

impl LineTypeTable {
    pub fn insert(&mut self, name: impl Into<String>, dashes: Vec<f64>) {
        self.dashes.insert(name.into().to_ascii_uppercase(), dashes);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.dashes
            .get(&name.to_ascii_uppercase())
            .map(|dashes| dashes.as_slice())
    }

    /// 生成 `stroke-dasharray` 的值；实线或未知线型返回 `None`。
    pub fn dash_array(&self, name: &str, scale: f64, space: &dyn SpaceConverter) -> Option<String> {
        let upper = name.to_ascii_uppercase();
        if matches!(upper.as_str(), "CONTINUOUS" | "BYLAYER" | "BYBLOCK" | "") {
            return None;
        }
        let Some(dashes) = self.dashes.get(&upper) else {
            debug!(line_type = name, "未知线型，按实线输出");
            return None;
        };
        if dashes.is_empty() {
            return None;
        }
        let values: Vec<String> = dashes
            .iter()
            .map(|dash| space.fmt(space.scale_length(dash.abs() * scale)))
            .collect();
        Some(values.join(","))
    }
}

/// 已注册的填充图案；按 [`HatchPattern`] 的相等契约加上线条颜色去重。
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    entries: Vec<(String, HatchPattern)>,
    serial: usize,
}

impl PatternRegistry {
    /// 注册图案并返回其 id。几何与颜色都相同时复用旧 id；
    /// 同名但参数或颜色不同的图案追加序号后缀。
    pub fn register(&mut self, pattern: HatchPattern) -> String {
        let existing = self
            .entries
            .iter()
            .find(|(_, known)| *known == pattern && known.colour() == pattern.colour());
        if let Some((id, _)) = existing {
            return id.clone();
        }
        let base = format::css_ident(&format!("hatch-{}", pattern.name()));
        let id = if self.entries.iter().any(|(id, _)| *id == base) {
            self.serial += 1;
            format!("{base}_{}", self.serial)
        } else {
            base
        };
        debug!(id = %id, lines = pattern.lines().len(), "注册填充图案");
        self.entries.push((id.clone(), pattern));
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HatchPattern)> {
        self.entries
            .iter()
            .map(|(id, pattern)| (id.as_str(), pattern))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 单张图纸的转换上下文。
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    pub space: DrawingSpace,
    pub settings: ConversionSettings,
    pub layers: LayerTable,
    pub line_types: LineTypeTable,
    pub patterns: PatternRegistry,
}

impl ConversionContext {
    pub fn new(space: DrawingSpace, settings: ConversionSettings) -> Self {
        Self {
            space,
            settings,
            ..Self::default()
        }
    }

    #[inline]
    pub fn layer_style(&self, name: &str) -> &LayerStyle {
        self.layers.style_for(name)
    }

    #[inline]
    pub fn register_pattern(&mut self, pattern: HatchPattern) -> String {
        self.patterns.register(pattern)
    }

    /// 默认线宽，由每像素点数换算。
    pub fn default_stroke_width(&self) -> f64 {
        1.0 / self.space.points_per_pixel()
    }
}

impl SpaceConverter for ConversionContext {
    fn unit_scale(&self) -> f64 {
        self.space.unit_scale()
    }

    fn delta_x(&self) -> f64 {
        self.space.delta_x()
    }

    fn delta_y(&self) -> f64 {
        self.space.delta_y()
    }

    fn limits(&self) -> Limits {
        self.space.limits()
    }

    fn precision(&self) -> usize {
        self.space.precision()
    }

    fn fuzz(&self) -> f64 {
        self.space.fuzz()
    }

    fn points_per_pixel(&self) -> f64 {
        self.space.points_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::HatchLine;

    fn sample_space() -> DrawingSpace {
        let mut space = DrawingSpace::new(2.0, 3, 0.01);
        space.set_limits(Limits::new(-10.0, -5.0, 90.0, 45.0));
        space
    }

    #[test]
    fn svg_conversion_flips_and_offsets() {
        let space = sample_space();
        // 左下角映射到 (0, height)，左上角映射到原点
        assert!((space.to_svg_x(-10.0)).abs() < 1e-9);
        assert!((space.to_svg_y(-5.0) - 100.0).abs() < 1e-9);
        assert!((space.to_svg_y(45.0)).abs() < 1e-9);
        assert!((space.to_svg_x(0.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn svg_conversion_round_trips() {
        let mut space = sample_space();
        space.set_deltas(3.5, -1.25);
        for (x, y) in [(0.0, 0.0), (12.345, -4.5), (89.9, 44.1), (-10.0, 17.0)] {
            let sx = space.to_svg_x(x);
            let sy = space.to_svg_y(y);
            assert!((space.to_dxf_x(sx) - x).abs() < 1e-9);
            assert!((space.to_dxf_y(sy) - y).abs() < 1e-9);
        }
    }

    #[test]
    fn fuzz_is_scaled_by_unit_factor() {
        let space = sample_space();
        assert!((space.fuzz() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn invalid_scale_falls_back() {
        let space = DrawingSpace::new(0.0, 2, 0.01);
        assert_eq!(space.unit_scale(), 1.0);
    }

    #[test]
    fn missing_layer_falls_back_to_zero() {
        let ctx = ConversionContext::default();
        assert_eq!(ctx.layer_style("GHOST").name, "0");
    }

    #[test]
    fn line_type_dash_array_is_scaled() {
        let mut table = LineTypeTable::default();
        table.insert("dashed", vec![0.5, -0.25]);
        let space = DrawingSpace::new(2.0, 2, 0.01);
        assert_eq!(
            table.dash_array("DASHED", 2.0, &space).as_deref(),
            Some("2,1")
        );
        assert!(table.dash_array("Continuous", 1.0, &space).is_none());
        assert!(table.dash_array("UNKNOWN", 1.0, &space).is_none());
    }

    #[test]
    fn registry_deduplicates_and_suffixes() {
        let mut registry = PatternRegistry::default();
        let mut first = HatchPattern::new("ANSI31", 1.0);
        first.add_line(HatchLine::new(45.0).with_offset(-2.0, 2.0), true);
        let mut same = HatchPattern::new("ANSI31", 1.0);
        same.add_line(HatchLine::new(45.0).with_offset(-2.0, 2.0), true);
        let mut wider = HatchPattern::new("ANSI31", 1.0);
        wider.add_line(HatchLine::new(45.0).with_offset(-4.0, 4.0), true);

        let a = registry.register(first);
        let b = registry.register(same);
        let c = registry.register(wider);
        assert_eq!(a, "hatch-ANSI31");
        assert_eq!(a, b);
        assert_eq!(c, "hatch-ANSI31_1");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_keeps_differently_coloured_patterns_apart() {
        let mut registry = PatternRegistry::default();
        let coloured = |colour: &str| {
            let mut pattern = HatchPattern::new("ANSI31", 1.0);
            pattern.add_line(HatchLine::new(45.0).with_offset(-2.0, 2.0), true);
            pattern.set_colour(colour);
            pattern
        };

        let red = registry.register(coloured("rgb(255,0,0)"));
        let blue = registry.register(coloured("rgb(0,0,255)"));
        let red_again = registry.register(coloured("rgb(255,0,0)"));
        assert_eq!(red, "hatch-ANSI31");
        assert_eq!(blue, "hatch-ANSI31_1");
        assert_eq!(red_again, red);
        assert_eq!(registry.len(), 2);
        let colours: Vec<_> = registry.iter().map(|(_, pattern)| pattern.colour()).collect();
        assert_eq!(colours, vec!["rgb(255,0,0)", "rgb(0,0,255)"]);
    }
}
