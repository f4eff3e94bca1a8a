//! 样式覆盖判定：实例样式与所属图层默认值逐项比较，只输出不同的部分。

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::colour::{self, BYBLOCK, BYLAYER};
use crate::context::{ConversionContext, ConversionSettings, SpaceConverter};
use crate::format;

/// 与图层默认值不同的样式项位集。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct WhichRulesDiffer(u16);

impl WhichRulesDiffer {
    pub const NONE: Self = Self(0);
    pub const FILL: Self = Self(1 << 0);
    pub const COLOUR: Self = Self(1 << 1);
    pub const LINE_TYPE: Self = Self(1 << 2);
    pub const LINE_TYPE_SCALE: Self = Self(1 << 3);
    pub const VISIBILITY: Self = Self(1 << 4);
    pub const TEXT_HEIGHT: Self = Self(1 << 5);
    pub const FONT_FAMILY: Self = Self(1 << 6);
    pub const STROKE: Self = Self(1 << 7);

    /// 图形元素参与比较的全部项。
    pub const GRAPHIC_RULES: Self = Self(
        Self::FILL.0 | Self::COLOUR.0 | Self::LINE_TYPE.0 | Self::LINE_TYPE_SCALE.0 | Self::VISIBILITY.0,
    );
    /// 文字元素参与比较的全部项。
    pub const TEXT_RULES: Self = Self(
        Self::FILL.0
            | Self::COLOUR.0
            | Self::TEXT_HEIGHT.0
            | Self::FONT_FAMILY.0
            | Self::VISIBILITY.0
            | Self::STROKE.0,
    );

    #[inline]
    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl BitOr for WhichRulesDiffer {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WhichRulesDiffer {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// 图层默认样式，来自 DXF 的 LAYER 表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub name: String,
    pub colour: i32,
    pub line_type: String,
    pub line_type_scale: f64,
    pub fill: Option<String>,
    pub visible: bool,
    /// 0 表示图层不约定字高。
    pub text_height: f64,
    pub font_family: Option<String>,
    /// 文字是否描边。
    pub text_stroke: bool,
}

impl LayerStyle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            colour: 7,
            line_type: "CONTINUOUS".to_string(),
            line_type_scale: 1.0,
            fill: None,
            visible: true,
            text_height: 0.0,
            font_family: None,
            text_stroke: false,
        }
    }

    /// 负的颜色号表示图层关闭。
    pub fn set_colour(&mut self, colour: i32) {
        self.visible = colour > 0;
        self.colour = colour.abs();
    }

    pub fn class_name(&self) -> String {
        layer_class(&self.name)
    }

    pub fn css_colour(&self) -> String {
        colour::aci_to_css(self.colour)
    }

    /// 共享样式表模式下的图层规则（图形规则 + 文字规则）。
    pub fn css_rules(&self, ctx: &ConversionContext) -> String {
        let class = self.class_name();
        let colour = self.css_colour();
        let mut graphic = vec![
            format!("stroke:{colour}"),
            format!("stroke-width:{}", ctx.fmt(ctx.default_stroke_width())),
            format!("fill:{}", self.fill.as_deref().unwrap_or("none")),
        ];
        if let Some(dashes) = ctx
            .line_types
            .dash_array(&self.line_type, self.line_type_scale, &ctx.space)
        {
            graphic.push(format!("stroke-dasharray:{dashes}"));
        }
        if !self.visible {
            graphic.push("visibility:hidden".to_string());
        }

        let mut text = vec![format!("fill:{colour}")];
        if !self.text_stroke {
            text.push("stroke:none".to_string());
        }
        text.push(format!(
            "font-family:{}",
            self.font_family
                .as_deref()
                .unwrap_or(&ctx.settings.default_font)
        ));
        if self.text_height > 0.0 {
            text.push(format!(
                "font-size:{}",
                ctx.fmt(ctx.scale_length(self.text_height))
            ));
        }

        format!(
            ".{class}{{{}}}\n.{class} text{{{}}}\n",
            graphic.join(";"),
            text.join(";")
        )
    }
}

/// 图层名对应的 CSS 类名（同时用作图层分组的 id）。
pub fn layer_class(name: &str) -> String {
    format!("layer-{}", format::css_ident(name))
}

/// 图形实体自身携带的样式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStyle {
    pub layer: String,
    pub colour: i32,
    pub line_type: Option<String>,
    pub line_type_scale: f64,
    pub fill: Option<String>,
    pub visible: bool,
}

impl Default for EntityStyle {
    fn default() -> Self {
        Self {
            layer: "0".to_string(),
            colour: BYLAYER,
            line_type: None,
            line_type_scale: 1.0,
            fill: None,
            visible: true,
        }
    }
}

impl EntityStyle {
    pub fn on_layer(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            ..Self::default()
        }
    }

    /// 颜色号不大于 0 时实体随之隐藏。
    pub fn set_colour(&mut self, colour: i32) {
        self.colour = colour;
        if colour <= 0 {
            self.visible = false;
        }
    }

    pub fn set_line_type(&mut self, line_type: impl Into<String>) {
        let line_type = line_type.into();
        if line_type.eq_ignore_ascii_case("BYLAYER") {
            self.line_type = None;
        } else {
            self.line_type = Some(line_type);
        }
    }

    fn follows_layer_colour(&self, settings: &ConversionSettings) -> bool {
        settings.colour_by_layer || self.colour == BYLAYER || self.colour == BYBLOCK
    }

    /// 实际生效的颜色号。
    pub fn resolved_colour(&self, layer: &LayerStyle, settings: &ConversionSettings) -> i32 {
        if self.follows_layer_colour(settings) {
            layer.colour
        } else {
            self.colour.abs()
        }
    }

    pub fn resolved_line_type<'a>(&'a self, layer: &'a LayerStyle) -> &'a str {
        self.line_type.as_deref().unwrap_or(&layer.line_type)
    }
}

/// 计算图形实体与图层之间不同的样式项。内联模式下全部置位。
pub fn graphic_rules_differ(
    style: &EntityStyle,
    layer: &LayerStyle,
    settings: &ConversionSettings,
) -> WhichRulesDiffer {
    if settings.inline_styles {
        return WhichRulesDiffer::GRAPHIC_RULES;
    }
    let mut differ = WhichRulesDiffer::NONE;
    differ.set(
        WhichRulesDiffer::FILL,
        style.fill.is_some() && style.fill != layer.fill,
    );
    differ.set(
        WhichRulesDiffer::COLOUR,
        !style.follows_layer_colour(settings) && style.colour.abs() != layer.colour,
    );
    differ.set(
        WhichRulesDiffer::LINE_TYPE,
        style
            .line_type
            .as_deref()
            .is_some_and(|lt| !lt.eq_ignore_ascii_case(&layer.line_type)),
    );
    differ.set(
        WhichRulesDiffer::LINE_TYPE_SCALE,
        (style.line_type_scale - layer.line_type_scale).abs() > f64::EPSILON,
    );
    differ.set(WhichRulesDiffer::VISIBILITY, style.visible != layer.visible);
    differ
}

/// 文字实体的可比较样式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAppearance {
    pub height: f64,
    pub font_family: Option<String>,
    pub stroke: bool,
}

pub fn text_rules_differ(
    style: &EntityStyle,
    text: &TextAppearance,
    layer: &LayerStyle,
    settings: &ConversionSettings,
) -> WhichRulesDiffer {
    if settings.inline_styles {
        return WhichRulesDiffer::TEXT_RULES;
    }
    let mut differ = graphic_rules_differ(style, layer, settings);
    differ.set(WhichRulesDiffer::LINE_TYPE, false);
    differ.set(WhichRulesDiffer::LINE_TYPE_SCALE, false);
    differ.set(
        WhichRulesDiffer::TEXT_HEIGHT,
        (text.height - layer.text_height).abs() > f64::EPSILON,
    );
    differ.set(
        WhichRulesDiffer::FONT_FAMILY,
        text.font_family.is_some() && text.font_family != layer.font_family,
    );
    differ.set(WhichRulesDiffer::STROKE, text.stroke != layer.text_stroke);
    differ
}

fn join_declarations(declarations: Vec<String>) -> Option<String> {
    if declarations.is_empty() {
        None
    } else {
        Some(declarations.join(";"))
    }
}

/// 生成图形实体的 `style` 属性值；与图层完全一致时返回 `None`。
pub fn graphic_style(style: &EntityStyle, ctx: &ConversionContext) -> Option<String> {
    let layer = ctx.layer_style(&style.layer);
    let differ = graphic_rules_differ(style, layer, &ctx.settings);
    let mut declarations = Vec::new();

    if differ.contains(WhichRulesDiffer::COLOUR) {
        let colour = style.resolved_colour(layer, &ctx.settings);
        declarations.push(format!("stroke:{}", colour::aci_to_css(colour)));
    }
    if ctx.settings.inline_styles {
        declarations.push(format!(
            "stroke-width:{}",
            ctx.fmt(ctx.default_stroke_width())
        ));
    }
    if differ.contains(WhichRulesDiffer::FILL) {
        let fill = style
            .fill
            .as_deref()
            .or(layer.fill.as_deref())
            .unwrap_or("none");
        declarations.push(format!("fill:{fill}"));
    }
    if differ.contains(WhichRulesDiffer::LINE_TYPE)
        || differ.contains(WhichRulesDiffer::LINE_TYPE_SCALE)
    {
        let scale = style.line_type_scale * layer.line_type_scale;
        if let Some(dashes) =
            ctx.line_types
                .dash_array(style.resolved_line_type(layer), scale, &ctx.space)
        {
            declarations.push(format!("stroke-dasharray:{dashes}"));
        }
    }
    if differ.contains(WhichRulesDiffer::VISIBILITY) {
        let visible = style.visible && layer.visible;
        declarations.push(format!(
            "visibility:{}",
            if visible { "visible" } else { "hidden" }
        ));
    }
    join_declarations(declarations)
}

/// 生成文字实体的 `style` 属性值。
pub fn text_style(
    style: &EntityStyle,
    text: &TextAppearance,
    ctx: &ConversionContext,
) -> Option<String> {
    let layer = ctx.layer_style(&style.layer);
    let differ = text_rules_differ(style, text, layer, &ctx.settings);
    let mut declarations = Vec::new();

    if differ.contains(WhichRulesDiffer::COLOUR) || differ.contains(WhichRulesDiffer::FILL) {
        let colour = style.resolved_colour(layer, &ctx.settings);
        declarations.push(format!("fill:{}", colour::aci_to_css(colour)));
    }
    if differ.contains(WhichRulesDiffer::STROKE) {
        declarations.push(if text.stroke {
            let colour = style.resolved_colour(layer, &ctx.settings);
            format!("stroke:{}", colour::aci_to_css(colour))
        } else {
            "stroke:none".to_string()
        });
    }
    if differ.contains(WhichRulesDiffer::TEXT_HEIGHT) {
        declarations.push(format!(
            "font-size:{}",
            ctx.fmt(ctx.scale_length(text.height))
        ));
    }
    if differ.contains(WhichRulesDiffer::FONT_FAMILY) {
        let family = text
            .font_family
            .as_deref()
            .or(layer.font_family.as_deref())
            .unwrap_or(&ctx.settings.default_font);
        declarations.push(format!("font-family:{family}"));
    }
    if differ.contains(WhichRulesDiffer::VISIBILITY) {
        let visible = style.visible && layer.visible;
        declarations.push(format!(
            "visibility:{}",
            if visible { "visible" } else { "hidden" }
        ));
    }
    join_declarations(declarations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_layer(layer: LayerStyle) -> ConversionContext {
        let mut ctx = ConversionContext::default();
        ctx.layers.insert(layer);
        ctx
    }

    #[test]
    fn matching_style_emits_nothing() {
        let ctx = ctx_with_layer(LayerStyle::new("WALLS"));
        let style = EntityStyle::on_layer("WALLS");
        assert!(graphic_rules_differ(&style, ctx.layer_style("WALLS"), &ctx.settings).is_empty());
        assert_eq!(graphic_style(&style, &ctx), None);
    }

    #[test]
    fn explicit_colour_differs() {
        let ctx = ctx_with_layer(LayerStyle::new("WALLS"));
        let mut style = EntityStyle::on_layer("WALLS");
        style.set_colour(1);
        let differ = graphic_rules_differ(&style, ctx.layer_style("WALLS"), &ctx.settings);
        assert_eq!(differ, WhichRulesDiffer::COLOUR);
        assert_eq!(graphic_style(&style, &ctx).as_deref(), Some("stroke:#ff0000"));
    }

    #[test]
    fn colour_by_layer_suppresses_colour_bit() {
        let mut ctx = ctx_with_layer(LayerStyle::new("WALLS"));
        ctx.settings.colour_by_layer = true;
        let mut style = EntityStyle::on_layer("WALLS");
        style.set_colour(3);
        assert!(graphic_rules_differ(&style, ctx.layer_style("WALLS"), &ctx.settings).is_empty());
    }

    #[test]
    fn inline_mode_sets_every_bit() {
        let mut ctx = ctx_with_layer(LayerStyle::new("WALLS"));
        ctx.settings.inline_styles = true;
        let style = EntityStyle::on_layer("WALLS");
        let differ = graphic_rules_differ(&style, ctx.layer_style("WALLS"), &ctx.settings);
        assert_eq!(differ, WhichRulesDiffer::GRAPHIC_RULES);
        let css = graphic_style(&style, &ctx).unwrap();
        assert!(css.contains("stroke:#000000"));
        assert!(css.contains("fill:none"));
        assert!(css.contains("visibility:visible"));
    }

    #[test]
    fn non_positive_colour_hides() {
        let mut style = EntityStyle::default();
        style.set_colour(-3);
        assert!(!style.visible);
        let ctx = ConversionContext::default();
        let differ = graphic_rules_differ(&style, ctx.layer_style("0"), &ctx.settings);
        assert!(differ.contains(WhichRulesDiffer::VISIBILITY));
    }

    #[test]
    fn text_rules_cover_font_and_height() {
        let mut layer = LayerStyle::new("NOTES");
        layer.text_height = 2.5;
        let ctx = ctx_with_layer(layer);
        let style = EntityStyle::on_layer("NOTES");
        let same = TextAppearance {
            height: 2.5,
            font_family: None,
            stroke: false,
        };
        assert!(text_rules_differ(&style, &same, ctx.layer_style("NOTES"), &ctx.settings).is_empty());
        let bigger = TextAppearance {
            height: 5.0,
            font_family: Some("serif".into()),
            stroke: false,
        };
        let differ = text_rules_differ(&style, &bigger, ctx.layer_style("NOTES"), &ctx.settings);
        assert_eq!(
            differ,
            WhichRulesDiffer::TEXT_HEIGHT | WhichRulesDiffer::FONT_FAMILY
        );
        assert_eq!(
            text_style(&style, &bigger, &ctx).as_deref(),
            Some("font-size:5;font-family:serif")
        );
    }

    #[test]
    fn layer_rules_use_sanitised_class() {
        let mut layer = LayerStyle::new("A 1");
        layer.set_colour(-1);
        let ctx = ConversionContext::default();
        let css = layer.css_rules(&ctx);
        assert!(css.starts_with(".layer-A_1{stroke:#ff0000;"));
        assert!(css.contains("visibility:hidden"));
        assert!(css.contains(".layer-A_1 text{fill:#ff0000;stroke:none;font-family:sans-serif}"));
    }
}
