//! 元素集合：分组、图层、块定义与符号。子元素的插入顺序即输出顺序。

use glam::DVec2;

use crate::context::{ConversionContext, SpaceConverter};
use crate::element::{Renderable, SvgElement};
use crate::format::{self, TagBuilder};
use crate::style;

/// 有序子元素容器的公共行为。
pub trait Collection {
    fn children(&self) -> &[SvgElement];

    fn children_mut(&mut self) -> &mut Vec<SvgElement>;

    fn add(&mut self, element: SvgElement) {
        self.children_mut().push(element);
    }

    /// 强制插入到指定位置；越界时追加到末尾。
    fn insert(&mut self, index: usize, element: SvgElement) {
        let children = self.children_mut();
        let index = index.min(children.len());
        children.insert(index, element);
    }

    fn len(&self) -> usize {
        self.children().len()
    }

    fn is_empty(&self) -> bool {
        self.children().is_empty()
    }
}

fn write_children(children: &[SvgElement], ctx: &ConversionContext, out: &mut String) {
    for child in children {
        child.write_svg(ctx, out);
        out.push('\n');
    }
}

/// 普通分组 `<g>`。
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub id: Option<String>,
    pub class: Option<String>,
    pub transform: Option<String>,
    children: Vec<SvgElement>,
}

impl Group {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

impl Collection for Group {
    fn children(&self) -> &[SvgElement] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<SvgElement> {
        &mut self.children
    }
}

impl Renderable for Group {
    fn tag(&self) -> &'static str {
        "g"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let open = TagBuilder::new("g")
            .attr_opt("id", self.id.as_deref())
            .attr_opt("class", self.class.as_deref())
            .attr_opt("transform", self.transform.as_deref())
            .open();
        out.push_str(&open);
        out.push('\n');
        write_children(&self.children, ctx, out);
        out.push_str("</g>");
    }
}

/// 图层。文字总是绘制在同层图形之上。
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    children: Vec<SvgElement>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 图形插入到第一段文字之前，文字追加在末尾。
    pub fn add_element(&mut self, element: SvgElement) {
        if element.is_text() {
            self.add(element);
            return;
        }
        let index = self
            .children
            .iter()
            .position(SvgElement::is_text)
            .unwrap_or(self.children.len());
        self.insert(index, element);
    }
}

impl Collection for Layer {
    fn children(&self) -> &[SvgElement] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<SvgElement> {
        &mut self.children
    }
}

impl Renderable for Layer {
    fn tag(&self) -> &'static str {
        "g"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let class = style::layer_class(&self.name);
        let open = TagBuilder::new("g")
            .attr("id", &class)
            .attr("class", &class)
            .open();
        out.push_str(&open);
        out.push('\n');
        write_children(&self.children, ctx, out);
        out.push_str("</g>");
    }
}

/// 块定义，输出到 `<defs>` 中供 `<use>` 引用。
#[derive(Debug, Clone)]
pub struct EntityDeclaration {
    name: String,
    /// 块基点，DXF 单位。
    pub base: DVec2,
    children: Vec<SvgElement>,
}

impl EntityDeclaration {
    pub fn new(name: impl Into<String>, base: DVec2) -> Self {
        Self {
            name: name.into(),
            base,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> String {
        block_id(&self.name)
    }
}

/// 块名对应的元素 id。
pub fn block_id(name: &str) -> String {
    format!("block-{}", format::css_ident(name))
}

impl Collection for EntityDeclaration {
    fn children(&self) -> &[SvgElement] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<SvgElement> {
        &mut self.children
    }
}

impl Renderable for EntityDeclaration {
    fn tag(&self) -> &'static str {
        "g"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        out.push_str(&TagBuilder::new("g").attr("id", self.id()).open());
        out.push('\n');
        write_children(&self.children, ctx, out);
        out.push_str("</g>");
    }
}

/// `<symbol>`，带独立视口。
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: String,
    /// `min_x, min_y, width, height`，SVG 单位。
    pub view_box: [f64; 4],
    children: Vec<SvgElement>,
}

impl Symbol {
    pub fn new(id: impl Into<String>, view_box: [f64; 4]) -> Self {
        Self {
            id: id.into(),
            view_box,
            children: Vec::new(),
        }
    }
}

impl Collection for Symbol {
    fn children(&self) -> &[SvgElement] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<SvgElement> {
        &mut self.children
    }
}

impl Renderable for Symbol {
    fn tag(&self) -> &'static str {
        "symbol"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let view_box = self
            .view_box
            .iter()
            .map(|value| ctx.fmt(*value))
            .collect::<Vec<_>>()
            .join(" ");
        let open = TagBuilder::new("symbol")
            .attr("id", &self.id)
            .attr("viewBox", view_box)
            .open();
        out.push_str(&open);
        out.push('\n');
        write_children(&self.children, ctx, out);
        out.push_str("</symbol>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Circle, Line};
    use crate::geometry::Point;
    use crate::text::Text;

    fn line() -> SvgElement {
        Line::new(Point::from_svg(0.0, 0.0, 0.0), Point::from_svg(1.0, 1.0, 0.0)).into()
    }

    fn circle() -> SvgElement {
        Circle::new(Point::from_svg(0.0, 0.0, 0.0), 1.0).into()
    }

    fn text() -> SvgElement {
        Text::single_line(Point::default(), "label", 1.0).into()
    }

    #[test]
    fn insert_clamps_to_end() {
        let mut group = Group::new(Some("g1".into()));
        group.add(line());
        group.insert(99, circle());
        group.insert(0, text());
        assert_eq!(group.len(), 3);
        assert!(group.children()[0].is_text());
        assert_eq!(group.children()[2].tag(), "circle");
    }

    #[test]
    fn layer_keeps_text_on_top() {
        let mut layer = Layer::new("NOTES");
        layer.add_element(line());
        layer.add_element(text());
        layer.add_element(circle());
        let tags: Vec<_> = layer.children().iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["line", "circle", "text"]);
    }

    #[test]
    fn layer_renders_sanitised_id() {
        let ctx = ConversionContext::default();
        let mut layer = Layer::new("1 WALLS");
        layer.add_element(line());
        let svg = layer.to_svg(&ctx);
        assert!(svg.starts_with("<g id=\"layer-_1_WALLS\" class=\"layer-_1_WALLS\">\n<line "));
        assert!(svg.ends_with("</g>"));
    }

    #[test]
    fn declaration_and_symbol() {
        let ctx = ConversionContext::default();
        let mut block = EntityDeclaration::new("DOOR", DVec2::ZERO);
        block.add(line());
        assert_eq!(block.id(), "block-DOOR");
        assert!(block.to_svg(&ctx).starts_with("<g id=\"block-DOOR\">"));

        let mut symbol = Symbol::new("sym", [0.0, 0.0, 10.0, 5.5]);
        symbol.add(circle());
        let svg = symbol.to_svg(&ctx);
        assert!(svg.starts_with("<symbol id=\"sym\" viewBox=\"0 0 10 5.5\">"));
        assert!(svg.ends_with("</symbol>"));
    }
}
