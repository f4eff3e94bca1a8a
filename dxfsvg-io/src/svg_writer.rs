//! 组装完整的 SVG 文档。

use dxfsvg_core::format::TagBuilder;
use dxfsvg_core::{Renderable, SpaceConverter};

use crate::drawing::Drawing;

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// 文档输出顺序：样式表、`<defs>`（填充图案、块定义）、各图层分组。
pub struct SvgDocument<'a> {
    drawing: &'a Drawing,
}

impl<'a> SvgDocument<'a> {
    pub fn new(drawing: &'a Drawing) -> Self {
        Self { drawing }
    }

    pub fn render(&self) -> String {
        let ctx = &self.drawing.context;
        let mut out = String::with_capacity(4096);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");

        let (width, height) = ctx.space.canvas_size();
        let width = ctx.fmt(width);
        let height = ctx.fmt(height);
        out.push_str(
            &TagBuilder::new("svg")
                .attr("xmlns", SVG_NS)
                .attr("xmlns:xlink", XLINK_NS)
                .attr("version", "1.1")
                .attr("width", &width)
                .attr("height", &height)
                .attr("viewBox", format!("0 0 {width} {height}"))
                .open(),
        );
        out.push('\n');

        self.write_stylesheet(&mut out);
        self.write_defs(&mut out);

        for layer in self.drawing.layers() {
            layer.write_svg(ctx, &mut out);
            out.push('\n');
        }
        out.push_str("</svg>\n");
        out
    }

    /// 共享样式表模式下每个图层一组规则；内联模式不输出。
    fn write_stylesheet(&self, out: &mut String) {
        let ctx = &self.drawing.context;
        if ctx.settings.inline_styles || ctx.layers.is_empty() {
            return;
        }
        out.push_str("<style type=\"text/css\"><![CDATA[\n");
        for layer in ctx.layers.iter() {
            out.push_str(&layer.css_rules(ctx));
        }
        out.push_str("]]></style>\n");
    }

    fn write_defs(&self, out: &mut String) {
        let ctx = &self.drawing.context;
        let declarations = self.drawing.declarations();
        if ctx.patterns.is_empty() && declarations.is_empty() {
            return;
        }
        out.push_str("<defs>\n");
        let stroke_width = ctx.default_stroke_width();
        for (id, pattern) in ctx.patterns.iter() {
            out.push_str(&pattern.to_svg(id, &ctx.space, stroke_width));
            out.push('\n');
        }
        for declaration in declarations {
            declaration.write_svg(ctx, out);
            out.push('\n');
        }
        out.push_str("</defs>\n");
    }
}
