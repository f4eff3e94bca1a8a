//! 单行文字（TEXT）与多行文字（MTEXT）。

use serde::{Deserialize, Serialize};

use crate::context::{ConversionContext, SpaceConverter};
use crate::element::{HasStyle, Renderable};
use crate::format::{self, TagBuilder};
use crate::geometry::{Point, PointFormat};
use crate::style::{self, EntityStyle, TextAppearance};

/// 行距与字高之比。
pub const LINE_SPACING: f64 = 5.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAnchor {
    #[default]
    Start,
    Middle,
    End,
}

impl TextAnchor {
    /// TEXT 的水平对齐（组码 72）。
    pub fn from_text_justification(value: i32) -> Self {
        match value {
            1 | 4 => TextAnchor::Middle,
            2 => TextAnchor::End,
            _ => TextAnchor::Start,
        }
    }

    /// MTEXT 的附着点（组码 71，1..=9，按列取水平对齐）。
    pub fn from_attachment(value: i32) -> Self {
        match (value.clamp(1, 9) - 1) % 3 {
            1 => TextAnchor::Middle,
            2 => TextAnchor::End,
            _ => TextAnchor::Start,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextAnchor::Start => "start",
            TextAnchor::Middle => "middle",
            TextAnchor::End => "end",
        }
    }
}

/// 去掉 MTEXT 的格式控制码并按段落拆分。
pub fn mtext_paragraphs(raw: &str) -> Vec<String> {
    let mut paragraphs = vec![String::new()];
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('P') | Some('n') => paragraphs.push(String::new()),
                Some('~') => push_char(&mut paragraphs, ' '),
                Some('\\') => push_char(&mut paragraphs, '\\'),
                Some('{') => push_char(&mut paragraphs, '{'),
                Some('}') => push_char(&mut paragraphs, '}'),
                // 带参数的控制码以分号结束
                Some('f' | 'F' | 'H' | 'W' | 'Q' | 'T' | 'A' | 'C' | 'c' | 'p') => {
                    for skipped in chars.by_ref() {
                        if skipped == ';' {
                            break;
                        }
                    }
                }
                Some('S') => {
                    for stacked in chars.by_ref() {
                        match stacked {
                            ';' => break,
                            '^' | '#' => push_char(&mut paragraphs, '/'),
                            other => push_char(&mut paragraphs, other),
                        }
                    }
                }
                Some(_) | None => {}
            },
            '{' | '}' => {}
            '\n' => paragraphs.push(String::new()),
            '%' if chars.peek() == Some(&'%') => {
                chars.next();
                match chars.next() {
                    Some('c' | 'C') => push_char(&mut paragraphs, '\u{2300}'),
                    Some('d' | 'D') => push_char(&mut paragraphs, '\u{00b0}'),
                    Some('p' | 'P') => push_char(&mut paragraphs, '\u{00b1}'),
                    Some('%') => push_char(&mut paragraphs, '%'),
                    _ => {}
                }
            }
            other => push_char(&mut paragraphs, other),
        }
    }
    paragraphs
}

fn push_char(paragraphs: &mut [String], ch: char) {
    if let Some(last) = paragraphs.last_mut() {
        last.push(ch);
    }
}

/// 单行文字只识别 `%%` 控制码，其余字符原样保留。
pub fn decode_special_codes(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' || chars.peek() != Some(&'%') {
            decoded.push(ch);
            continue;
        }
        chars.next();
        match chars.next() {
            Some('c' | 'C') => decoded.push('\u{2300}'),
            Some('d' | 'D') => decoded.push('\u{00b0}'),
            Some('p' | 'P') => decoded.push('\u{00b1}'),
            Some('%') => decoded.push('%'),
            // 下划线、上划线开关
            Some('u' | 'U' | 'o' | 'O') => {}
            Some(other) => {
                decoded.push_str("%%");
                decoded.push(other);
            }
            None => decoded.push_str("%%"),
        }
    }
    decoded
}

/// 按字符数贪心折行；超长单词独占一行。
pub fn wrap_words(paragraph: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return vec![paragraph.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    lines.push(current);
    lines
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub anchor: Point,
    pub content: String,
    /// DXF 单位。
    pub height: f64,
    pub width_factor: f64,
    /// 度，DXF 逆时针约定。
    pub rotation: f64,
    /// MTEXT 参考宽度（组码 41），DXF 单位。
    pub reference_width: Option<f64>,
    pub multiline: bool,
    pub alignment: TextAnchor,
    pub font_family: Option<String>,
    pub style: EntityStyle,
}

impl Text {
    pub fn single_line(anchor: Point, content: impl Into<String>, height: f64) -> Self {
        Self {
            anchor,
            content: content.into(),
            height,
            width_factor: 1.0,
            rotation: 0.0,
            reference_width: None,
            multiline: false,
            alignment: TextAnchor::Start,
            font_family: None,
            style: EntityStyle::default(),
        }
    }

    pub fn multi_line(anchor: Point, content: impl Into<String>, height: f64) -> Self {
        Self {
            multiline: true,
            ..Self::single_line(anchor, content, height)
        }
    }

    pub fn appearance(&self) -> TextAppearance {
        TextAppearance {
            height: self.height,
            font_family: self.font_family.clone(),
            stroke: false,
        }
    }

    /// 一行可容纳的字符数；没有参考宽度时不折行。
    pub fn chars_per_line(&self, glyph_width_ratio: f64) -> Option<usize> {
        let width = self.reference_width.filter(|w| *w > 0.0)?;
        let advance = self.height * self.width_factor.max(f64::EPSILON) * glyph_width_ratio;
        if advance <= 0.0 {
            return None;
        }
        Some(((width / advance).floor() as usize).max(1))
    }

    /// 最终输出的各行文字。
    pub fn lines(&self, glyph_width_ratio: f64) -> Vec<String> {
        if !self.multiline {
            return vec![self.content.clone()];
        }
        let max_chars = self.chars_per_line(glyph_width_ratio);
        mtext_paragraphs(&self.content)
            .iter()
            .flat_map(|paragraph| match max_chars {
                Some(max) => wrap_words(paragraph, max),
                None => vec![paragraph.clone()],
            })
            .collect()
    }
}

impl HasStyle for Text {
    fn style(&self) -> &EntityStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut EntityStyle {
        &mut self.style
    }
}

impl Renderable for Text {
    fn tag(&self) -> &'static str {
        "text"
    }

    fn write_svg(&self, ctx: &ConversionContext, out: &mut String) {
        let precision = ctx.precision();
        let rotation = format::trim(-self.rotation, precision);
        let transform = (rotation != 0.0).then(|| {
            format!(
                "rotate({} {})",
                format::fmt_raw(rotation),
                self.anchor.format(PointFormat::Raw, precision)
            )
        });
        let alignment = (self.alignment != TextAnchor::Start).then_some(self.alignment.as_str());
        let open = TagBuilder::new("text")
            .raw(&self.anchor.format(PointFormat::Anchor, precision))
            .attr_opt("text-anchor", alignment)
            .attr_opt("transform", transform)
            .attr_opt("style", style::text_style(&self.style, &self.appearance(), ctx))
            .open();
        out.push_str(&open);

        let x = ctx.fmt(self.anchor.x());
        let line_height = ctx.scale_length(self.height) * LINE_SPACING;
        for (index, line) in self.lines(ctx.settings.glyph_width_ratio).iter().enumerate() {
            let dy = match (index, self.multiline) {
                (0, true) => ctx.scale_length(self.height),
                (0, false) => 0.0,
                _ => line_height,
            };
            out.push_str(&format!(
                "<tspan x=\"{x}\" dy=\"{}\">{}</tspan>",
                ctx.fmt(dy),
                format::escape_xml(line)
            ));
        }
        out.push_str("</text>");
    }
}
