//! 数值裁剪与 SVG 文本输出的公共工具。
//!
//! 所有几何数值都必须先按配置精度裁剪，再转换为字符串；`-0.0` 一律规范为 `0`，
//! 否则部分查看器会把负零端点的圆弧画错。

/// 将数值四舍五入到 `precision` 位小数，并消除负零。
pub fn trim(value: f64, precision: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision.min(15) as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// 先裁剪再格式化。
pub fn fmt_trimmed(value: f64, precision: usize) -> String {
    fmt_raw(trim(value, precision))
}

/// 格式化一个已经裁剪过的数值，不再做任何舍入。
pub fn fmt_raw(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value}")
}

/// 转义 XML 文本与属性值中的保留字符。
pub fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// 将图层名、块名等转换为合法的 XML id / CSS 类名。
pub fn css_ident(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        ident.insert(0, '_');
    }
    ident
}

/// 最小的开始标签构造器，保证属性顺序与插入顺序一致。
#[derive(Debug, Clone)]
pub struct TagBuilder {
    buffer: String,
}

impl TagBuilder {
    pub fn new(tag: &str) -> Self {
        let mut buffer = String::with_capacity(64);
        buffer.push('<');
        buffer.push_str(tag);
        Self { buffer }
    }

    /// 追加属性；值会被转义。
    pub fn attr(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.buffer.push(' ');
        self.buffer.push_str(name);
        self.buffer.push_str("=\"");
        self.buffer.push_str(&escape_xml(value.as_ref()));
        self.buffer.push('"');
        self
    }

    pub fn attr_opt(self, name: &str, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    /// 追加一段已经格式化好的原始属性文本，例如 `x1="1" y1="2"`。
    pub fn raw(mut self, fragment: &str) -> Self {
        if !fragment.is_empty() {
            self.buffer.push(' ');
            self.buffer.push_str(fragment);
        }
        self
    }

    pub fn self_closing(mut self) -> String {
        self.buffer.push_str("/>");
        self.buffer
    }

    pub fn open(mut self) -> String {
        self.buffer.push('>');
        self.buffer
    }
}
