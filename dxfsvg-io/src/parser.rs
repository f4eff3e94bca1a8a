//! 段级解析：HEADER、TABLES、BLOCKS、ENTITIES。

use std::collections::HashMap;
use std::path::Path;

use dxfsvg_core::collection::{Collection, EntityDeclaration, Group};
use dxfsvg_core::style::{self, LayerStyle};
use dxfsvg_core::{ConversionContext, Limits, SpaceConverter, SvgElement};
use glam::DVec2;
use tracing::{debug, warn};

use crate::DxfError;
use crate::drawing::Drawing;
use crate::reader::{DxfReader, parse_f64, parse_i16, parse_i32};

pub(crate) struct DxfParser<'a> {
    pub(crate) reader: DxfReader<'a>,
    pub(crate) drawing: Drawing,
    /// 文字样式名（大写） → 字体族。
    pub(crate) text_styles: HashMap<String, String>,
}

/// 图纸头中的范围变量。
#[derive(Debug, Default)]
struct HeaderExtents {
    ext_min: [Option<f64>; 2],
    ext_max: [Option<f64>; 2],
    lim_min: [Option<f64>; 2],
    lim_max: [Option<f64>; 2],
}

impl HeaderExtents {
    fn slot(&mut self, variable: &str, code: i32) -> Option<&mut Option<f64>> {
        let axis = match code {
            10 => 0,
            20 => 1,
            _ => return None,
        };
        let pair = match variable {
            "$EXTMIN" => &mut self.ext_min,
            "$EXTMAX" => &mut self.ext_max,
            "$LIMMIN" => &mut self.lim_min,
            "$LIMMAX" => &mut self.lim_max,
            _ => return None,
        };
        Some(&mut pair[axis])
    }

    fn pair(min: [Option<f64>; 2], max: [Option<f64>; 2]) -> Option<Limits> {
        let [Some(min_x), Some(min_y)] = min else {
            return None;
        };
        let [Some(max_x), Some(max_y)] = max else {
            return None;
        };
        // 空图纸的 EXTMIN/EXTMAX 为 ±1e20，且 min > max
        let usable = [min_x, min_y, max_x, max_y]
            .iter()
            .all(|value| value.is_finite() && value.abs() < 1e19)
            && min_x < max_x
            && min_y < max_y;
        usable.then(|| Limits::new(min_x, min_y, max_x, max_y))
    }

    /// 优先使用 EXTMIN/EXTMAX，其次 LIMMIN/LIMMAX。
    fn resolve(&self) -> Option<Limits> {
        Self::pair(self.ext_min, self.ext_max).or_else(|| Self::pair(self.lim_min, self.lim_max))
    }
}

/// 模型空间与图纸空间的布局块不输出。
fn is_layout_block(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("*MODEL_SPACE") || upper.starts_with("*PAPER_SPACE")
}

/// 实体引用了图层表中没有的图层时，以默认样式补充声明。
pub(crate) fn declare_layer(context: &mut ConversionContext, name: &str) {
    if context.layers.get(name).is_none() {
        warn!(layer = name, "图层未在图层表中声明，使用默认样式");
        context.layers.ensure(name);
    }
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str, context: ConversionContext) -> Self {
        Self {
            reader: DxfReader::new(source),
            drawing: Drawing::new(context),
            text_styles: HashMap::new(),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Drawing, DxfError> {
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(self.structure_error(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| self.structure_error("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(self.structure_error(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    debug!(section = name.trim(), "进入段");
                    match name.trim() {
                        "HEADER" => self.parse_header()?,
                        "TABLES" => self.parse_tables()?,
                        "BLOCKS" => self.parse_blocks()?,
                        "ENTITIES" => self.parse_entities()?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(self.structure_error(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(self.drawing)
    }

    fn structure_error(&self, message: impl Into<String>) -> DxfError {
        DxfError::syntax(self.reader.line_number(), message)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(self.structure_error("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_header(&mut self) -> Result<(), DxfError> {
        let mut variable = String::new();
        let mut extents = HeaderExtents::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((9, name)) => variable = name.trim().to_string(),
                Some((code, value)) => {
                    if let Some(slot) = extents.slot(&variable, code) {
                        // 范围变量损坏时留空，由后续的范围或默认范围接替
                        match parse_f64(&value, &variable) {
                            Ok(number) => *slot = Some(number),
                            Err(err) => warn!(
                                variable = %variable,
                                code,
                                error = %err,
                                "图纸头范围变量无效，忽略"
                            ),
                        }
                    }
                }
                None => return Err(self.structure_error("HEADER 段未找到 ENDSEC")),
            }
        }
        match extents.resolve() {
            Some(limits) => self.drawing.context.space.set_limits(limits),
            None => debug!(
                limits = ?self.drawing.context.space.limits(),
                "图纸头没有可用范围，使用默认范围"
            ),
        }
        Ok(())
    }

    fn parse_tables(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDSEC" => break,
                    "TABLE" => self.parse_table()?,
                    _ => self.reader.skip_entity_body()?,
                },
                Some(_) => {}
                None => return Err(self.structure_error("TABLES 段提前结束")),
            }
        }
        Ok(())
    }

    fn parse_table(&mut self) -> Result<(), DxfError> {
        let mut table = String::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => table = value.trim().to_ascii_uppercase(),
                Some(_) => {}
                None => return Err(self.structure_error("TABLE 提前结束")),
            }
        }

        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| self.structure_error(format!("{table} 表未找到 ENDTAB")))?;
            if code != 0 {
                continue;
            }
            let entry = value.trim();
            let result = match entry {
                "ENDTAB" => {
                    self.reader.skip_entity_body()?;
                    break;
                }
                "LAYER" if table == "LAYER" => self.parse_layer_entry(),
                "LTYPE" if table == "LTYPE" => self.parse_line_type_entry(),
                "STYLE" if table == "STYLE" => self.parse_text_style_entry(),
                _ => self.reader.skip_entity_body(),
            };
            match result {
                Ok(()) => {}
                Err(err @ DxfError::Syntax { .. }) => return Err(err),
                Err(err) => {
                    warn!(table = %table, error = %err, "表项无效，已跳过");
                    self.reader.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_layer_entry(&mut self) -> Result<(), DxfError> {
        let mut name = None;
        let mut colour = None;
        let mut line_type = None;
        let mut flags: i16 = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    62 => colour = Some(parse_i32(&value, "LAYER 颜色号")?),
                    6 => line_type = Some(value.trim().to_string()),
                    70 => flags = parse_i16(&value, "LAYER 标志")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LAYER 表项未正确结束")),
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("LAYER 缺少名称（组码 2）"))?;
        let mut layer = LayerStyle::new(name);
        if let Some(colour) = colour {
            layer.set_colour(colour);
        }
        if let Some(line_type) = line_type {
            layer.line_type = line_type;
        }
        // 冻结的图层不显示
        if flags & 0x01 != 0 {
            layer.visible = false;
        }
        debug!(
            layer = %layer.name,
            colour = layer.colour,
            visible = layer.visible,
            "读取图层"
        );
        self.drawing.context.layers.insert(layer);
        Ok(())
    }

    fn parse_line_type_entry(&mut self) -> Result<(), DxfError> {
        let mut name = None;
        let mut dashes = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => name = Some(value.trim().to_string()),
                Some((49, value)) => dashes.push(parse_f64(&value, "LTYPE 虚线段长度")?),
                Some(_) => {}
                None => return Err(DxfError::invalid("LTYPE 表项未正确结束")),
            }
        }
        let name = name.ok_or_else(|| DxfError::invalid("LTYPE 缺少名称（组码 2）"))?;
        debug!(line_type = %name, elements = dashes.len(), "读取线型");
        self.drawing.context.line_types.insert(name, dashes);
        Ok(())
    }

    fn parse_text_style_entry(&mut self) -> Result<(), DxfError> {
        let mut name = None;
        let mut font_file = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => name = Some(value.trim().to_string()),
                Some((3, value)) => font_file = Some(value.trim().to_string()),
                Some(_) => {}
                None => return Err(DxfError::invalid("STYLE 表项未正确结束")),
            }
        }
        let family = font_file
            .as_deref()
            .and_then(|file| Path::new(file).file_stem())
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|family| !family.is_empty());
        if let (Some(name), Some(family)) = (name, family) {
            debug!(style = %name, font = %family, "读取文字样式");
            self.text_styles.insert(name.to_ascii_uppercase(), family);
        }
        Ok(())
    }

    fn parse_blocks(&mut self) -> Result<(), DxfError> {
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| self.structure_error("BLOCKS 段提前结束"))?;
            if code != 0 {
                return Err(self.structure_error(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }
            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => self.parse_block_definition()?,
                _ => self.reader.skip_entity_body()?,
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<(), DxfError> {
        let mut name: Option<String> = None;
        let mut base_x = 0.0;
        let mut base_y = 0.0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => name = Some(value.trim().to_string()),
                Some((10, value)) => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                Some((20, value)) => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                Some(_) => {}
                None => return Err(self.structure_error("BLOCK 定义未找到 ENDBLK 终止标记")),
            }
        }
        let name = name.ok_or_else(|| self.structure_error("BLOCK 缺少名称（组码 2）"))?;
        let collect = !is_layout_block(&name);

        // 块内实体以基点为原点
        let local = self.drawing.context.space.block_local(base_x, base_y);
        let saved = std::mem::replace(&mut self.drawing.context.space, local);
        let body = self.parse_block_body(collect);
        self.drawing.context.space = saved;
        let groups = body?;

        if !collect {
            debug!(block = %name, "跳过布局块");
            return Ok(());
        }
        let mut declaration = EntityDeclaration::new(name, DVec2::new(base_x, base_y));
        for group in groups {
            declaration.add(group.into());
        }
        debug!(block = declaration.name(), groups = declaration.len(), "读取块定义");
        self.drawing.add_declaration(declaration);
        Ok(())
    }

    /// 块内元素按图层分组，分组带图层类名以便 `<use>` 实例继承图层样式。
    fn parse_block_body(&mut self, collect: bool) -> Result<Vec<Group>, DxfError> {
        let mut groups: Vec<Group> = Vec::new();
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| self.structure_error("BLOCK 定义未找到 ENDBLK 终止标记"))?;
            if code != 0 {
                continue;
            }
            match value.trim() {
                "ENDBLK" => {
                    self.reader.skip_entity_body()?;
                    break;
                }
                kind if collect => {
                    let Some(element) = self.convert_entity(kind)? else {
                        continue;
                    };
                    let class = style::layer_class(element.layer().unwrap_or("0"));
                    match groups
                        .iter_mut()
                        .find(|group| group.class.as_deref() == Some(class.as_str()))
                    {
                        Some(group) => group.add(element),
                        None => {
                            let mut group = Group::new(None);
                            group.class = Some(class);
                            group.add(element);
                            groups.push(group);
                        }
                    }
                }
                _ => self.reader.skip_entity_body()?,
            }
        }
        Ok(groups)
    }

    fn parse_entities(&mut self) -> Result<(), DxfError> {
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| self.structure_error("ENTITIES 段提前结束"))?;
            if code != 0 {
                return Err(self.structure_error(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }
            match value.trim() {
                "ENDSEC" => break,
                kind => {
                    if let Some(element) = self.convert_entity(kind)? {
                        self.drawing.add_element(element);
                    }
                }
            }
        }
        Ok(())
    }

    /// 解析单个实体。非致命错误只跳过该实体。
    pub(crate) fn convert_entity(&mut self, kind: &str) -> Result<Option<SvgElement>, DxfError> {
        match self.parse_entity(kind) {
            Ok(Some(element)) => {
                if let Some(layer) = element.layer() {
                    declare_layer(&mut self.drawing.context, layer);
                }
                Ok(Some(element))
            }
            Ok(None) => Ok(None),
            Err(err @ DxfError::Syntax { .. }) => Err(err),
            Err(DxfError::Unsupported { feature }) => {
                debug!(entity = kind, %feature, "跳过不支持的实体");
                self.reader.skip_entity_body()?;
                self.drawing.record_skipped();
                Ok(None)
            }
            Err(err) => {
                warn!(
                    entity = kind,
                    line = self.reader.line_number(),
                    error = %err,
                    "实体无效，已跳过"
                );
                self.reader.skip_entity_body()?;
                self.drawing.record_skipped();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extents(min: [f64; 2], max: [f64; 2]) -> ([Option<f64>; 2], [Option<f64>; 2]) {
        (min.map(Some), max.map(Some))
    }

    #[test]
    fn extents_preferred_over_limits() {
        let mut header = HeaderExtents::default();
        (header.ext_min, header.ext_max) = extents([1.0, 2.0], [11.0, 12.0]);
        (header.lim_min, header.lim_max) = extents([0.0, 0.0], [420.0, 297.0]);
        assert_eq!(header.resolve(), Some(Limits::new(1.0, 2.0, 11.0, 12.0)));
    }

    #[test]
    fn empty_drawing_extents_fall_back_to_limits() {
        let mut header = HeaderExtents::default();
        (header.ext_min, header.ext_max) = extents([1e20, 1e20], [-1e20, -1e20]);
        (header.lim_min, header.lim_max) = extents([0.0, 0.0], [12.0, 9.0]);
        assert_eq!(header.resolve(), Some(Limits::new(0.0, 0.0, 12.0, 9.0)));

        let header = HeaderExtents::default();
        assert_eq!(header.resolve(), None);
    }

    #[test]
    fn malformed_header_extent_falls_back() {
        let source = "0\nSECTION\n2\nHEADER\n9\n$EXTMIN\n10\nabc\n20\n0\n9\n$EXTMAX\n10\n50\n20\n50\n\
                      9\n$LIMMIN\n10\n0\n20\n0\n9\n$LIMMAX\n10\n30\n20\n20\n0\nENDSEC\n0\nEOF\n";
        let drawing = DxfParser::new(source, ConversionContext::default()).parse().unwrap();
        assert_eq!(drawing.context.space.canvas_size(), (30.0, 20.0));

        let source = "0\nSECTION\n2\nHEADER\n9\n$LIMMIN\n10\n0\n20\n?\n0\nENDSEC\n0\nEOF\n";
        let default_size = ConversionContext::default().space.canvas_size();
        let drawing = DxfParser::new(source, ConversionContext::default()).parse().unwrap();
        assert_eq!(drawing.context.space.canvas_size(), default_size);
    }

    #[test]
    fn layout_blocks_are_recognised() {
        assert!(is_layout_block("*Model_Space"));
        assert!(is_layout_block("*PAPER_SPACE0"));
        assert!(!is_layout_block("*U12"));
        assert!(!is_layout_block("DOOR"));
    }
}
