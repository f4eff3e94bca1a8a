//! 组码/值成对读取。

use std::convert::TryFrom;

use crate::DxfError;

/// 逐对读取 `组码\n值\n`，支持回退一对。
pub(crate) struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    pub(crate) fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        // 容忍文件末尾的空行
        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::syntax(
                    self.line_number,
                    "文件提前结束，缺少与组码对应的值行",
                ));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::syntax(
                self.line_number - 1,
                format!("组码 \"{}\" 无法解析为整数", code_line.trim()),
            )
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    /// 回退一对，下一次 [`next_pair`](Self::next_pair) 重新返回它。
    pub(crate) fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }

    /// 跳过实体剩余的组码，停在下一个 0 组码之前。
    pub(crate) fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.next_pair()? {
                Some((0, value)) => {
                    self.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

pub(crate) fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

pub(crate) fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

pub(crate) fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

/// 解析实数组码并填入空槽位；同一实体内重复出现视为数据错误。
pub(crate) fn fill_once(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if let Some(previous) = *slot {
        return Err(DxfError::invalid(format!(
            "{context} 重复出现（已有 {previous}，又读到 \"{raw}\"）"
        )));
    }
    parse_f64(raw, context).map(|value| *slot = Some(value))
}

/// 取出必需的坐标；缺失时报告组码。
pub(crate) fn require(slot: Option<f64>, context: &str) -> Result<f64, DxfError> {
    slot.ok_or_else(|| DxfError::invalid(format!("缺少{context}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pairs_and_tolerates_crlf() {
        let mut reader = DxfReader::new("  0\r\nSECTION\r\n  2\r\nHEADER\r\n");
        assert_eq!(reader.next_pair().unwrap(), Some((0, "SECTION".to_string())));
        assert_eq!(reader.next_pair().unwrap(), Some((2, "HEADER".to_string())));
        assert_eq!(reader.next_pair().unwrap(), None);
        assert_eq!(reader.line_number(), 4);
    }

    #[test]
    fn put_back_returns_same_pair() {
        let mut reader = DxfReader::new("0\nLINE\n8\nWALLS\n");
        let pair = reader.next_pair().unwrap().unwrap();
        reader.put_back(pair.clone());
        assert_eq!(reader.next_pair().unwrap(), Some(pair));
    }

    #[test]
    fn dangling_code_is_syntax_error() {
        let mut reader = DxfReader::new("0\nSECTION\n2\n");
        reader.next_pair().unwrap();
        let err = reader.next_pair().unwrap_err();
        assert!(matches!(err, DxfError::Syntax { line: 3, .. }));
    }

    #[test]
    fn non_numeric_code_is_syntax_error() {
        let mut reader = DxfReader::new("x\nSECTION\n");
        assert!(matches!(reader.next_pair(), Err(DxfError::Syntax { line: 1, .. })));
    }

    #[test]
    fn number_helpers() {
        assert_eq!(parse_f64(" 1.5 ", "X").unwrap(), 1.5);
        assert!(parse_f64("abc", "X").is_err());
        assert_eq!(parse_i16("  70", "flag").unwrap(), 70);
        assert!(parse_i16("70000", "flag").is_err());

        let mut slot = None;
        assert_eq!(require(slot, "X").unwrap_err().to_string(), "invalid entity data: 缺少X");
        fill_once(&mut slot, "2", "X").unwrap();
        assert!(fill_once(&mut slot, "3", "X").is_err());
        assert_eq!(slot, Some(2.0));
    }
}
