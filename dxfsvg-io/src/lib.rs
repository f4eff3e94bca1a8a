//! DXF 读取与 SVG 输出。
//!
//! 解析时直接把实体转换为核心库的 SVG 元素；单个实体出错只会被跳过并记录，
//! 只有文件级错误（无法读取、组码配对损坏、段结构错误、无法写出）才会中止转换。

mod drawing;
mod entities;
mod parser;
mod reader;
mod svg_writer;

use std::fs;
use std::path::{Path, PathBuf};

use dxfsvg_core::ConversionContext;
use dxfsvg_core::errors::{GeometryError, HatchError};
use thiserror::Error;
use tracing::{debug, info};

pub use drawing::{ConversionSummary, Drawing};
pub use svg_writer::SvgDocument;

use parser::DxfParser;

/// 文件级错误：读写失败，或解析中止于无法恢复的 DXF 错误。
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed DXF: {0}")]
    Dxf(#[from] DxfError),
}

/// 解析过程中的错误。`Syntax` 与段结构错误是致命的，其余只影响单个实体。
#[derive(Debug, Error)]
pub enum DxfError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("unsupported: {feature}")]
    Unsupported { feature: String },
    #[error("invalid entity data: {message}")]
    Invalid { message: String },
    #[error("hatch: {0}")]
    Hatch(#[from] HatchError),
    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),
}

impl DxfError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

pub trait DrawingSaver {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError>;
}

/// DXF 读取入口。每次读取都从模板上下文（配置好的坐标空间与输出开关）开始。
pub struct DxfFacade {
    template: ConversionContext,
}

impl DxfFacade {
    pub fn new(template: ConversionContext) -> Self {
        Self { template }
    }

    /// 从内存中的 DXF 文本解析。
    pub fn parse_str(&self, source: &str) -> Result<Drawing, IoError> {
        let parser = DxfParser::new(source, self.template.clone());
        Ok(parser.parse()?)
    }
}

impl Default for DxfFacade {
    fn default() -> Self {
        Self::new(ConversionContext::default())
    }
}

impl DrawingLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // 旧版 DXF 常用本地代码页，非 UTF-8 字节按替换字符处理
        let data = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %path.display(), "DXF 不是 UTF-8 编码，按有损方式解码");
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        self.parse_str(&data)
    }
}

/// SVG 写出入口。
#[derive(Debug, Default, Clone, Copy)]
pub struct SvgFacade;

impl DrawingSaver for SvgFacade {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError> {
        let svg = SvgDocument::new(drawing).render();
        fs::write(path, svg).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// 读取 DXF、写出 SVG，并返回转换摘要。
pub fn convert_file(
    input: &Path,
    output: &Path,
    template: ConversionContext,
) -> Result<ConversionSummary, IoError> {
    let drawing = DxfFacade::new(template).load(input)?;
    SvgFacade.save(&drawing, output)?;
    let summary = drawing.summary();
    info!(
        input = %input.display(),
        output = %output.display(),
        entities = summary.entities,
        skipped = summary.skipped,
        "转换完成"
    );
    Ok(summary)
}
