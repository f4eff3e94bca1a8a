use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dxfsvg_core::{ConversionSettings, DrawingSpace, Limits};
use serde::Deserialize;
use thiserror::Error;

/// 指向配置文件的环境变量。
pub const CONFIG_ENV: &str = "DXFSVG_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `DXFSVG_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 转换参数。缺省字段取内置默认值。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub precision: usize,
    /// DXF 单位下的点重合容差。
    pub fuzz: f64,
    /// 每 DXF 单位对应的 SVG 单位。
    pub unit_scale: f64,
    pub points_per_pixel: f64,
    pub inline_styles: bool,
    pub colour_by_layer: bool,
    pub default_font: String,
    pub glyph_width_ratio: f64,
    /// `[min_x, min_y, max_x, max_y]`，图纸头中没有范围时使用。
    pub default_limits: [f64; 4],
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let settings = ConversionSettings::default();
        Self {
            precision: 2,
            fuzz: 0.01,
            unit_scale: 1.0,
            points_per_pixel: 1.0,
            inline_styles: settings.inline_styles,
            colour_by_layer: settings.colour_by_layer,
            default_font: settings.default_font,
            glyph_width_ratio: settings.glyph_width_ratio,
            default_limits: [0.0, 0.0, 420.0, 297.0],
        }
    }
}

impl ConversionConfig {
    pub fn settings(&self) -> ConversionSettings {
        ConversionSettings {
            inline_styles: self.inline_styles,
            colour_by_layer: self.colour_by_layer,
            default_font: self.default_font.clone(),
            glyph_width_ratio: self.glyph_width_ratio,
        }
    }

    pub fn limits(&self) -> Limits {
        let [min_x, min_y, max_x, max_y] = self.default_limits;
        Limits::new(min_x, min_y, max_x, max_y)
    }

    /// 以默认范围初始化的坐标空间；读取图纸头后再更新范围。
    pub fn drawing_space(&self) -> DrawingSpace {
        let mut space = DrawingSpace::new(self.unit_scale, self.precision, self.fuzz);
        space.set_points_per_pixel(self.points_per_pixel);
        space.set_limits(self.limits());
        space
    }
}

impl From<&ConversionConfig> for ConversionSettings {
    fn from(config: &ConversionConfig) -> Self {
        config.settings()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfsvg_core::context::SpaceConverter;
    use std::io::Write;

    #[test]
    fn defaults_match_core_settings() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.conversion.precision, 2);
        assert_eq!(cfg.conversion.settings(), ConversionSettings::default());
        let space = cfg.conversion.drawing_space();
        assert_eq!(space.limits(), Limits::new(0.0, 0.0, 420.0, 297.0));
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [conversion]
            precision = 3
            unit_scale = 2.0
            inline_styles = true
            default_font = "DejaVu Sans"
            default_limits = [0.0, 0.0, 100.0, 50.0]
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.conversion.precision, 3);
        assert!(cfg.conversion.inline_styles);
        assert!(!cfg.conversion.colour_by_layer);
        assert_eq!(cfg.conversion.fuzz, 0.01);
        assert_eq!(cfg.conversion.settings().default_font, "DejaVu Sans");

        let space = cfg.conversion.drawing_space();
        assert_eq!(space.unit_scale(), 2.0);
        assert_eq!(space.precision(), 3);
        assert_eq!(space.canvas_size(), (200.0, 100.0));
    }

    #[test]
    fn parse_error_carries_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[conversion]\nprecision = \"two\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
