use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dxfsvg_config::{AppConfig, ConfigError};
use dxfsvg_core::ConversionContext;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "dxfsvg")]
#[command(about = "将 DXF 图纸转换为 SVG", long_about = None)]
struct Cli {
    /// 输入的 DXF 文件
    input: PathBuf,
    /// 输出的 SVG 文件（缺省为输入文件同名 .svg）
    output: Option<PathBuf>,
    /// 指定配置文件，覆盖自动发现
    #[arg(long)]
    config: Option<PathBuf>,
    /// 输出数值保留的小数位数
    #[arg(long)]
    precision: Option<usize>,
    /// 每个元素内联完整样式，不输出共享样式表
    #[arg(long)]
    inline_styles: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(cli.config.clone());
    init_logging(&config);
    apply_overrides(&mut config, &cli);

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));
    info!(input = %cli.input.display(), output = %output.display(), "开始转换");

    let conversion = &config.conversion;
    let template = ConversionContext::new(conversion.drawing_space(), conversion.settings());
    let summary = dxfsvg_io::convert_file(&cli.input, &output, template).with_context(|| {
        format!(
            "转换 {} 到 {} 失败",
            cli.input.display(),
            output.display()
        )
    })?;

    info!(
        entities = summary.entities,
        skipped = summary.skipped,
        layers = summary.layers,
        blocks = summary.blocks,
        patterns = summary.patterns,
        "转换摘要"
    );
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(precision) = cli.precision {
        config.conversion.precision = precision;
    }
    if cli.inline_styles {
        config.conversion.inline_styles = true;
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("svg")
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn output_defaults_to_svg_beside_input() {
        assert_eq!(
            default_output_path(Path::new("plans/floor.dxf")),
            PathBuf::from("plans/floor.svg")
        );
    }

    #[test]
    fn command_line_overrides_configuration() {
        let cli = Cli::parse_from(["dxfsvg", "in.dxf", "--precision", "4", "--inline-styles"]);
        assert!(cli.output.is_none());
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.conversion.precision, 4);
        assert!(config.conversion.inline_styles);
    }

    #[test]
    fn explicit_config_falls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[conversion\nprecision = ").unwrap();
        let config = load_configuration(Some(path));
        assert_eq!(config.conversion.precision, 2);

        let path = dir.path().join("custom.toml");
        fs::write(&path, "[conversion]\nprecision = 3\n").unwrap();
        let config = load_configuration(Some(path));
        assert_eq!(config.conversion.precision, 3);
    }
}
