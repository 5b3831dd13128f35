use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use cadbridge_config::{AppConfig, ConfigError};
use cadbridge_core::interchange::CadData;
use cadbridge_engine::{MatchOptions, read_drawing, write_drawing};
use cadbridge_io::{DrawingLoader, DrawingSaver, DxfFacade};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// DXF 图纸与 JSON 交换数据互转。
#[derive(Debug, Parser)]
#[command(name = "cadbridge", version, about)]
struct Cli {
    /// 配置文件路径，缺省时按 CADBRIDGE_CONFIG 与 ./config/default.toml 查找
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 读取 DXF，输出带标注信息的 JSON
    Read {
        input: PathBuf,
        /// 输出文件，缺省写到标准输出
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// 线段缓冲区半宽，覆盖配置值
        #[arg(long)]
        tolerance: Option<f64>,
        /// 缩进输出
        #[arg(long)]
        pretty: bool,
    },
    /// 由 JSON 交换数据生成 DXF
    Write { input: PathBuf, output: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone());
    init_logging(&config);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "转换失败");
            eprintln!("错误：{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Read {
            input,
            output,
            tolerance,
            pretty,
        } => {
            let options = MatchOptions {
                tolerance: tolerance.unwrap_or(config.matching.tolerance),
                axis_epsilon: config.matching.axis_epsilon,
            };
            if !(options.tolerance.is_finite() && options.tolerance > 0.0) {
                bail!("容差必须为正数：{}", options.tolerance);
            }
            read_command(
                &input,
                output.as_deref(),
                &options,
                pretty || config.output.pretty,
            )
        }
        Command::Write { input, output } => write_command(&input, &output),
    }
}

fn read_command(
    input: &Path,
    output: Option<&Path>,
    options: &MatchOptions,
    pretty: bool,
) -> Result<()> {
    info!(input = %input.display(), "读取 DXF");
    let drawing = DxfFacade::new()
        .load(input)
        .with_context(|| format!("无法读取图纸 {}", input.display()))?;
    let data = read_drawing(&drawing, options);
    let json = data.to_json_string(pretty).context("无法序列化交换数据")?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("无法写入 {}", path.display()))?;
            info!(output = %path.display(), "JSON 已写出");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("无法写到标准输出")?;
        }
    }
    Ok(())
}

fn write_command(input: &Path, output: &Path) -> Result<()> {
    info!(input = %input.display(), "读取交换数据");
    let content =
        fs::read_to_string(input).with_context(|| format!("无法读取 {}", input.display()))?;
    let data = CadData::from_json_str(&content)
        .with_context(|| format!("{} 不是有效的交换数据", input.display()))?;
    let drawing = write_drawing(&data);
    DxfFacade::new()
        .save(&drawing, output)
        .with_context(|| format!("无法写出图纸 {}", output.display()))?;
    info!(output = %output.display(), entities = drawing.entity_count(), "DXF 已写出");
    Ok(())
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
                    ConfigError::Io { path, .. }
                    | ConfigError::Parse { path, .. }
                    | ConfigError::Invalid { path, .. } => {
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

/// 日志写到标准错误，标准输出只留给 JSON。
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(config.logging.level.clone())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
