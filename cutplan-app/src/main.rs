use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cutplan_config::{AppConfig, ConfigError};
use cutplan_engine::grid::GridVariant;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "cutplan", version, about = "将标签图纸排版为切割图并上传")]
struct Cli {
    /// 配置文件路径，缺省时自动发现
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 生成切割图，每页输出一行 `名称<TAB>地址`
    Compose(ComposeArgs),
    /// 列出源目录下可用的图纸
    List,
}

#[derive(Debug, Args)]
struct ComposeArgs {
    /// 机台规格：18 或 32
    #[arg(long)]
    grid: Option<GridVariant>,
    /// 输出文件基名
    #[arg(long)]
    name: Option<String>,
    /// 跳过预览图
    #[arg(long)]
    no_preview: bool,
    /// 按顺序排列的源图纸名
    #[arg(required = true)]
    names: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, fallback) = match load_configuration(cli.config.clone()) {
        Ok(loaded) => loaded,
        Err(err) => {
            init_logging(&AppConfig::default());
            error!(error = %err, "加载配置失败");
            eprintln!("错误：{err:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);
    if let Some(err) = fallback {
        match &err {
            ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
            }
            ConfigError::Context { .. } => {
                warn!(error = %err, "加载默认配置失败，使用内建默认值");
            }
        }
    }
    info!("启动 cutplan");

    let outcome = match cli.command {
        Command::Compose(args) => commands::compose(&config, args),
        Command::List => commands::list(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "执行失败");
            eprintln!("错误：{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// 显式指定的配置必须可用；自动发现失败时退回内建默认值，并把原因交给调用方记录。
fn load_configuration(
    override_path: Option<PathBuf>,
) -> anyhow::Result<(AppConfig, Option<ConfigError>)> {
    match override_path {
        Some(path) => {
            let config = AppConfig::from_file(&path)
                .with_context(|| format!("无法加载配置文件 {}", path.display()))?;
            Ok((config, None))
        }
        None => match AppConfig::discover() {
            Ok(config) => Ok((config, None)),
            Err(err) => Ok((AppConfig::default(), Some(err))),
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // 标准输出只留给结果
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
