use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use toa_agent::shutdown::SignalListener;
use toa_agent::Agent;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// TOA Injector Agent
#[derive(Debug, Parser)]
#[command(name = "toa-agent", version, about)]
struct Cli {
    /// 配置文件路径（YAML 或 JSON）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件中的 log_level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let agent = Agent::new(cli.config.as_deref())?;

    // RUST_LOG 优先于命令行和配置文件
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| agent.config().log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!("TOA Injector Agent 启动 (v{})", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    SignalListener::install()
        .context("无法注册信号处理")?
        .spawn(shutdown.clone());

    agent.run(shutdown).await
}
