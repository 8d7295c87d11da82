use anyhow::Context;
use clap::Parser;
use keyrelay::config::Config;
use keyrelay::server::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "keyrelay")]
#[command(about = "Local relay that keeps the upstream API key out of browser code", long_about = None)]
struct Args {
    /// 配置文件路径（可选，缺省时全部使用默认值）
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址，覆盖配置中的 host/port
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            Config::from_file(path).with_context(|| format!("failed to load config {}", path))?
        }
        None => Config::default(),
    };

    let addr: SocketAddr = match &args.bind {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("invalid --bind address {}", bind))?,
        None => config.server.socket_addr()?,
    };

    // 凭据只在启动时读取一次
    let state = Arc::new(AppState::from_env(config)?);

    server::start_server(state, addr).await?;

    Ok(())
}
