pub mod handlers;

use crate::config::{Config, Credential};
use crate::providers::build_http_client;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use reqwest::Client;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// 所有连接共享的只读状态
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    /// 启动时解析一次；缺失时每个 /generate 请求返回 500
    pub credential: Option<Credential>,
    pub client: Client,
}

impl AppState {
    pub fn new(config: Config, credential: Option<Credential>) -> Result<Self> {
        Ok(Self {
            config,
            credential,
            client: build_http_client()?,
        })
    }

    /// 从配置指定的环境变量读取凭据
    pub fn from_env(config: Config) -> Result<Self> {
        let credential = Credential::from_env(&config.upstream.api_key_env);
        if credential.is_none() {
            warn!(
                "{} is not set; every /generate request will fail until it is",
                config.upstream.api_key_env
            );
        }
        Self::new(config, credential)
    }
}

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("keyrelay listening on http://{}", listener.local_addr()?);

    serve(listener, state, shutdown_signal()).await?;

    info!("keyrelay stopped");
    Ok(())
}

/// 在已绑定的监听器上提供服务，直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        handlers::handle_request(req, state)
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!("connection error: {}", e);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("received Ctrl+C, shutting down"),
        _ = terminate => warn!("received SIGTERM, shutting down"),
    }
}
