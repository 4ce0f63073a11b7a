//! # 图片中继服务 — 应用入口
//!
//! 本文件仅负责初始化与服务启动。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::sync::Arc;

use image_relay::error::AppError;
use image_relay::proxy::{router, ProxyConfig, ProxyHandler};
use image_relay::settings::ServerSettings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        log::error!("服务退出: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let settings = ServerSettings::load()?;
    log::info!(
        "🌐 启动图片中继服务 - bind={} domains={}",
        settings.bind_addr,
        settings.allowed_domains.len()
    );

    let handler = ProxyHandler::new(settings.allowlist(), ProxyConfig::default())?;
    let app = router(Arc::new(handler));

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("监听 {} 失败: {e}", settings.bind_addr)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;

    log::info!("✅ 服务已优雅退出");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("⚠️ 监听退出信号失败: {err}");
        return;
    }
    log::info!("🧩 收到退出信号，停止接收新请求");
}
