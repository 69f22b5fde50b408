use anyhow::Context;
use intellisearch::Application;
use intellisearch::config::loader::{ConfigLoader, config_exists};
use intellisearch::observability::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;

    // guard 需要活到进程结束，否则文件日志不会刷盘
    let _log_guard = init_tracing(&config.logging)?;

    info!(
        "Starting {} ({}, v{})...",
        config.app_name,
        config.environment,
        env!("CARGO_PKG_VERSION")
    );
    if !config_exists() {
        info!("config.toml not found, using defaults and environment overrides");
    }

    let app = Application::from_config(&config)?;
    if let Err(e) = app.initialize().await {
        // 后端暂时不可用时照常启动，检索请求会走降级路径
        warn!("Collection initialization failed: {}", e);
    }

    let router = app.router();
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
