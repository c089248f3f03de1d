use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use atelier_api::app::{AppState, build_app, serve};
use atelier_infra::{AppConfig, Backend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    atelier_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let backend = Backend::connect(&config).await.context("backend start-up failed")?;
    let _automation = backend.spawn_automation().context("automation worker failed to start")?;

    let app = build_app(AppState::new(backend, &config.jwt_secret), &config);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, storage = ?config.storage, "listening");

    serve(listener, app).await?;
    Ok(())
}
