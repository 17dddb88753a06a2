use std::sync::Arc;

use anyhow::Context;

use pricefeed_api::app::{build_app, services};
use pricefeed_infra::config::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pricefeed_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(services::build_services(&config).await?);
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        workers = config.ingest.workers,
        queue_capacity = config.ingest.queue_capacity,
        header = %config.ingest.header,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}
