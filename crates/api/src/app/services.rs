//! Service wiring: which store backs the API, and the coordinator over it.

use std::sync::Arc;

use anyhow::Context;

use pricefeed_infra::config::{ConfigError, IngestConfig, ServiceConfig};
use pricefeed_infra::ingest::IngestCoordinator;
use pricefeed_infra::store::{InMemoryProductStore, PostgresProductStore, ProductStore};

/// Shared handler state.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn ProductStore>,
    pub ingest: IngestCoordinator,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("ingest", &self.ingest)
            .finish_non_exhaustive()
    }
}

impl AppServices {
    pub fn new(store: Arc<dyn ProductStore>, config: IngestConfig) -> Result<Self, ConfigError> {
        let ingest = IngestCoordinator::new(Arc::clone(&store), config)?;
        Ok(Self { store, ingest })
    }

    /// Services over an empty in-memory store.
    pub fn in_memory(config: IngestConfig) -> Result<Self, ConfigError> {
        Self::new(Arc::new(InMemoryProductStore::new()), config)
    }
}

/// Pick the store from `config`: Postgres when `DATABASE_URL` is set,
/// otherwise an in-memory store.
pub async fn build_services(config: &ServiceConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn ProductStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresProductStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            tracing::info!("using postgres product store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory product store");
            Arc::new(InMemoryProductStore::new())
        }
    };

    AppServices::new(store, config.ingest.clone()).context("invalid ingest configuration")
}
