//! Pipeline Coordinator: owns `fetch`, wires the stages, and waits for all of
//! them before reporting.

use core::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, error, info, instrument};

use super::classifier::{WorkerContext, run_classifier_pool};
use super::error::{ErrorSlot, IngestError};
use super::sinks::{SinkContext, run_create_sink, run_update_sink};
use super::source::run_source;
use super::stats::{IngestCounters, IngestSummary};
use crate::config::{ConfigError, IngestConfig};
use crate::store::ProductStore;

/// Lifecycle of one run. A failed run is never resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        })
    }
}

/// Reconciles tabular price feeds into a [`ProductStore`].
///
/// Cheap to clone; every run gets its own queues, error slot and
/// cancellation token, so concurrent runs do not interfere beyond the store.
#[derive(Clone)]
pub struct IngestCoordinator {
    store: Arc<dyn ProductStore>,
    http: reqwest::Client,
    config: IngestConfig,
}

impl fmt::Debug for IngestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IngestCoordinator {
    pub fn new(store: Arc<dyn ProductStore>, config: IngestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http_client",
                reason: e.to_string(),
            })?;
        Ok(Self {
            store,
            http,
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Download the feed at `url` and reconcile it.
    ///
    /// Returns the first fatal error reported by any stage. Rows handled
    /// before that error may already be persisted. The connect phase, the
    /// response headers and every body read are each bounded by
    /// `request_timeout`; a stalled body surfaces as a `Read` error.
    #[instrument(name = "fetch", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<IngestSummary, IngestError> {
        let body = match self.open(url).await {
            Ok(body) => body,
            Err(e) => {
                error!(state = %RunState::Failed, error = %e, "feed could not be opened");
                return Err(e);
            }
        };
        self.ingest(body).await
    }

    async fn open(&self, url: &str) -> Result<impl AsyncRead + Unpin + Send + 'static, IngestError> {
        let request = self.http.get(url).send();
        let response = tokio::time::timeout(self.config.request_timeout(), request)
            .await
            .map_err(|_| {
                IngestError::Fetch(format!(
                    "no response within {}s",
                    self.config.request_timeout_secs
                ))
            })?
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IngestError::Fetch(e.to_string()))?;

        let chunks = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));
        Ok(StreamReader::new(Box::pin(chunks)))
    }

    /// Reconcile an already-open feed body.
    ///
    /// Dropping the returned future cancels the run and aborts every stage,
    /// so no row is read or written after the caller goes away.
    #[instrument(
        name = "ingest",
        skip_all,
        fields(run_id = %uuid::Uuid::now_v7(), workers = self.config.workers)
    )]
    pub async fn ingest<R>(&self, body: R) -> Result<IngestSummary, IngestError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let slot = Arc::new(ErrorSlot::new(CancellationToken::new()));
        let counters = Arc::new(IngestCounters::default());
        let capacity = self.config.queue_capacity;

        let (intake_tx, intake_rx) = async_channel::bounded(capacity);
        let (create_tx, create_rx) = mpsc::channel(capacity);
        let (update_tx, update_rx) = mpsc::channel(capacity);

        let sink_ctx = SinkContext {
            store: Arc::clone(&self.store),
            max_price_swaps: self.config.max_price_swaps,
            slot: Arc::clone(&slot),
            counters: Arc::clone(&counters),
        };
        let worker_ctx = WorkerContext {
            store: Arc::clone(&self.store),
            creates: create_tx,
            updates: update_tx,
            slot: Arc::clone(&slot),
            counters: Arc::clone(&counters),
        };

        info!(state = %RunState::Running, "ingest running");

        let stages = [
            (
                "source",
                tokio::spawn(
                    run_source(
                        body,
                        self.config.header,
                        intake_tx,
                        Arc::clone(&slot),
                        Arc::clone(&counters),
                    )
                    .in_current_span(),
                ),
            ),
            (
                "classifier",
                tokio::spawn(
                    run_classifier_pool(self.config.workers, intake_rx, worker_ctx).in_current_span(),
                ),
            ),
            (
                "create",
                tokio::spawn(run_create_sink(create_rx, sink_ctx.clone()).in_current_span()),
            ),
            (
                "update",
                tokio::spawn(run_update_sink(update_rx, sink_ctx).in_current_span()),
            ),
        ];

        let _guard = RunGuard {
            _cancel: slot.token().clone().drop_guard(),
            stages: stages.iter().map(|(_, handle)| handle.abort_handle()).collect(),
        };

        for (stage, handle) in stages {
            if let Err(e) = handle.await {
                slot.report(IngestError::Stage {
                    stage,
                    reason: e.to_string(),
                });
            }
        }

        match slot.first() {
            None => {
                let summary = counters.snapshot();
                info!(
                    state = %RunState::Succeeded,
                    rows = summary.rows,
                    created = summary.created,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    "ingest succeeded"
                );
                Ok(summary)
            }
            Some(e) => {
                error!(state = %RunState::Failed, kind = e.kind(), error = %e, "ingest failed");
                Err(e)
            }
        }
    }
}

/// Tears a run down if its future is dropped before every stage has joined.
struct RunGuard {
    _cancel: DropGuard,
    stages: Vec<AbortHandle>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        for stage in &self.stages {
            stage.abort();
        }
    }
}
