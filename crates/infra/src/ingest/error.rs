use std::sync::OnceLock;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::store::StoreError;

/// Fatal ingest error. Any of these aborts the whole run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    /// A feed row could not be parsed.
    #[error("malformed feed row at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// The store failed while checking whether a product exists.
    #[error("lookup of '{name}' failed: {source}")]
    Lookup {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The store failed while creating or updating a product.
    #[error("{op} failed: {source}")]
    Persist {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    /// The feed could not be opened.
    #[error("failed to open feed: {0}")]
    Fetch(String),

    /// The feed body failed mid-read.
    #[error("failed to read feed at line {line}: {reason}")]
    Read { line: usize, reason: String },

    /// A pipeline task panicked or was aborted.
    #[error("{stage} stage stopped unexpectedly: {reason}")]
    Stage { stage: &'static str, reason: String },
}

impl IngestError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in logs and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Parse { .. } => "parse",
            IngestError::Lookup { .. } => "lookup",
            IngestError::Persist { .. } => "persist",
            IngestError::Fetch(_) => "fetch",
            IngestError::Read { .. } => "read",
            IngestError::Stage { .. } => "stage",
        }
    }
}

/// First-error-wins slot shared by every stage of one run.
///
/// Reporting never blocks: the first error is kept, later ones are logged and
/// dropped. Every report cancels the run.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    first: OnceLock<IngestError>,
    cancel: CancellationToken,
}

impl ErrorSlot {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            first: OnceLock::new(),
            cancel,
        }
    }

    pub fn report(&self, err: IngestError) {
        let kind = err.kind();
        match self.first.set(err) {
            Ok(()) => {
                if let Some(first) = self.first.get() {
                    error!(kind, error = %first, "ingest stage failed; cancelling run");
                }
            }
            Err(suppressed) => debug!(kind, error = %suppressed, "suppressed ingest error"),
        }
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn first(&self) -> Option<IngestError> {
        self.first.get().cloned()
    }
}
