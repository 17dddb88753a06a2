use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use pricefeed_products::ClassificationOutcome;

/// Per-run counters, bumped by the stages as rows move through.
#[derive(Debug, Default)]
pub struct IngestCounters {
    rows: AtomicU64,
    to_create: AtomicU64,
    to_update: AtomicU64,
    unchanged: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    skipped: AtomicU64,
}

impl IngestCounters {
    pub fn row_read(&self) {
        self.rows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn classified(&self, outcome: &ClassificationOutcome) {
        let counter = match outcome {
            ClassificationOutcome::Create(_) => &self.to_create,
            ClassificationOutcome::Update(_) => &self.to_update,
            ClassificationOutcome::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn updated(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    /// A sink found the store already in the requested state.
    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSummary {
        IngestSummary {
            rows: self.rows.load(Ordering::Relaxed),
            to_create: self.to_create.load(Ordering::Relaxed),
            to_update: self.to_update.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Data rows read from the feed (header excluded).
    pub rows: u64,
    /// Classified as new products.
    pub to_create: u64,
    /// Classified as price changes.
    pub to_update: u64,
    /// Classified as no-ops.
    pub unchanged: u64,
    /// Products actually inserted.
    pub created: u64,
    /// Price swaps actually applied (including converged creates).
    pub updated: u64,
    /// Intents that found the store already converged.
    pub skipped: u64,
}

impl IngestSummary {
    pub fn classified(&self) -> u64 {
        self.to_create + self.to_update + self.unchanged
    }
}
