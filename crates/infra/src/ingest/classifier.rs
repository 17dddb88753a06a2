//! Classifier Pool: W workers share one intake queue and fan into the two sink
//! queues.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, trace};

use pricefeed_products::{ClassificationOutcome, CreateIntent, RawRecord, UpdateIntent, classify};

use super::error::{ErrorSlot, IngestError};
use super::stats::IngestCounters;
use crate::store::ProductStore;

/// Everything one worker needs. Cloned per worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub store: Arc<dyn ProductStore>,
    pub creates: mpsc::Sender<CreateIntent>,
    pub updates: mpsc::Sender<UpdateIntent>,
    pub slot: Arc<ErrorSlot>,
    pub counters: Arc<IngestCounters>,
}

/// Run `workers` classifiers until the intake is drained or the run is
/// cancelled.
///
/// The sink queues close only when this returns: every worker holds a clone
/// of the senders, and the originals in `ctx` are dropped after the last
/// worker has been joined.
pub(crate) async fn run_classifier_pool(
    workers: usize,
    intake: async_channel::Receiver<RawRecord>,
    ctx: WorkerContext,
) {
    let mut pool = JoinSet::new();
    for worker in 0..workers {
        pool.spawn(run_worker(worker, intake.clone(), ctx.clone()).in_current_span());
    }
    drop(intake);

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            ctx.slot.report(IngestError::Stage {
                stage: "classifier",
                reason: e.to_string(),
            });
        }
    }
    debug!(workers, "classifier pool drained");
    drop(ctx);
}

async fn run_worker(worker: usize, intake: async_channel::Receiver<RawRecord>, ctx: WorkerContext) {
    let cancel = ctx.slot.token();

    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = intake.recv() => match next {
                Ok(record) => record,
                Err(_) => break,
            },
        };

        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            found = ctx.store.find_by_name(&record.name) => found,
        };
        let existing = match lookup {
            Ok(existing) => existing,
            Err(source) => {
                ctx.slot.report(IngestError::Lookup {
                    name: record.name,
                    source,
                });
                break;
            }
        };

        let line = record.line;
        let outcome = classify(record, existing.as_ref());
        ctx.counters.classified(&outcome);
        trace!(worker, line, outcome = outcome.kind(), "row classified");

        let delivered = match outcome {
            ClassificationOutcome::Create(intent) => forward(&ctx.creates, intent, cancel).await,
            ClassificationOutcome::Update(intent) => forward(&ctx.updates, intent, cancel).await,
            ClassificationOutcome::Unchanged => true,
        };
        if !delivered {
            break;
        }
    }
    trace!(worker, "classifier worker stopped");
}

/// Hand an intent to a sink. `false` once the run is cancelled or the sink
/// has stopped.
async fn forward<T>(queue: &mpsc::Sender<T>, intent: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = queue.send(intent) => sent.is_ok(),
    }
}
