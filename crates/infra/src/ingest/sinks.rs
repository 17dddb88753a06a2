//! Create and Update sinks.
//!
//! Each sink is a single consumer. Writes go through the store's atomic
//! primitives, so a product created or repriced by a concurrent run between
//! lookup and write is converged onto rather than duplicated or overwritten.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use pricefeed_core::ProductId;
use pricefeed_products::{CreateIntent, Product, UpdateIntent};

use super::error::{ErrorSlot, IngestError};
use super::stats::IngestCounters;
use crate::store::{InsertOutcome, PriceSwap, ProductStore, StoreError};

#[derive(Clone)]
pub(crate) struct SinkContext {
    pub store: Arc<dyn ProductStore>,
    pub max_price_swaps: u32,
    pub slot: Arc<ErrorSlot>,
    pub counters: Arc<IngestCounters>,
}

pub(crate) async fn run_create_sink(mut intake: mpsc::Receiver<CreateIntent>, ctx: SinkContext) {
    let cancel = ctx.slot.token();
    loop {
        let intent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = intake.recv() => match next {
                Some(intent) => intent,
                None => break,
            },
        };
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = create(&ctx, intent) => written,
        };
        if let Err(e) = written {
            ctx.slot.report(e);
            break;
        }
    }
    debug!("create sink stopped");
}

pub(crate) async fn run_update_sink(mut intake: mpsc::Receiver<UpdateIntent>, ctx: SinkContext) {
    let cancel = ctx.slot.token();
    loop {
        let intent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = intake.recv() => match next {
                Some(intent) => intent,
                None => break,
            },
        };
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = reprice(&ctx, intent.product_id, intent.expected_price, intent.new_price, "update") => written,
        };
        if let Err(e) = written {
            ctx.slot.report(e);
            break;
        }
    }
    debug!("update sink stopped");
}

async fn create(ctx: &SinkContext, intent: CreateIntent) -> Result<(), IngestError> {
    let price = intent.price;
    let product = Product::create(intent.name, price, Utc::now()).map_err(|e| IngestError::Persist {
        op: "create",
        source: StoreError::Rejected(e.to_string()),
    })?;

    let outcome = ctx
        .store
        .insert_if_absent(product)
        .await
        .map_err(|source| IngestError::Persist { op: "create", source })?;

    match outcome {
        InsertOutcome::Inserted(product) => {
            ctx.counters.created();
            debug!(product_id = %product.id_typed(), name = product.name(), price, "product created");
            Ok(())
        }
        InsertOutcome::Existing(existing) if existing.has_price(price) => {
            ctx.counters.skipped();
            Ok(())
        }
        InsertOutcome::Existing(existing) => {
            debug!(
                product_id = %existing.id_typed(),
                name = existing.name(),
                "product appeared after lookup; repricing instead"
            );
            reprice(ctx, existing.id_typed(), existing.price(), price, "create").await
        }
    }
}

/// Move `id` from `expected` to `new_price`, following concurrent price
/// changes for at most `max_price_swaps` attempts.
async fn reprice(
    ctx: &SinkContext,
    id: ProductId,
    mut expected: f64,
    new_price: f64,
    op: &'static str,
) -> Result<(), IngestError> {
    for attempt in 1..=ctx.max_price_swaps {
        let swap = ctx
            .store
            .swap_price(id, expected, new_price, Utc::now())
            .await
            .map_err(|source| IngestError::Persist { op, source })?;

        match swap {
            PriceSwap::Swapped(product) => {
                ctx.counters.updated();
                debug!(
                    product_id = %id,
                    price = new_price,
                    price_update_count = product.price_update_count(),
                    "product repriced"
                );
                return Ok(());
            }
            PriceSwap::Missing => {
                return Err(IngestError::Persist {
                    op,
                    source: StoreError::Vanished(id),
                });
            }
            PriceSwap::Stale(current) if current == new_price => {
                ctx.counters.skipped();
                return Ok(());
            }
            PriceSwap::Stale(current) => {
                debug!(product_id = %id, attempt, expected, current, "price moved; swapping again");
                expected = current;
            }
        }
    }

    Err(IngestError::Persist {
        op,
        source: StoreError::Conflict(format!(
            "price of {id} kept changing across {} swap attempts",
            ctx.max_price_swaps
        )),
    })
}
