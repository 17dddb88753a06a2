//! Per-row reconciliation decision.
//!
//! Given one feed row and whatever the store currently holds under that name,
//! decide whether the row creates a product, reprices one, or changes nothing.

use serde::{Deserialize, Serialize};

use pricefeed_core::ProductId;

use crate::product::Product;

/// One parsed feed row. Discarded after classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub name: String,
    pub price: f64,
    /// 1-based line in the feed the row came from.
    pub line: usize,
}

/// Persist a product that does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIntent {
    pub name: String,
    pub price: f64,
}

/// Reprice an existing product.
///
/// `expected_price` is the price observed at classification time; the store
/// only applies the change while the stored price still equals it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateIntent {
    pub product_id: ProductId,
    pub expected_price: f64,
    pub new_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Create(CreateIntent),
    Update(UpdateIntent),
    /// Stored price already matches; nothing is sent downstream.
    Unchanged,
}

impl ClassificationOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationOutcome::Create(_) => "create",
            ClassificationOutcome::Update(_) => "update",
            ClassificationOutcome::Unchanged => "unchanged",
        }
    }
}

/// Decide what a row means for the catalog.
///
/// `existing` is the result of looking the row's name up in the store
/// (`None` = not found). Prices are compared exactly.
pub fn classify(record: RawRecord, existing: Option<&Product>) -> ClassificationOutcome {
    match existing {
        None => ClassificationOutcome::Create(CreateIntent {
            name: record.name,
            price: record.price,
        }),
        Some(product) if product.has_price(record.price) => ClassificationOutcome::Unchanged,
        Some(product) => ClassificationOutcome::Update(UpdateIntent {
            product_id: product.id_typed(),
            expected_price: product.price(),
            new_price: record.price,
        }),
    }
}
