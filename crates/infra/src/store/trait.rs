use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use pricefeed_core::ProductId;
use pricefeed_products::{ListQuery, Product};

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The product was stored as given.
    Inserted(Product),
    /// A product with the same name already existed and was left untouched.
    Existing(Product),
}

/// Result of a compare-and-swap on a product's price.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceSwap {
    /// Price replaced, `price_update_count` incremented, `updated_at` refreshed.
    Swapped(Product),
    /// No product with that id exists (zero rows affected).
    Missing,
    /// The stored price no longer equals the expected one; nothing changed.
    Stale(f64),
}

/// Store operation error.
///
/// These are **infrastructure errors**. "Not found" on lookup is not an error:
/// [`ProductStore::find_by_name`] returns `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The backend failed (connection, query, pool closed, ...).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored row could not be mapped back into a `Product`.
    #[error("failed to decode stored product: {0}")]
    Decode(String),

    /// A uniqueness or concurrency expectation did not hold.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The domain refused the requested state change.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The product disappeared between lookup and write.
    #[error("product {0} vanished before it could be updated")]
    Vanished(ProductId),
}

/// Product storage shared by every pipeline stage and the listing endpoint.
///
/// Implementations must be safe for many concurrent callers. The two write
/// operations are atomic per call, so concurrent runs cannot create duplicate
/// names or overwrite a price they did not observe.
#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    /// Look a product up by its unique name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError>;

    /// Store `product` unless its name is already taken.
    async fn insert_if_absent(&self, product: Product) -> Result<InsertOutcome, StoreError>;

    /// Set the price of `id` to `new_price` iff it currently equals `expected`.
    async fn swap_price(
        &self,
        id: ProductId,
        expected: f64,
        new_price: f64,
        at: DateTime<Utc>,
    ) -> Result<PriceSwap, StoreError>;

    /// Return one sorted page of the catalog.
    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError>;
}

#[async_trait::async_trait]
impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        (**self).find_by_name(name).await
    }

    async fn insert_if_absent(&self, product: Product) -> Result<InsertOutcome, StoreError> {
        (**self).insert_if_absent(product).await
    }

    async fn swap_price(
        &self,
        id: ProductId,
        expected: f64,
        new_price: f64,
        at: DateTime<Utc>,
    ) -> Result<PriceSwap, StoreError> {
        (**self).swap_price(id, expected, new_price, at).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError> {
        (**self).list(query).await
    }
}
