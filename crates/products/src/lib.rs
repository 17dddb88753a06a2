//! Products domain module.
//!
//! Business rules for the price-feed catalog, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage): the `Product` entity, the
//! per-row create/update/no-op decision, and listing queries.

pub mod classify;
pub mod listing;
pub mod product;

pub use classify::{ClassificationOutcome, CreateIntent, RawRecord, UpdateIntent, classify};
pub use listing::{DEFAULT_PAGE_SIZE, ListQuery, SortDirection, SortField, SortKey};
pub use product::Product;
