//! Product persistence boundary.
//!
//! The pipeline and the listing endpoint only ever talk to [`ProductStore`];
//! the concrete backend is injected by the caller.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;
pub use r#trait::{InsertOutcome, PriceSwap, ProductStore, StoreError};
