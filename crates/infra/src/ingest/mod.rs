//! Feed ingestion pipeline.
//!
//! ```text
//! Row Source ──▶ intake ──▶ Classifier Pool (W workers) ──┬─▶ Create Sink
//!                                                          └─▶ Update Sink
//! ```
//!
//! Every stage shares one [`ErrorSlot`]: the first fatal error is kept and
//! cancels the run, and every suspension point in every stage races that
//! cancellation.

mod classifier;
mod coordinator;
mod error;
mod sinks;
mod source;
mod stats;

pub use coordinator::{IngestCoordinator, RunState};
pub use error::{ErrorSlot, IngestError};
pub use stats::{IngestCounters, IngestSummary};
