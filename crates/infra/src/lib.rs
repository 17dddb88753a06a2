//! Infrastructure layer: product storage, feed ingestion, configuration.

pub mod config;
pub mod ingest;
pub mod store;

mod integration_tests;
