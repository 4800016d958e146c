//! Tally daemon library: event store, aggregation engine and the
//! ingestion pipeline.

pub mod engine;
pub mod ingest;
pub mod store;
