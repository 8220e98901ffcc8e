//! Load-series ingestion and result export.

pub mod export;
pub mod ingest;
