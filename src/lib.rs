//! Weather station ingestion and yearly statistics.
//!
//! The pipeline runs source files through parsing and unit conversion into a
//! duplicate-safe reading store ([`ingest::ingest`]), then derives per-station
//! yearly aggregates ([`analyze::recompute_stats`]). [`query`] exposes both
//! tables read-only with stable pagination.

pub mod analyze;
pub mod config;
pub mod convert;
pub mod error;
pub mod ingest;
pub mod models;
pub mod parse;
pub mod query;
pub mod routes;
pub mod schema;
pub mod source;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

// Re-exported so submodules depend on the crate root rather than on `models`
pub use models::{
    IngestReport, Reading, SourceFailure, StationTally, StationYearFilter, StatsReport,
    UpsertOutcome, YearlyStat,
};
