//! Error taxonomy for ingestion, aggregation and queries.
//!
//! Line-level and group-level problems are recovered where they occur and only
//! counted; [`Error`] is reserved for failures of a whole call.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of an entire `ingest` or `recompute_stats` call.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid source root {path}: {reason}")]
    InvalidSourceRoot { path: PathBuf, reason: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// A station file (or the remote archive) could not be read.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Invalid archive from {url}: {message}")]
    Archive { url: String, message: String },
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by a [`crate::store::WeatherStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness violation that the conditional upsert did not absorb.
    #[error("Conflicting write for {station_id} at {key}")]
    Conflict { station_id: String, key: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// True when the store itself cannot be reached, as opposed to one bad row.
    pub fn is_unreachable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
            ),
            StoreError::Conflict { .. } => false,
        }
    }
}

/// A stored reading that cannot take part in aggregation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Station {station_id} year {year} excluded from aggregation: {reason}")]
pub struct AggregationInputError {
    pub station_id: String,
    pub year: i32,
    pub reason: String,
}

/// Rejected pagination or filter parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Page must be >= 1")]
    InvalidPage,

    #[error("Limit must be between 1 and {max}")]
    InvalidLimit { max: u32 },

    #[error("Year must be between {min} and {max}")]
    InvalidYear { min: i32, max: i32 },

    #[error("Invalid date format. Use YYYY-MM-DD")]
    InvalidDate,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_connection_failures_are_unreachable() {
        // ---
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(StoreError::Database(sqlx::Error::Io(io)).is_unreachable());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_unreachable());
        assert!(StoreError::Database(sqlx::Error::PoolClosed).is_unreachable());
        assert!(StoreError::Database(sqlx::Error::Protocol("eof".into())).is_unreachable());
        assert!(StoreError::Unavailable("down".into()).is_unreachable());
    }

    #[test]
    fn test_row_level_failures_are_not_unreachable() {
        // ---
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_unreachable());
        assert!(!StoreError::Database(sqlx::Error::ColumnNotFound("year".into())).is_unreachable());
        let conflict = StoreError::Conflict {
            station_id: "S1".into(),
            key: "2000-01-01".into(),
        };
        assert!(!conflict.is_unreachable());
        assert!(conflict.is_conflict());
    }
}
