//! Reading and statistics store contract.
//!
//! Every mutation is a single conditional write that the store performs
//! atomically. Callers never read-then-write to decide between insert and
//! update, and never hold a lock across calls.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::{Reading, StationYearFilter, UpsertOutcome, YearlyStat};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Filter for reading queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingFilter {
    pub station_id: Option<String>,
    pub date: Option<NaiveDate>,
}

impl ReadingFilter {
    pub fn matches(&self, reading: &Reading) -> bool {
        self.station_id
            .as_deref()
            .map_or(true, |s| s == reading.station_id)
            && self.date.map_or(true, |d| d == reading.date)
    }
}

/// A window into an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}

/// Persistent home of [`Reading`] and [`YearlyStat`] rows.
#[async_trait]
pub trait WeatherStore: Send + Sync {
    // ---
    /// Insert-or-replace keyed on `(station_id, date)` as one atomic write.
    ///
    /// Returns `Unchanged` when an identical row already exists.
    async fn upsert_reading(&self, reading: &Reading) -> StoreResult<UpsertOutcome>;

    /// Distinct `(station_id, year)` groups present in readings, ordered.
    async fn station_years(&self, filter: &StationYearFilter) -> StoreResult<Vec<(String, i32)>>;

    /// All readings of one station in one calendar year, ordered by date.
    async fn readings_for_year(&self, station_id: &str, year: i32) -> StoreResult<Vec<Reading>>;

    /// Overwrite the aggregate for `(station_id, year)`.
    async fn upsert_stat(&self, stat: &YearlyStat) -> StoreResult<()>;

    async fn count_readings(&self, filter: &ReadingFilter) -> StoreResult<i64>;

    /// Readings ordered by `(station_id, date)`.
    async fn list_readings(&self, filter: &ReadingFilter, window: Window) -> StoreResult<Vec<Reading>>;

    async fn count_stats(&self, filter: &StationYearFilter) -> StoreResult<i64>;

    /// Stats ordered by `(station_id, year)`.
    async fn list_stats(&self, filter: &StationYearFilter, window: Window) -> StoreResult<Vec<YearlyStat>>;
}
