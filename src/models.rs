//! Data models for the weather ingestion pipeline.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// One day's measurements for one station, in physical units.
///
/// Absent values stay `None` all the way to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub station_id: String,
    pub date: NaiveDate,
    pub max_temp_c: Option<f64>,
    pub min_temp_c: Option<f64>,
    pub precip_cm: Option<f64>,
}

impl Reading {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// True when every measured value matches `other`; the key is not compared.
    pub fn same_values(&self, other: &Reading) -> bool {
        self.max_temp_c == other.max_temp_c
            && self.min_temp_c == other.min_temp_c
            && self.precip_cm == other.precip_cm
    }
}

/// Yearly aggregate for one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct YearlyStat {
    // ---
    pub station_id: String,
    pub year: i32,
    pub avg_max_temp_c: Option<f64>,
    pub avg_min_temp_c: Option<f64>,
    pub total_precip_cm: Option<f64>,
    pub record_count: i64,
    pub max_temp_count: i64,
    pub min_temp_count: i64,
    pub precip_count: i64,
}

/// Outcome of a single conditional upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Optional narrowing of a read or recompute by station and/or year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationYearFilter {
    pub station_id: Option<String>,
    pub year: Option<i32>,
}

impl StationYearFilter {
    pub fn matches(&self, station_id: &str, year: i32) -> bool {
        self.station_id.as_deref().map_or(true, |s| s == station_id)
            && self.year.map_or(true, |y| y == year)
    }
}

/// A station whose source could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub station_id: String,
    pub path: String,
    pub message: String,
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    // ---
    pub run_id: Uuid,
    pub files_processed: usize,
    pub inserted: u64,
    pub updated: u64,
    pub skipped_duplicate_identical: u64,
    pub errored: u64,
    pub failed_sources: Vec<SourceFailure>,
    pub cancelled: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl IngestReport {
    pub fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        IngestReport {
            run_id,
            files_processed: 0,
            inserted: 0,
            updated: 0,
            skipped_duplicate_identical: 0,
            errored: 0,
            failed_sources: Vec::new(),
            cancelled: false,
            start_time: now,
            end_time: now,
        }
    }

    /// Fold the counters of one station's run into this report.
    pub fn absorb(&mut self, station: StationTally) {
        self.inserted += station.inserted;
        self.updated += station.updated;
        self.skipped_duplicate_identical += station.skipped_duplicate_identical;
        self.errored += station.errored;
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Per-station counters collected by a single ingestion worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationTally {
    pub inserted: u64,
    pub updated: u64,
    pub skipped_duplicate_identical: u64,
    pub errored: u64,
}

impl StationTally {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.skipped_duplicate_identical += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped_duplicate_identical + self.errored
    }
}

/// Counters for one statistics recompute.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    // ---
    pub stations_processed: usize,
    /// Number of (station, year) groups aggregated.
    pub years_processed: usize,
    pub upserted: u64,
    /// Groups dropped because their key was inconsistent, e.g. an impossible year.
    pub excluded_groups: u64,
    /// Individual readings left out of an otherwise valid group.
    pub excluded_readings: u64,
    /// Groups whose write failed for that row alone.
    pub failed: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn reading(max: Option<f64>) -> Reading {
        Reading {
            station_id: "USC00110072".to_string(),
            date: NaiveDate::from_ymd_opt(1985, 1, 1).unwrap(),
            max_temp_c: max,
            min_temp_c: Some(-2.2),
            precip_cm: None,
        }
    }

    #[test]
    fn test_same_values_ignores_key() {
        // ---
        let a = reading(Some(1.0));
        let mut b = reading(Some(1.0));
        b.station_id = "OTHER".to_string();
        assert!(a.same_values(&b));
        assert!(!a.same_values(&reading(None)));
    }

    #[test]
    fn test_filter_matches() {
        // ---
        let all = StationYearFilter::default();
        assert!(all.matches("A", 1990));

        let scoped = StationYearFilter {
            station_id: Some("A".to_string()),
            year: Some(1990),
        };
        assert!(scoped.matches("A", 1990));
        assert!(!scoped.matches("B", 1990));
        assert!(!scoped.matches("A", 1991));
    }

    #[test]
    fn test_report_counts_outcomes() {
        // ---
        let mut tally = StationTally::default();
        tally.record(UpsertOutcome::Inserted);
        tally.record(UpsertOutcome::Unchanged);
        tally.record(UpsertOutcome::Unchanged);
        tally.errored += 1;
        assert_eq!(tally.total(), 4);

        let mut report = IngestReport::new(Uuid::new_v4());
        report.absorb(tally);
        report.absorb(tally);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped_duplicate_identical, 4);
        assert_eq!(report.errored, 2);
    }
}
