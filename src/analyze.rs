//! Aggregation engine: yearly per-station statistics from stored readings.
//!
//! Each (station, year) group is read in date order and folded here rather
//! than in SQL, so a full recompute and a scoped one yield bit-identical
//! floats for the same group. Results overwrite whatever was stored before.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{AggregationInputError, Result};
use crate::store::WeatherStore;
use crate::{Reading, StationYearFilter, StatsReport, YearlyStat};

// ---

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Years outside this range are treated as corrupt input.
    pub valid_years: RangeInclusive<i32>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions {
            valid_years: 1800..=2100,
        }
    }
}

/// Running sum and count of the present values of one metric.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: i64,
}

impl Accumulator {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn total(&self) -> Option<f64> {
        (self.count > 0).then_some(self.sum)
    }
}

/// Check that a group key is plausible before aggregating it.
pub fn validate_group(
    station_id: &str,
    year: i32,
    options: &AggregateOptions,
) -> std::result::Result<(), AggregationInputError> {
    if options.valid_years.contains(&year) {
        return Ok(());
    }
    Err(AggregationInputError {
        station_id: station_id.to_string(),
        year,
        reason: format!(
            "year outside {}..={}",
            options.valid_years.start(),
            options.valid_years.end()
        ),
    })
}

/// Check one reading against its group.
fn validate_reading(
    reading: &Reading,
    station_id: &str,
    year: i32,
) -> std::result::Result<(), AggregationInputError> {
    let reason = if reading.station_id != station_id || reading.year() != year {
        Some(format!("reading {} {} outside group", reading.station_id, reading.date))
    } else if [reading.max_temp_c, reading.min_temp_c, reading.precip_cm]
        .iter()
        .flatten()
        .any(|v| !v.is_finite())
    {
        Some(format!("non-finite value on {}", reading.date))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(AggregationInputError {
            station_id: station_id.to_string(),
            year,
            reason,
        }),
        None => Ok(()),
    }
}

/// Fold one group's readings into a [`YearlyStat`].
///
/// Absent values are skipped per metric; a metric with no present values is
/// `None`, never zero. Returns the stat and the number of readings excluded.
pub fn aggregate_group(station_id: &str, year: i32, readings: &[Reading]) -> (YearlyStat, u64) {
    // ---
    let mut max_temp = Accumulator::default();
    let mut min_temp = Accumulator::default();
    let mut precip = Accumulator::default();
    let mut record_count = 0;
    let mut excluded = 0;

    for reading in readings {
        if let Err(e) = validate_reading(reading, station_id, year) {
            warn!("{}", e);
            excluded += 1;
            continue;
        }
        record_count += 1;
        max_temp.add(reading.max_temp_c);
        min_temp.add(reading.min_temp_c);
        precip.add(reading.precip_cm);
    }

    let stat = YearlyStat {
        station_id: station_id.to_string(),
        year,
        avg_max_temp_c: max_temp.mean(),
        avg_min_temp_c: min_temp.mean(),
        total_precip_cm: precip.total(),
        record_count,
        max_temp_count: max_temp.count,
        min_temp_count: min_temp.count,
        precip_count: precip.count,
    };
    (stat, excluded)
}

/// Recompute and overwrite statistics for every group matching `filter`.
///
/// Fails only when the store is unreachable; bad groups and rows that fail to
/// write are logged and counted in the report.
pub async fn recompute_stats(
    store: &dyn WeatherStore,
    filter: &StationYearFilter,
    options: &AggregateOptions,
) -> Result<StatsReport> {
    // ---
    let start_time = Utc::now();
    info!(
        "Starting weather statistics calculation (station={:?}, year={:?})",
        filter.station_id, filter.year
    );

    let groups = store.station_years(filter).await?;
    info!("Found {} station-year combinations to process", groups.len());

    let mut report = StatsReport {
        stations_processed: 0,
        years_processed: 0,
        upserted: 0,
        excluded_groups: 0,
        excluded_readings: 0,
        failed: 0,
        start_time,
        end_time: start_time,
    };
    let mut stations = BTreeSet::new();

    for (i, (station_id, year)) in groups.iter().enumerate() {
        if let Err(e) = validate_group(station_id, *year, options) {
            warn!("{}", e);
            report.excluded_groups += 1;
            continue;
        }

        let readings = store.readings_for_year(station_id, *year).await?;
        let (stat, excluded) = aggregate_group(station_id, *year, &readings);
        report.excluded_readings += excluded;
        report.years_processed += 1;
        stations.insert(station_id.as_str());

        match store.upsert_stat(&stat).await {
            Ok(()) => report.upserted += 1,
            Err(e) if e.is_unreachable() => return Err(e.into()),
            Err(e) => {
                error!("Error processing stats for {} year {}: {}", station_id, year, e);
                report.failed += 1;
            }
        }

        if (i + 1) % 50 == 0 {
            debug!("Processed {}/{} statistics records...", i + 1, groups.len());
        }
    }

    report.stations_processed = stations.len();
    report.end_time = Utc::now();
    info!(
        "Statistics calculation complete in {}ms: {} stations, {} station-years, {} upserted, {} excluded",
        (report.end_time - report.start_time).num_milliseconds(),
        report.stations_processed,
        report.years_processed,
        report.upserted,
        report.excluded_groups
    );
    Ok(report)
}
