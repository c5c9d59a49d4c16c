//! In-process store with the same atomicity guarantees as the database.
//!
//! Each operation takes the map lock once and releases it before returning.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tokio::sync::RwLock;

use super::{ReadingFilter, StoreResult, WeatherStore, Window};
use crate::{Reading, StationYearFilter, UpsertOutcome, YearlyStat};

// ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: RwLock<BTreeMap<(String, NaiveDate), Reading>>,
    stats: RwLock<BTreeMap<(String, i32), YearlyStat>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored reading in key order.
    pub async fn all_readings(&self) -> Vec<Reading> {
        self.readings.read().await.values().cloned().collect()
    }

    /// Snapshot of every stored stat in key order.
    pub async fn all_stats(&self) -> Vec<YearlyStat> {
        self.stats.read().await.values().cloned().collect()
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, window: Window) -> Vec<T> {
    items
        .skip(window.offset.max(0) as usize)
        .take(window.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl WeatherStore for MemoryStore {
    // ---
    async fn upsert_reading(&self, reading: &Reading) -> StoreResult<UpsertOutcome> {
        let mut map = self.readings.write().await;
        let key = (reading.station_id.clone(), reading.date);
        let outcome = match map.get(&key) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing.same_values(reading) => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
        };
        map.insert(key, reading.clone());
        Ok(outcome)
    }

    async fn station_years(&self, filter: &StationYearFilter) -> StoreResult<Vec<(String, i32)>> {
        let map = self.readings.read().await;
        let mut groups: Vec<(String, i32)> = map
            .keys()
            .filter(|(station, date)| filter.matches(station, date.year()))
            .map(|(station, date)| (station.clone(), date.year()))
            .collect();
        groups.dedup();
        Ok(groups)
    }

    async fn readings_for_year(&self, station_id: &str, year: i32) -> StoreResult<Vec<Reading>> {
        let map = self.readings.read().await;
        Ok(map
            .iter()
            .filter(|((station, date), _)| station == station_id && date.year() == year)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn upsert_stat(&self, stat: &YearlyStat) -> StoreResult<()> {
        self.stats
            .write()
            .await
            .insert((stat.station_id.clone(), stat.year), stat.clone());
        Ok(())
    }

    async fn count_readings(&self, filter: &ReadingFilter) -> StoreResult<i64> {
        let map = self.readings.read().await;
        Ok(map.values().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn list_readings(&self, filter: &ReadingFilter, window: Window) -> StoreResult<Vec<Reading>> {
        let map = self.readings.read().await;
        Ok(page(map.values().filter(|r| filter.matches(r)).cloned(), window))
    }

    async fn count_stats(&self, filter: &StationYearFilter) -> StoreResult<i64> {
        let map = self.stats.read().await;
        Ok(map
            .values()
            .filter(|s| filter.matches(&s.station_id, s.year))
            .count() as i64)
    }

    async fn list_stats(&self, filter: &StationYearFilter, window: Window) -> StoreResult<Vec<YearlyStat>> {
        let map = self.stats.read().await;
        Ok(page(
            map.values()
                .filter(|s| filter.matches(&s.station_id, s.year))
                .cloned(),
            window,
        ))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn reading(station: &str, day: u32, max: Option<f64>) -> Reading {
        Reading {
            station_id: station.to_string(),
            date: NaiveDate::from_ymd_opt(1990, 3, day).unwrap(),
            max_temp_c: max,
            min_temp_c: None,
            precip_cm: Some(0.3),
        }
    }

    #[tokio::test]
    async fn test_upsert_outcomes() {
        // ---
        let store = MemoryStore::new();
        let r = reading("A", 1, Some(10.0));
        assert_eq!(store.upsert_reading(&r).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_reading(&r).await.unwrap(), UpsertOutcome::Unchanged);

        let changed = reading("A", 1, Some(11.0));
        assert_eq!(store.upsert_reading(&changed).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.all_readings().await, vec![changed]);
    }

    #[tokio::test]
    async fn test_station_years_are_distinct_and_ordered() {
        // ---
        let store = MemoryStore::new();
        for r in [reading("B", 1, None), reading("A", 2, None), reading("A", 1, None)] {
            store.upsert_reading(&r).await.unwrap();
        }
        let groups = store.station_years(&StationYearFilter::default()).await.unwrap();
        assert_eq!(groups, vec![("A".to_string(), 1990), ("B".to_string(), 1990)]);

        let rows = store.readings_for_year("A", 1990).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].date < rows[1].date);
    }

    #[tokio::test]
    async fn test_windowed_listing() {
        // ---
        let store = MemoryStore::new();
        for day in 1..=5 {
            store.upsert_reading(&reading("A", day, None)).await.unwrap();
        }
        let filter = ReadingFilter::default();
        let rows = store
            .list_readings(&filter, Window { offset: 3, limit: 10 })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date.day(), 4);
        assert_eq!(store.count_readings(&filter).await.unwrap(), 5);
    }
}
