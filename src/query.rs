//! Read-only, paginated access to stored readings and statistics.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::store::{ReadingFilter, WeatherStore, Window};
use crate::{Reading, StationYearFilter, YearlyStat};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;
pub const MIN_QUERY_YEAR: i32 = 1900;
pub const MAX_QUERY_YEAR: i32 = 2100;

// ---

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaginationInfo {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

/// One page of an ordered result set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
}

/// 1-based page number and page size, validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> std::result::Result<Self, QueryError> {
        if page < 1 {
            return Err(QueryError::InvalidPage);
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(QueryError::InvalidLimit { max: MAX_LIMIT });
        }
        Ok(PageRequest { page, limit })
    }

    fn window(&self) -> Window {
        Window {
            offset: (self.page as i64 - 1) * self.limit as i64,
            limit: self.limit as i64,
        }
    }

    fn info(&self, total: i64) -> PaginationInfo {
        let limit = self.limit as i64;
        PaginationInfo {
            page: self.page,
            limit: self.limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Parse an API date filter (`YYYY-MM-DD`).
pub fn parse_date_filter(s: &str) -> std::result::Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| QueryError::InvalidDate)
}

/// Readings ordered by `(station_id, date)`.
pub async fn list_readings(
    store: &dyn WeatherStore,
    filter: &ReadingFilter,
    page: PageRequest,
) -> Result<Page<Reading>> {
    // ---
    let total = store.count_readings(filter).await?;
    let data = store.list_readings(filter, page.window()).await?;
    Ok(Page {
        data,
        pagination: page.info(total),
    })
}

/// Yearly statistics ordered by `(station_id, year)`.
pub async fn list_stats(
    store: &dyn WeatherStore,
    filter: &StationYearFilter,
    page: PageRequest,
) -> Result<Page<YearlyStat>> {
    // ---
    if let Some(year) = filter.year {
        if !(MIN_QUERY_YEAR..=MAX_QUERY_YEAR).contains(&year) {
            return Err(QueryError::InvalidYear {
                min: MIN_QUERY_YEAR,
                max: MAX_QUERY_YEAR,
            }
            .into());
        }
    }

    let total = store.count_stats(filter).await?;
    let data = store.list_stats(filter, page.window()).await?;
    Ok(Page {
        data,
        pagination: page.info(total),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::Error;
    use crate::store::MemoryStore;

    #[test]
    fn test_page_request_validation() {
        // ---
        assert_eq!(PageRequest::new(0, 10), Err(QueryError::InvalidPage));
        assert_eq!(PageRequest::new(1, 0), Err(QueryError::InvalidLimit { max: 1000 }));
        assert_eq!(PageRequest::new(1, 1001), Err(QueryError::InvalidLimit { max: 1000 }));
        assert!(PageRequest::new(3, 1000).is_ok());
    }

    #[test]
    fn test_page_count() {
        // ---
        let req = PageRequest::new(2, 10).unwrap();
        assert_eq!(req.window(), Window { offset: 10, limit: 10 });
        assert_eq!(req.info(0).pages, 0);
        assert_eq!(req.info(10).pages, 1);
        assert_eq!(req.info(11).pages, 2);
    }

    #[test]
    fn test_date_filter() {
        // ---
        assert_eq!(
            parse_date_filter("1985-01-01").unwrap(),
            NaiveDate::from_ymd_opt(1985, 1, 1).unwrap()
        );
        assert_eq!(parse_date_filter("19850101"), Err(QueryError::InvalidDate));
    }

    #[tokio::test]
    async fn test_stats_year_out_of_range() {
        // ---
        let store = MemoryStore::new();
        let filter = StationYearFilter {
            station_id: None,
            year: Some(1800),
        };
        let err = list_stats(&store, &filter, PageRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Query(QueryError::InvalidYear { .. })));
    }

    #[test]
    fn test_absent_metric_serializes_as_null() {
        // ---
        let page = Page {
            data: vec![YearlyStat {
                station_id: "ST1".to_string(),
                year: 1990,
                avg_max_temp_c: Some(12.5),
                avg_min_temp_c: None,
                total_precip_cm: None,
                record_count: 1,
                max_temp_count: 1,
                min_temp_count: 0,
                precip_count: 0,
            }],
            pagination: PageRequest::default().info(1),
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["data"][0]["total_precip_cm"], serde_json::Value::Null);
        assert_eq!(json["data"][0]["avg_max_temp_c"], 12.5);
        assert_eq!(json["pagination"]["pages"], 1);
    }
}
