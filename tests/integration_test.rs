//! Smoke tests against a running `wx-analytics serve` with ingested data.
//!
//! Run with `BASE_URL=http://localhost:8080 cargo test -- --ignored`.

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Pagination {
    page: u32,
    limit: u32,
    total: i64,
    pages: i64,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Reading {
    station_id: String,
    date: String,
    max_temp_c: Option<f64>,
    min_temp_c: Option<f64>,
    precip_cm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YearlyStat {
    station_id: String,
    year: i32,
    total_precip_cm: Option<f64>,
    precip_count: i64,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn readings_are_paginated_stably() -> Result<()> {
    // ---
    let url = format!("{}/api/weather?page=2&limit=50", base_url());
    let client = Client::new();

    let first: Page<Reading> = client.get(&url).send().await?.json().await?;
    let again: Page<Reading> = client.get(&url).send().await?.json().await?;

    assert_eq!(first.pagination.page, 2);
    assert_eq!(first.pagination.limit, 50);
    assert!(first.data.len() <= 50);
    assert_eq!(first.data, again.data, "Same page returned different rows");
    assert_eq!(
        first.pagination.pages,
        (first.pagination.total + 49) / 50,
        "Page count does not match total"
    );

    for pair in first.data.windows(2) {
        let a = (&pair[0].station_id, &pair[0].date);
        let b = (&pair[1].station_id, &pair[1].date);
        assert!(a < b, "Readings not ordered by station then date");
    }

    for r in &first.data {
        // Physical units, never raw tenths or the sentinel
        for v in [r.max_temp_c, r.min_temp_c].into_iter().flatten() {
            assert!((-90.0..=60.0).contains(&v), "Implausible temperature {v}");
        }
        if let Some(p) = r.precip_cm {
            assert!(p >= 0.0, "Negative precipitation {p}");
        }
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn stats_filtering_works() -> Result<()> {
    // ---
    let client = Client::new();
    let url = format!("{}/api/weather/stats?year=1990&limit=10", base_url());
    let stats: Page<YearlyStat> = client.get(&url).send().await?.json().await?;

    assert!(stats.data.len() <= 10, "Limit filter failed");
    for stat in &stats.data {
        assert_eq!(stat.year, 1990, "Year filter failed");
        assert!(!stat.station_id.is_empty());
        if stat.precip_count == 0 {
            assert_eq!(stat.total_precip_cm, None, "Missing precipitation became a number");
        }
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn invalid_parameters_are_rejected() -> Result<()> {
    // ---
    let client = Client::new();
    for query in ["page=0", "limit=1001", "date=19850101"] {
        let url = format!("{}/api/weather?{}", base_url(), query);
        let status = client.get(&url).send().await?.status();
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query} was accepted");
    }

    let url = format!("{}/api/weather/stats?year=1800", base_url());
    assert_eq!(client.get(&url).send().await?.status(), StatusCode::BAD_REQUEST);

    let health = client.get(format!("{}/health", base_url())).send().await?;
    assert_eq!(health.status(), StatusCode::OK);

    Ok(())
}
