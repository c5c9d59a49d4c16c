use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, response::Response,
    routing::get, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::AppState;
use crate::error::{Error, Result};
use crate::query::{self, Page, PageRequest, DEFAULT_LIMIT};
use crate::store::{ReadingFilter, WeatherStore};
use crate::{Reading, StationYearFilter, YearlyStat};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/weather", get(get_weather))
        .route("/api/weather/stats", get(get_weather_stats))
}

/// Query parameters for `GET /api/weather`
#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    /// Single day, `YYYY-MM-DD`
    date: Option<String>,
    station_id: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// Query parameters for `GET /api/weather/stats`
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    year: Option<i32>,
    station_id: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

async fn get_weather(
    Query(params): Query<WeatherQuery>,
    State(store): State<AppState>,
) -> Response {
    // ---
    debug!("GET /api/weather {:?}", params);

    let result = fetch_readings(store.as_ref(), params).await;

    match result {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response("get_weather", e),
    }
}

async fn get_weather_stats(
    Query(params): Query<StatsQuery>,
    State(store): State<AppState>,
) -> Response {
    // ---
    debug!("GET /api/weather/stats {:?}", params);

    let result = fetch_stats(store.as_ref(), params).await;

    match result {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response("get_weather_stats", e),
    }
}

async fn fetch_readings(store: &dyn WeatherStore, params: WeatherQuery) -> Result<Page<Reading>> {
    // ---
    let page = PageRequest::new(
        params.page.unwrap_or(1),
        params.limit.unwrap_or(DEFAULT_LIMIT),
    )?;
    let date = params
        .date
        .as_deref()
        .map(query::parse_date_filter)
        .transpose()?;
    let filter = ReadingFilter {
        station_id: params.station_id.filter(|s| !s.is_empty()),
        date,
    };
    query::list_readings(store, &filter, page).await
}

async fn fetch_stats(store: &dyn WeatherStore, params: StatsQuery) -> Result<Page<YearlyStat>> {
    // ---
    let page = PageRequest::new(
        params.page.unwrap_or(1),
        params.limit.unwrap_or(DEFAULT_LIMIT),
    )?;
    let filter = StationYearFilter {
        station_id: params.station_id.filter(|s| !s.is_empty()),
        year: params.year,
    };
    query::list_stats(store, &filter, page).await
}

/// Rejected parameters are the caller's fault; anything else is ours.
fn error_response(handler: &str, err: Error) -> Response {
    // ---
    let (status, detail) = match err {
        Error::Query(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            error!("Database error in {}: {}", handler, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    };
    (status, Json(ErrorBody { detail })).into_response()
}
