//! Liveness and store readiness check.
//!
//! `GET /health` answers `200` with `{"status":"ok","store":"ok"}` when the
//! store responds, and `503` with the store error otherwise, so an
//! orchestrator can tell a running process from a usable one.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use super::AppState;
use crate::StationYearFilter;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    store: String,
}

async fn health(State(store): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // ---
    match store.count_stats(&StationYearFilter::default()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: "ok".to_string(),
            }),
        ),
        Err(e) => {
            warn!("Health check: store not ready: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    store: e.to_string(),
                }),
            )
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_ok_with_reachable_store() {
        // ---
        let store: AppState = Arc::new(MemoryStore::new());
        let (status, Json(body)) = health(State(store)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }
}
