//! Route gateway: merges every subrouter and attaches the shared state.

use std::sync::Arc;

use axum::Router;

use crate::store::WeatherStore;

mod health;
mod weather;

/// State shared by all handlers.
pub type AppState = Arc<dyn WeatherStore>;

// ---

pub fn router(store: Arc<dyn WeatherStore>) -> Router {
    // ---
    Router::new()
        .merge(weather::router())
        .merge(health::router())
        .with_state(store)
}
