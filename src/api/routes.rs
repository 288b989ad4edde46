//! 라우트 설정 모듈.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{
    health_handler, match_handler, readiness_handler, scrape_and_match_handler, scrape_handler,
};
use crate::api::state::AppState;

/// Creates and configures all application routes.
///
/// # Routes
///
/// ## Health Check Routes
/// - `GET /health` - Liveness probe
/// - `GET /ready` - Readiness probe
///
/// ## API Routes
/// - `POST /scrape` - Scrape a listing URL
/// - `POST /match` - Match a provided sale listing
/// - `POST /scrape_and_match` - Scrape a listing URL and match it
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // Health check routes
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        // API routes
        .route("/scrape", post(scrape_handler))
        .route("/match", post(match_handler))
        .route("/scrape_and_match", post(scrape_and_match_handler))
        // Shared state
        .with_state(state)
}
