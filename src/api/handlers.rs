//! HTTP request handler module.

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::api::schemas::{
    MatchRequest, MatchResponse, ScrapeAndMatchRequest, ScrapeAndMatchResponse, ScrapeRequest,
    ScrapeResponse,
};
use crate::api::state::AppState;
use crate::error::{AppError, AppResult, ValidationErrorExt};

/// Scrape handler.
///
/// Scrapes the listing behind `post_url` and returns the raw and normalized
/// records.
///
/// # Route
///
/// `POST /scrape`
pub async fn scrape_handler(
    State(state): State<AppState>,
    Json(req_body): Json<ScrapeRequest>,
) -> AppResult<Json<ScrapeResponse>> {
    req_body.validate().map_err(|e| e.to_validation_error())?;

    let outcome = state.scrapers.scrape_url(&req_body.post_url).await?;
    Ok(Json(outcome.into()))
}

/// Match handler.
///
/// Matches a sale listing supplied in the body against the rental index.
///
/// # Route
///
/// `POST /match`
pub async fn match_handler(
    State(state): State<AppState>,
    Json(req_body): Json<MatchRequest>,
) -> AppResult<Json<MatchResponse>> {
    req_body.validate().map_err(|e| e.to_validation_error())?;

    let top_k = req_body.top_k.unwrap_or(state.match_top_k);
    let sale_listing = req_body.into_sale_listing()?.into_listing();

    let matches = state.engine.match_sale_to_rentals(&sale_listing, top_k).await;
    tracing::info!(
        title = %sale_listing.title,
        matches = matches.len(),
        "Matched provided sale listing"
    );

    Ok(Json(MatchResponse {
        sale_listing,
        matches,
    }))
}

/// Scrape-and-match handler.
///
/// Scrapes `post_url` and matches the first normalized listing against the
/// rental index.
///
/// # Route
///
/// `POST /scrape_and_match`
pub async fn scrape_and_match_handler(
    State(state): State<AppState>,
    Json(req_body): Json<ScrapeAndMatchRequest>,
) -> AppResult<Json<ScrapeAndMatchResponse>> {
    req_body.validate().map_err(|e| e.to_validation_error())?;

    let top_k = req_body.top_k.unwrap_or(state.scrape_match_top_k);
    let outcome = state.scrapers.scrape_url(&req_body.post_url).await?;

    let sale_listing = outcome.normalized.first().cloned().ok_or_else(|| {
        AppError::Internal("Scraper returned no normalized listings to match.".to_string())
    })?;

    let matches = state.engine.match_sale_to_rentals(&sale_listing, top_k).await;
    tracing::info!(
        provider = %outcome.provider,
        title = %sale_listing.title,
        matches = matches.len(),
        "Matched scraped sale listing"
    );

    Ok(Json(ScrapeAndMatchResponse {
        status: "success",
        provider: outcome.provider,
        data: outcome.data,
        normalized: outcome.normalized,
        sale_listing,
        matches,
    }))
}

/// Health check response.
#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub scrapers_configured: bool,
    pub version: &'static str,
}

/// Liveness probe handler.
///
/// Returns OK if the server is running.
///
/// # Route
///
/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "API backend is running",
        scrapers_configured: state.scrapers.is_configured(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(serde::Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    /// Number of rentals in the loaded index
    pub rental_index: usize,
    pub cache: &'static str,
}

/// Readiness probe handler.
///
/// Reports the rental index size and cache connectivity. The service is not
/// ready while the rental index is empty; an unreachable cache only degrades
/// it.
///
/// # Route
///
/// `GET /ready`
pub async fn readiness_handler(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let index_ok = state.engine.is_ready();

    let cache = match state.scrapers.cache_pool() {
        None => "disabled",
        Some(pool) => {
            if pool.get().await.is_ok() {
                "connected"
            } else {
                "disconnected"
            }
        }
    };

    let response = ReadinessResponse {
        status: match (index_ok, cache) {
            (false, _) => "unavailable",
            (true, "disconnected") => "degraded",
            (true, _) => "ok",
        },
        rental_index: state.engine.rental_count(),
        cache,
    };

    if index_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
