//! Application state module.
//!
//! Contains the shared scraper service and matching engine.

use std::sync::Arc;

use crate::matching::MatchingEngine;
use crate::services::ScraperService;

/// Shared application state.
///
/// Both services are behind `Arc`, so cloning the state per request is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub scrapers: Arc<ScraperService>,
    pub engine: Arc<MatchingEngine>,
    /// Matches returned by `/match` when the request gives no `top_k`
    pub match_top_k: usize,
    /// Matches returned by `/scrape_and_match` when the request gives no `top_k`
    pub scrape_match_top_k: usize,
}

impl AppState {
    /// Creates a new `AppState` instance.
    #[must_use]
    pub fn new(scrapers: ScraperService, engine: MatchingEngine) -> Self {
        Self {
            scrapers: Arc::new(scrapers),
            engine: Arc::new(engine),
            match_top_k: 5,
            scrape_match_top_k: 10,
        }
    }

    /// Overrides the default match counts.
    #[must_use]
    pub fn with_top_k(mut self, match_top_k: usize, scrape_match_top_k: usize) -> Self {
        self.match_top_k = match_top_k;
        self.scrape_match_top_k = scrape_match_top_k;
        self
    }
}
