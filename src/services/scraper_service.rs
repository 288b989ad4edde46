//! Scraper service.
//!
//! Routes a listing URL to the first scraper that accepts it, runs the
//! scrape and normalizes the records. Outcomes are cached in Redis
//! (MessagePack) when a cache pool is available.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool as RedisPool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{normalize_scraped_listing, NormalizedListing};
use crate::scrapers::{
    ApifyClient, IdealistaScraper, ImmobiliareScraper, JamesEditionScraper, ListingScraper,
    Provider, ScrapeError, ScrapeResult,
};
use crate::utils::json::is_truthy;

const NO_MATCHING_SCRAPER: &str =
    "URL does not match any supported scraper (Idealista, Immobiliare, James Edition).";
const NO_VALID_DATA: &str =
    "No valid data returned. Check if the URL is correct and the property is available.";

/// Result of scraping one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub provider: Provider,
    pub data: Vec<Value>,
    pub normalized: Vec<NormalizedListing>,
    pub scraped_at: DateTime<Utc>,
}

/// Provider workflows plus the optional result cache.
pub struct ScraperService {
    scrapers: Vec<Arc<dyn ListingScraper>>,
    cache: Option<RedisPool>,
    cache_ttl_secs: u64,
}

impl std::fmt::Debug for ScraperService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperService")
            .field(
                "providers",
                &self.scrapers.iter().map(|s| s.provider()).collect::<Vec<_>>(),
            )
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl ScraperService {
    /// Creates a service over explicit scrapers, tried in the given order.
    pub fn new(
        scrapers: Vec<Arc<dyn ListingScraper>>,
        cache: Option<RedisPool>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            scrapers,
            cache,
            cache_ttl_secs,
        }
    }

    /// Builds the Idealista, Immobiliare and James Edition workflows.
    ///
    /// Without an Apify token no workflow is registered and every scrape
    /// fails with a configuration error.
    pub fn from_config(config: &AppConfig, cache: Option<RedisPool>) -> ScrapeResult<Self> {
        if !config.scrapers_configured() {
            tracing::warn!("APIFY_API_KEY not found; scraping endpoints will return errors");
            return Ok(Self::new(Vec::new(), cache, config.cache_ttl_secs));
        }

        let client = ApifyClient::from_config(config)?;
        let scrapers: Vec<Arc<dyn ListingScraper>> = vec![
            Arc::new(IdealistaScraper::new(
                client.clone(),
                config.idealista_standby_url.clone(),
                config.idealista_actor_id.clone(),
            )),
            Arc::new(ImmobiliareScraper::new(
                client.clone(),
                config.immobiliare_actor_id.clone(),
            )),
            Arc::new(JamesEditionScraper::new(
                client,
                config.james_edition_actor_id.clone(),
            )),
        ];

        Ok(Self::new(scrapers, cache, config.cache_ttl_secs))
    }

    pub fn is_configured(&self) -> bool {
        !self.scrapers.is_empty()
    }

    pub const fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub const fn cache_pool(&self) -> Option<&RedisPool> {
        self.cache.as_ref()
    }

    /// The first scraper whose URL check accepts `url`.
    pub fn scraper_for(&self, url: &str) -> Option<&Arc<dyn ListingScraper>> {
        self.scrapers.iter().find(|s| s.validate_url(url))
    }

    /// Scrapes and normalizes a listing URL.
    ///
    /// # Errors
    ///
    /// - `Internal` when no Apify token is configured
    /// - `BadRequest` when no scraper accepts the URL
    /// - `NotFound` when the scraper returns nothing usable
    /// - `Upstream` when the Apify call fails
    pub async fn scrape_url(&self, url: &str) -> AppResult<ScrapeOutcome> {
        if !self.is_configured() {
            return Err(ScrapeError::NotConfigured.into());
        }

        let scraper = self
            .scraper_for(url)
            .ok_or_else(|| AppError::BadRequest(NO_MATCHING_SCRAPER.to_string()))?;
        let provider = scraper.provider();
        tracing::info!(provider = %provider, "Matched URL to provider");

        let cache_key = cache_key(provider, url);
        if let Some(outcome) = self.cached(&cache_key).await {
            tracing::info!(provider = %provider, "Scrape served from cache");
            return Ok(outcome);
        }

        tracing::info!(provider = %provider, url = %url, "Starting scrape");
        let data = scraper.scrape(url).await?;

        if !has_content(&data) {
            tracing::error!(provider = %provider, "Scraper returned empty data");
            return Err(AppError::NotFound(NO_VALID_DATA.to_string()));
        }

        let normalized: Vec<NormalizedListing> = data
            .iter()
            .filter_map(|record| normalize_scraped_listing(provider.as_str(), record))
            .collect();

        let outcome = ScrapeOutcome {
            provider,
            data,
            normalized,
            scraped_at: Utc::now(),
        };
        self.store(&cache_key, &outcome).await;

        Ok(outcome)
    }

    async fn cached(&self, key: &str) -> Option<ScrapeOutcome> {
        let pool = self.cache.as_ref()?;
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection error, skipping cache read");
                return None;
            }
        };

        let bytes = match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cache read failed");
                return None;
            }
        };

        match rmp_serde::from_slice::<ScrapeOutcome>(&bytes?) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    async fn store(&self, key: &str, outcome: &ScrapeOutcome) {
        let Some(pool) = self.cache.as_ref() else {
            return;
        };

        let data = match rmp_serde::to_vec_named(outcome) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(cache_key = %key, error = %e, "Failed to serialize scrape outcome");
                return;
            }
        };

        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection error, skipping cache write");
                return;
            }
        };

        let result: Result<(), deadpool_redis::redis::RedisError> =
            conn.set_ex(key, data, self.cache_ttl_secs).await;
        if let Err(e) = result {
            tracing::error!(cache_key = %key, error = %e, "Failed to cache scrape outcome");
        }
    }
}

/// `scrape:{provider}:{xxh3(url)}`.
fn cache_key(provider: Provider, url: &str) -> String {
    format!("scrape:{provider}:{:016x}", xxh3_64(url.trim().as_bytes()))
}

/// A result is usable when it is non-empty and its first record carries a
/// truthy value.
fn has_content(data: &[Value]) -> bool {
    match data.first() {
        Some(Value::Object(record)) => record.values().any(is_truthy),
        Some(other) => is_truthy(other),
        None => false,
    }
}
