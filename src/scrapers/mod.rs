//! Listing scrapers backed by hosted Apify actors.
//!
//! Each supported portal gets a [`ListingScraper`] implementation that knows
//! which URLs it accepts, how to build the actor input and how to reshape the
//! actor output into a record that `normalize_scraped_listing` understands.

pub mod apify;
pub mod idealista;
pub mod immobiliare;
pub mod james_edition;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use apify::ApifyClient;
pub use idealista::IdealistaScraper;
pub use immobiliare::ImmobiliareScraper;
pub use james_edition::JamesEditionScraper;

/// Supported listing portals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Idealista,
    Immobiliare,
    JamesEdition,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idealista => "idealista",
            Self::Immobiliare => "immobiliare",
            Self::JamesEdition => "james_edition",
        }
    }

    /// Human-readable portal name used in error messages.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Idealista => "Idealista",
            Self::Immobiliare => "Immobiliare",
            Self::JamesEdition => "James Edition",
        }
    }

    /// Parses a provider tag as written in raw records (`source`/`provider`).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "idealista" => Some(Self::Idealista),
            "immobiliare" => Some(Self::Immobiliare),
            "james_edition" | "jamesedition" => Some(Self::JamesEdition),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by scraper clients.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("{0}")]
    InvalidUrl(String),

    #[error("Scraper service not configured. Set APIFY_API_KEY in environment.")]
    NotConfigured,

    #[error("{0}")]
    Empty(String),

    #[error("Apify request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Apify returned an error: {0}")]
    Upstream(String),

    #[error("Unexpected response format from Apify: {0}")]
    UnexpectedResponse(String),

    #[error("Actor run did not succeed: {0}")]
    RunFailed(String),
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// A client able to scrape single listings from one portal.
#[async_trait]
pub trait ListingScraper: Send + Sync {
    fn provider(&self) -> Provider;

    /// Returns `true` when the URL belongs to this scraper's portal.
    fn validate_url(&self, url: &str) -> bool;

    /// Scrapes the listing and returns the raw records.
    async fn scrape(&self, url: &str) -> ScrapeResult<Vec<Value>>;
}
