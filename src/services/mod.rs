//! 서비스 모듈.

pub mod scraper_service;

pub use scraper_service::{ScrapeOutcome, ScraperService};
