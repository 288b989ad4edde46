//! James Edition scraper (luxury listings worldwide).

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};

use crate::scrapers::{ApifyClient, ListingScraper, Provider, ScrapeError, ScrapeResult};

/// Scrapes James Edition listings with an asynchronous actor run: start,
/// poll until finished, then read the default dataset.
#[derive(Debug, Clone)]
pub struct JamesEditionScraper {
    client: ApifyClient,
    actor_id: String,
}

impl JamesEditionScraper {
    pub fn new(client: ApifyClient, actor_id: impl Into<String>) -> Self {
        Self {
            client,
            actor_id: actor_id.into(),
        }
    }

    pub fn prepare_payload(url: &str, max_items: u32) -> Value {
        json!({
            "startUrl": url,
            "maxItems": max_items,
        })
    }
}

#[async_trait]
impl ListingScraper for JamesEditionScraper {
    fn provider(&self) -> Provider {
        Provider::JamesEdition
    }

    fn validate_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if !host.ends_with("jamesedition.com") {
            return false;
        }

        let path = parsed.path().to_ascii_lowercase();
        path.starts_with("/real_estate/") || path.starts_with("/real-estate/")
    }

    async fn scrape(&self, url: &str) -> ScrapeResult<Vec<Value>> {
        if !self.validate_url(url) {
            return Err(ScrapeError::InvalidUrl(
                "Invalid James Edition property URL.".to_string(),
            ));
        }

        let payload = Self::prepare_payload(url.trim(), 1);
        let run_id = self.client.start_run(&self.actor_id, &payload).await?;
        tracing::info!(run_id = %run_id, "James Edition run started");

        let dataset_id = self.client.wait_for_run(&run_id).await?;
        let items = self.client.fetch_dataset(&dataset_id).await?;

        if items.is_empty() {
            tracing::warn!(dataset_id = %dataset_id, "James Edition dataset empty");
            return Err(ScrapeError::Empty(
                "James Edition scraper returned no data. Verify the listing is public."
                    .to_string(),
            ));
        }

        Ok(items)
    }
}
