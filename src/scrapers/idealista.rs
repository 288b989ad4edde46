//! Idealista scraper (Spain, Portugal, Italy).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Map, Value};

use crate::scrapers::apify::json_kind;
use crate::scrapers::{ApifyClient, ListingScraper, Provider, ScrapeError, ScrapeResult};
use crate::utils::json::{first_truthy, get, get_path, get_str, is_truthy, object_or_empty};
use crate::utils::price::split_price_currency;

const IDEALISTA_DOMAINS: [&str; 3] = ["idealista.com", "idealista.pt", "idealista.it"];

const NO_DATA_MESSAGE: &str = "Idealista scraper returned no data. Verify the listing is public.";

/// Timeout the actor is asked to respect for a single page.
const ACTOR_TIMEOUT_SECS: u64 = 30;

/// Scrapes single Idealista listings through the standby actor, falling back
/// to a synchronous actor run.
#[derive(Debug, Clone)]
pub struct IdealistaScraper {
    client: ApifyClient,
    standby_url: String,
    actor_id: String,
}

impl IdealistaScraper {
    pub fn new(
        client: ApifyClient,
        standby_url: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            standby_url: standby_url.into(),
            actor_id: actor_id.into(),
        }
    }

    /// Canonicalizes a user-supplied Idealista URL.
    ///
    /// Adds a scheme when missing, collapses doubled `www.` prefixes, switches
    /// idealista.com property pages to their English path and trims trailing
    /// `?`/`&`.
    pub fn normalize_url(url: &str) -> Option<String> {
        let candidate = url.trim();
        if candidate.is_empty() {
            return None;
        }

        let with_scheme = if candidate.contains("//") {
            candidate.to_string()
        } else {
            format!("https://{}", candidate.trim_start_matches('/'))
        };

        let parsed = Url::parse(&with_scheme).ok()?;
        let mut host = parsed.host_str()?.to_ascii_lowercase();
        while host.starts_with("www.www.") {
            host = host.replacen("www.", "", 1);
        }

        let mut path = parsed.path().to_string();
        if host.ends_with("idealista.com") && path.to_ascii_lowercase().starts_with("/inmueble/") {
            path = format!("/en{path}");
        }

        let mut normalized = format!("{}://{host}", parsed.scheme());
        if let Some(port) = parsed.port() {
            normalized.push_str(&format!(":{port}"));
        }
        normalized.push_str(&path);
        if let Some(query) = parsed.query() {
            normalized.push('?');
            normalized.push_str(query);
        }
        if let Some(fragment) = parsed.fragment() {
            normalized.push('#');
            normalized.push_str(fragment);
        }

        Some(normalized.trim_end_matches(['?', '&']).to_string())
    }

    /// Actor input for a single listing.
    pub fn prepare_payload(url: &str) -> Value {
        json!({
            "Url": url,
            "proxyConfig": {
                "useApifyProxy": true,
                "apifyProxyGroups": ["RESIDENTIAL"],
            },
            "maxRetries": 2,
            "timeout": ACTOR_TIMEOUT_SECS,
            "saveMapImages": true,
            "includeGallery": true,
            "extractContactInfo": true,
        })
    }

    /// Reshapes the actor output, keeping every original field and adding
    /// the derived ones the normalizer reads.
    pub fn process_result(raw: &Value) -> Value {
        let mut processed = object_or_empty(Some(raw));

        let price_raw = get(raw, "price")
            .and_then(|p| match p {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        let (amount, currency) = split_price_currency(&price_raw);

        let location = match get(raw, "location") {
            Some(loc @ Value::Object(_)) => json!({
                "address": get(loc, "address"),
                "city": get(loc, "city"),
                "state": get(loc, "region"),
                "country": get(loc, "country"),
                "coordinates": get(loc, "coordinates"),
            }),
            other => json!({
                "address": get(raw, "address"),
                "city": other.filter(|v| v.is_string()).or_else(|| get(raw, "city")),
                "state": get(raw, "province"),
                "country": get(raw, "country"),
                "coordinates": get(raw, "coordinates"),
            }),
        };

        let living_area = first_truthy([
            get_path(raw, &["propertySpecs", "constructedArea"]),
            get_path(raw, &["propertySpecs", "livingArea"]),
        ])
        .cloned()
        .unwrap_or(Value::Null);

        let mut features: Vec<Value> = Vec::new();
        for key in ["characteristics", "building"] {
            if let Some(Value::Array(items)) = get(raw, key) {
                features.extend(items.iter().cloned());
            }
        }

        let mut image_urls: Vec<String> = get(raw, "gallery")
            .and_then(Value::as_array)
            .map(|gallery| {
                gallery
                    .iter()
                    .filter_map(|img| get_str(img, "url"))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if image_urls.is_empty() {
            if let Some(main) = get_str(raw, "MainImage") {
                image_urls.push(main.to_string());
            }
        }

        let contact = object_or_empty(get(raw, "contactInfo"));
        let contact = Value::Object(contact);
        let office = json!({
            "name": first_truthy([get(&contact, "professionalName"), get(&contact, "name")]),
            "phone": get(&contact, "phones"),
            "email": get(&contact, "email"),
            "logo": get(&contact, "logo"),
            "url": get(&contact, "agencyWebsite"),
        });

        let listing_url = first_truthy([get(raw, "Url"), get(raw, "listingUrl"), get(raw, "url")])
            .cloned()
            .unwrap_or(Value::Null);
        let primary_image = get_str(raw, "MainImage")
            .map(ToString::to_string)
            .or_else(|| image_urls.first().cloned());

        let insert = |map: &mut Map<String, Value>, key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        insert(&mut processed, "source", json!(Provider::Idealista.as_str()));
        insert(&mut processed, "listingUrl", listing_url);
        insert(&mut processed, "primaryImageUrl", json!(primary_image));
        insert(&mut processed, "imageUrls", json!(image_urls));
        insert(&mut processed, "featureList", Value::Array(features));
        insert(&mut processed, "locationInfo", location);
        insert(
            &mut processed,
            "livingAreaInfo",
            json!({"value": living_area, "unit": "m²"}),
        );
        let formatted = if price_raw.is_empty() {
            "Price on request".to_string()
        } else {
            price_raw
        };
        insert(
            &mut processed,
            "priceInfo",
            json!({"amount": amount, "currency": currency, "formatted": formatted}),
        );
        insert(
            &mut processed,
            "bedroomCount",
            get_path(raw, &["propertySpecs", "rooms"]).cloned().unwrap_or(Value::Null),
        );
        insert(
            &mut processed,
            "bathroomCount",
            get_path(raw, &["propertySpecs", "bathrooms"]).cloned().unwrap_or(Value::Null),
        );
        insert(&mut processed, "office", office);

        Value::Object(processed)
    }

    /// Picks the listing out of a run-sync response.
    ///
    /// An empty dataset means the listing yielded nothing; any other shape
    /// is an unexpected response.
    fn first_dataset_item(data: Value) -> ScrapeResult<Value> {
        match data {
            Value::Array(items) => Self::first_of(items),
            Value::Object(mut map) => match map.remove("items") {
                Some(Value::Array(items)) => Self::first_of(items),
                _ => Err(ScrapeError::UnexpectedResponse(
                    "Idealista run-sync response has no items".to_string(),
                )),
            },
            other => Err(ScrapeError::UnexpectedResponse(format!(
                "Idealista run-sync returned {}",
                json_kind(&other)
            ))),
        }
    }

    fn first_of(mut items: Vec<Value>) -> ScrapeResult<Value> {
        if items.is_empty() {
            tracing::warn!("Idealista run-sync returned an empty dataset");
            return Err(ScrapeError::Empty(NO_DATA_MESSAGE.to_string()));
        }
        Ok(items.swap_remove(0))
    }
}

#[async_trait]
impl ListingScraper for IdealistaScraper {
    fn provider(&self) -> Provider {
        Provider::Idealista
    }

    fn validate_url(&self, url: &str) -> bool {
        Self::normalize_url(url)
            .is_some_and(|normalized| IDEALISTA_DOMAINS.iter().any(|d| normalized.contains(d)))
    }

    async fn scrape(&self, url: &str) -> ScrapeResult<Vec<Value>> {
        let normalized = Self::normalize_url(url)
            .filter(|_| self.validate_url(url))
            .ok_or_else(|| {
                ScrapeError::InvalidUrl(
                    "Invalid URL. Provide a valid Idealista property URL.".to_string(),
                )
            })?;

        let payload = Self::prepare_payload(&normalized);
        tracing::info!(url = %normalized, "Calling Idealista actor");

        let standby_timeout = Duration::from_secs(ACTOR_TIMEOUT_SECS + 5);
        let raw = match self
            .client
            .call_standby(&self.standby_url, &payload, standby_timeout)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Idealista standby endpoint failed, falling back to run-sync"
                );
                let data = self.client.run_sync(&self.actor_id, &payload).await?;
                Self::first_dataset_item(data)?
            }
        };

        if !is_truthy(&raw) {
            tracing::warn!(url = %normalized, "Idealista scraper returned empty response");
            return Err(ScrapeError::Empty(NO_DATA_MESSAGE.to_string()));
        }

        Ok(vec![Self::process_result(&raw)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};

    fn scraper() -> IdealistaScraper {
        let client = ApifyClient::new(
            "https://api.apify.com",
            "token",
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .unwrap();
        IdealistaScraper::new(client, "https://standby.example/", "actor")
    }

    // ============ URL 정규화 테스트 ============

    #[test]
    fn test_normalize_adds_scheme_and_english_path() {
        assert_eq!(
            IdealistaScraper::normalize_url("www.idealista.com/inmueble/123/").as_deref(),
            Some("https://www.idealista.com/en/inmueble/123/")
        );
    }

    #[test]
    fn test_normalize_keeps_english_path() {
        assert_eq!(
            IdealistaScraper::normalize_url("https://www.idealista.com/en/inmueble/123/")
                .as_deref(),
            Some("https://www.idealista.com/en/inmueble/123/")
        );
    }

    #[test]
    fn test_normalize_collapses_www() {
        assert_eq!(
            IdealistaScraper::normalize_url("https://www.www.www.idealista.pt/imovel/9/")
                .as_deref(),
            Some("https://www.idealista.pt/imovel/9/")
        );
    }

    #[test]
    fn test_normalize_trims_trailing_query_marks() {
        assert_eq!(
            IdealistaScraper::normalize_url("https://www.idealista.it/immobile/5/?").as_deref(),
            Some("https://www.idealista.it/immobile/5/")
        );
        assert_eq!(
            IdealistaScraper::normalize_url("https://www.idealista.it/immobile/5/?a=1&")
                .as_deref(),
            Some("https://www.idealista.it/immobile/5/?a=1")
        );
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(IdealistaScraper::normalize_url("   "), None);
    }

    #[test]
    fn test_validate_url() {
        let s = scraper();
        assert!(s.validate_url("https://www.idealista.com/inmueble/1/"));
        assert!(s.validate_url("idealista.pt/imovel/2/"));
        assert!(!s.validate_url("https://www.immobiliare.it/annunci/1/"));
        assert!(!s.validate_url(""));
    }

    #[test]
    fn test_prepare_payload() {
        let payload = IdealistaScraper::prepare_payload("https://www.idealista.com/en/inmueble/1/");
        assert_eq!(payload["Url"], "https://www.idealista.com/en/inmueble/1/");
        assert_eq!(payload["proxyConfig"]["apifyProxyGroups"][0], "RESIDENTIAL");
        assert_eq!(payload["maxRetries"], 2);
        assert_eq!(payload["timeout"], 30);
        assert_eq!(payload["includeGallery"], true);
    }

    // ============ 결과 처리 테스트 ============

    #[test]
    fn test_process_result() {
        let raw = json!({
            "Url": "https://www.idealista.com/en/inmueble/1/",
            "title": "Flat",
            "price": "350,000 €",
            "location": {"city": "Madrid", "region": "Madrid", "country": "Spain"},
            "propertySpecs": {"constructedArea": 95, "rooms": 3, "bathrooms": 2},
            "characteristics": ["Lift"],
            "building": ["Doorman"],
            "gallery": [{"url": "https://img/1.jpg"}, {"url": "https://img/2.jpg"}],
            "contactInfo": {"professionalName": "Agency", "phones": ["+34 600"]}
        });

        let processed = IdealistaScraper::process_result(&raw);

        assert_eq!(processed["source"], "idealista");
        assert_eq!(processed["title"], "Flat");
        assert_eq!(processed["listingUrl"], "https://www.idealista.com/en/inmueble/1/");
        assert_eq!(processed["priceInfo"]["amount"], 350_000.0);
        assert_eq!(processed["priceInfo"]["currency"], "€");
        assert_eq!(processed["locationInfo"]["state"], "Madrid");
        assert_eq!(processed["livingAreaInfo"]["value"], 95);
        assert_eq!(processed["featureList"], json!(["Lift", "Doorman"]));
        assert_eq!(processed["imageUrls"].as_array().unwrap().len(), 2);
        assert_eq!(processed["primaryImageUrl"], "https://img/1.jpg");
        assert_eq!(processed["bedroomCount"], 3);
        assert_eq!(processed["bathroomCount"], 2);
        assert_eq!(processed["office"]["name"], "Agency");
    }

    #[test]
    fn test_process_result_without_price_or_gallery() {
        let raw = json!({"location": "Valencia", "MainImage": "https://img/main.jpg"});
        let processed = IdealistaScraper::process_result(&raw);

        assert_eq!(processed["priceInfo"]["formatted"], "Price on request");
        assert!(processed["priceInfo"]["amount"].is_null());
        assert_eq!(processed["locationInfo"]["city"], "Valencia");
        assert_eq!(processed["imageUrls"], json!(["https://img/main.jpg"]));
    }

    #[test]
    fn test_first_dataset_item() {
        let item = IdealistaScraper::first_dataset_item(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(item, json!({"a": 1}));

        let item = IdealistaScraper::first_dataset_item(json!({"items": [{"b": 1}]})).unwrap();
        assert_eq!(item, json!({"b": 1}));

        assert!(matches!(
            IdealistaScraper::first_dataset_item(json!([])),
            Err(ScrapeError::Empty(_))
        ));
        assert!(matches!(
            IdealistaScraper::first_dataset_item(json!({"items": []})),
            Err(ScrapeError::Empty(_))
        ));
        assert!(matches!(
            IdealistaScraper::first_dataset_item(json!({"data": 1})),
            Err(ScrapeError::UnexpectedResponse(_))
        ));
        assert!(matches!(
            IdealistaScraper::first_dataset_item(json!("oops")),
            Err(ScrapeError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_scrape_rejects_foreign_url() {
        let result = scraper().scrape("https://www.jamesedition.com/real_estate/x").await;
        assert!(matches!(result, Err(ScrapeError::InvalidUrl(_))));
    }

    // ============ standby / run-sync 흐름 테스트 ============

    /// Standby endpoint answering 500 and run-sync answering with `dataset`.
    async fn fallback_scraper(dataset: Value) -> IdealistaScraper {
        let router = Router::new()
            .route(
                "/standby",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "standby down") }),
            )
            .route(
                "/v2/acts/actor/run-sync-get-dataset-items",
                post(move || async move { Json(dataset) }),
            );
        let base = crate::test_server::spawn(router).await;
        let client = ApifyClient::new(
            base.clone(),
            "token",
            Duration::from_millis(10),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .unwrap();
        IdealistaScraper::new(client, format!("{base}/standby"), "actor")
    }

    #[tokio::test]
    async fn test_scrape_falls_back_to_run_sync() {
        let scraper = fallback_scraper(json!([{"title": "Flat", "price": "250.000 €"}])).await;

        let records = scraper.scrape("https://www.idealista.com/inmueble/1/").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "Flat");
        assert_eq!(records[0]["source"], "idealista");
    }

    #[tokio::test]
    async fn test_empty_fallback_dataset_is_not_found() {
        for dataset in [json!([]), json!({"items": []})] {
            let scraper = fallback_scraper(dataset).await;
            let err = scraper
                .scrape("https://www.idealista.com/inmueble/1/")
                .await
                .unwrap_err();

            assert!(matches!(err, ScrapeError::Empty(ref msg) if msg == NO_DATA_MESSAGE));
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_standby_success_skips_run_sync() {
        let router = Router::new().route(
            "/standby",
            post(|| async { Json(json!({"title": "Ático", "price": 900_000})) }),
        );
        let base = crate::test_server::spawn(router).await;
        let client = ApifyClient::new(
            base.clone(),
            "token",
            Duration::from_millis(10),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .unwrap();
        let scraper = IdealistaScraper::new(client, format!("{base}/standby"), "actor");

        let records = scraper.scrape("https://www.idealista.com/inmueble/2/").await.unwrap();
        assert_eq!(records[0]["title"], "Ático");
        assert_eq!(records[0]["priceInfo"]["amount"], 900_000.0);
    }
}
