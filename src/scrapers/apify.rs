//! Apify REST client.
//!
//! Covers the three ways the scrapers talk to Apify: synchronous
//! `run-sync-get-dataset-items` calls, actor standby endpoints, and
//! asynchronous runs that are polled until their dataset is ready.

use std::time::{Duration, Instant};

use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::AppConfig;
use crate::scrapers::{ScrapeError, ScrapeResult};

/// Run states after which Apify will not make further progress.
const FAILED_RUN_STATES: [&str; 3] = ["FAILED", "TIMED-OUT", "ABORTED"];

/// Thin wrapper over a pooled `reqwest::Client` and an Apify token.
#[derive(Clone)]
pub struct ApifyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
    max_wait: Duration,
    run_sync_timeout: Duration,
}

impl std::fmt::Debug for ApifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApifyClient")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    data: RunData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunData {
    id: Option<String>,
    status: Option<String>,
    default_dataset_id: Option<String>,
}

impl ApifyClient {
    /// Creates a client with explicit endpoints and timings.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        poll_interval: Duration,
        max_wait: Duration,
        run_sync_timeout: Duration,
    ) -> ScrapeResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            poll_interval,
            max_wait,
            run_sync_timeout,
        })
    }

    /// Creates a client from the application configuration.
    pub fn from_config(config: &AppConfig) -> ScrapeResult<Self> {
        Self::new(
            config.apify_base_url.clone(),
            config.apify_api_key.clone(),
            Duration::from_secs(config.apify_poll_interval_secs.max(1)),
            Duration::from_secs(config.apify_run_max_wait_secs),
            Duration::from_secs(config.apify_run_sync_timeout_secs),
        )
    }

    pub fn run_sync_url(&self, actor_id: &str) -> String {
        format!(
            "{}/v2/acts/{actor_id}/run-sync-get-dataset-items",
            self.base_url
        )
    }

    pub fn runs_url(&self, actor_id: &str) -> String {
        format!("{}/v2/acts/{actor_id}/runs", self.base_url)
    }

    pub fn run_status_url(&self, run_id: &str) -> String {
        format!("{}/v2/actor-runs/{run_id}", self.base_url)
    }

    pub fn dataset_items_url(&self, dataset_id: &str) -> String {
        format!("{}/v2/datasets/{dataset_id}/items", self.base_url)
    }

    /// Runs an actor synchronously and returns its dataset items as JSON.
    pub async fn run_sync(&self, actor_id: &str, payload: &Value) -> ScrapeResult<Value> {
        let response = self
            .http
            .post(self.run_sync_url(actor_id))
            .query(&[("token", self.token.as_str())])
            .json(payload)
            .timeout(self.run_sync_timeout)
            .send()
            .await
            .map_err(strip_url)?;

        parse_json_response(response).await
    }

    /// Calls an actor standby endpoint with bearer authentication.
    pub async fn call_standby(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
    ) -> ScrapeResult<Value> {
        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(strip_url)?;

        let data = parse_json_response(response).await?;
        if data.get("status").and_then(Value::as_str) == Some("failed") {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("standby run failed");
            return Err(ScrapeError::Upstream(message.to_string()));
        }

        Ok(data)
    }

    /// Starts an asynchronous actor run and returns its run id.
    pub async fn start_run(&self, actor_id: &str, payload: &Value) -> ScrapeResult<String> {
        let response = self
            .http
            .post(self.runs_url(actor_id))
            .query(&[("token", self.token.as_str())])
            .json(payload)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(strip_url)?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Upstream(format!(
                "failed to start actor {actor_id}: {status} - {body}"
            )));
        }

        let envelope: RunEnvelope = response
            .json()
            .await
            .map_err(|e| ScrapeError::UnexpectedResponse(e.without_url().to_string()))?;

        envelope
            .data
            .id
            .ok_or_else(|| ScrapeError::UnexpectedResponse("run id missing".to_string()))
    }

    /// Polls a run until it succeeds and returns its default dataset id.
    pub async fn wait_for_run(&self, run_id: &str) -> ScrapeResult<String> {
        let started = Instant::now();

        loop {
            let response = self
                .http
                .get(self.run_status_url(run_id))
                .query(&[("token", self.token.as_str())])
                .timeout(Duration::from_secs(30))
                .send()
                .await
                .map_err(strip_url)?;

            if response.status() != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(ScrapeError::Upstream(format!(
                    "error checking run status: {body}"
                )));
            }

            let envelope: RunEnvelope = response
                .json()
                .await
                .map_err(|e| ScrapeError::UnexpectedResponse(e.without_url().to_string()))?;

            match evaluate_run(&envelope.data)? {
                Some(dataset_id) => return Ok(dataset_id),
                None if started.elapsed() >= self.max_wait => {
                    return Err(ScrapeError::RunFailed(format!(
                        "run {run_id} still pending after {}s",
                        self.max_wait.as_secs()
                    )));
                }
                None => {
                    tracing::debug!(run_id = %run_id, "Waiting for actor run to complete");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Fetches all items of a dataset.
    pub async fn fetch_dataset(&self, dataset_id: &str) -> ScrapeResult<Vec<Value>> {
        let response = self
            .http
            .get(self.dataset_items_url(dataset_id))
            .query(&[("token", self.token.as_str())])
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(strip_url)?;

        match parse_json_response(response).await? {
            Value::Array(items) => Ok(items),
            other => Err(ScrapeError::UnexpectedResponse(format!(
                "dataset {dataset_id} is not a list: {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Decides what to do with a polled run: `Some(dataset)` when finished,
/// `None` while pending, and an error once the run has failed.
fn evaluate_run(run: &RunData) -> ScrapeResult<Option<String>> {
    let status = run.status.as_deref().unwrap_or_default();

    if status == "SUCCEEDED" {
        if let Some(dataset_id) = run.default_dataset_id.clone() {
            return Ok(Some(dataset_id));
        }
    }

    if FAILED_RUN_STATES.contains(&status) {
        return Err(ScrapeError::RunFailed(format!("run ended with status {status}")));
    }

    Ok(None)
}

/// Drops the request URL from client errors so the token never reaches logs.
fn strip_url(err: reqwest::Error) -> ScrapeError {
    ScrapeError::Http(err.without_url())
}

async fn parse_json_response(response: reqwest::Response) -> ScrapeResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ScrapeError::Upstream(format!("{status} - {body}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ScrapeError::UnexpectedResponse(e.without_url().to_string()))
}

pub(crate) const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode as HttpStatus,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    fn client() -> ApifyClient {
        ApifyClient::new(
            "https://api.apify.com/",
            "secret-token",
            Duration::from_secs(5),
            Duration::from_secs(600),
            Duration::from_secs(600),
        )
        .unwrap()
    }

    fn run(status: &str, dataset: Option<&str>) -> RunData {
        RunData {
            id: Some("run1".to_string()),
            status: Some(status.to_string()),
            default_dataset_id: dataset.map(ToString::to_string),
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let c = client();
        assert_eq!(
            c.run_sync_url("p9QZzUdBCGXMDuKad"),
            "https://api.apify.com/v2/acts/p9QZzUdBCGXMDuKad/run-sync-get-dataset-items"
        );
        assert_eq!(
            c.runs_url("parseforge~james-edition-real-estate-scraper"),
            "https://api.apify.com/v2/acts/parseforge~james-edition-real-estate-scraper/runs"
        );
        assert_eq!(
            c.run_status_url("abc"),
            "https://api.apify.com/v2/actor-runs/abc"
        );
        assert_eq!(
            c.dataset_items_url("ds1"),
            "https://api.apify.com/v2/datasets/ds1/items"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_evaluate_run_succeeded() {
        let result = evaluate_run(&run("SUCCEEDED", Some("ds42"))).unwrap();
        assert_eq!(result, Some("ds42".to_string()));
    }

    #[test]
    fn test_evaluate_run_pending() {
        assert_eq!(evaluate_run(&run("RUNNING", None)).unwrap(), None);
        assert_eq!(evaluate_run(&run("READY", None)).unwrap(), None);
        // succeeded without a dataset yet keeps polling
        assert_eq!(evaluate_run(&run("SUCCEEDED", None)).unwrap(), None);
    }

    #[test]
    fn test_evaluate_run_failed_states() {
        for status in FAILED_RUN_STATES {
            let result = evaluate_run(&run(status, None));
            assert!(matches!(result, Err(ScrapeError::RunFailed(_))), "{status}");
        }
    }

    #[test]
    fn test_run_envelope_deserialize() {
        let json = r#"{"data": {"id": "r1", "status": "SUCCEEDED", "defaultDatasetId": "d1"}}"#;
        let envelope: RunEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.id.as_deref(), Some("r1"));
        assert_eq!(envelope.data.default_dataset_id.as_deref(), Some("d1"));
    }

    #[test]
    fn test_json_kind() {
        assert_eq!(json_kind(&json!([])), "array");
        assert_eq!(json_kind(&json!({})), "object");
        assert_eq!(json_kind(&Value::Null), "null");
    }

    // ============ HTTP 흐름 테스트 ============

    async fn apify_server() -> ApifyClient {
        let router = Router::new()
            .route(
                "/v2/acts/ok/runs",
                post(|| async {
                    (HttpStatus::CREATED, Json(json!({"data": {"id": "run-1", "status": "READY"}})))
                }),
            )
            .route(
                "/v2/acts/rejected/runs",
                post(|| async { (HttpStatus::OK, Json(json!({"data": {"id": "run-1"}}))) }),
            )
            .route(
                "/v2/acts/no-id/runs",
                post(|| async { (HttpStatus::CREATED, Json(json!({"data": {"status": "READY"}}))) }),
            )
            .route(
                "/v2/actor-runs/done",
                get(|| async {
                    Json(json!({"data": {"id": "done", "status": "SUCCEEDED", "defaultDatasetId": "ds-1"}}))
                }),
            )
            .route(
                "/v2/actor-runs/running",
                get(|| async { Json(json!({"data": {"id": "running", "status": "RUNNING"}})) }),
            )
            .route(
                "/v2/actor-runs/timed-out",
                get(|| async { Json(json!({"data": {"id": "timed-out", "status": "TIMED-OUT"}})) }),
            )
            .route(
                "/v2/datasets/ds-1/items",
                get(|| async { Json(json!([{"title": "Villa"}])) }),
            )
            .route(
                "/v2/datasets/ds-object/items",
                get(|| async { Json(json!({"items": []})) }),
            )
            .route(
                "/v2/acts/broken/run-sync-get-dataset-items",
                post(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, "actor crashed") }),
            )
            .route(
                "/standby/failed",
                post(|| async { Json(json!({"status": "failed", "error": "listing blocked"})) }),
            )
            .route(
                "/standby/ok",
                post(|| async { Json(json!({"title": "Flat"})) }),
            );

        let base = crate::test_server::spawn(router).await;
        ApifyClient::new(
            base,
            "secret-token",
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_run_returns_run_id() {
        let c = apify_server().await;
        assert_eq!(c.start_run("ok", &json!({})).await.unwrap(), "run-1");
    }

    #[tokio::test]
    async fn test_start_run_requires_created_status() {
        let c = apify_server().await;
        let result = c.start_run("rejected", &json!({})).await;
        assert!(matches!(result, Err(ScrapeError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_start_run_requires_run_id() {
        let c = apify_server().await;
        let result = c.start_run("no-id", &json!({})).await;
        assert!(matches!(result, Err(ScrapeError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_wait_for_run_returns_dataset() {
        let c = apify_server().await;
        assert_eq!(c.wait_for_run("done").await.unwrap(), "ds-1");
    }

    #[tokio::test]
    async fn test_wait_for_run_gives_up_after_max_wait() {
        let c = apify_server().await;
        match c.wait_for_run("running").await {
            Err(ScrapeError::RunFailed(msg)) => assert!(msg.contains("still pending")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_run_failed_status() {
        let c = apify_server().await;
        match c.wait_for_run("timed-out").await {
            Err(ScrapeError::RunFailed(msg)) => assert!(msg.contains("TIMED-OUT")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_dataset() {
        let c = apify_server().await;
        let items = c.fetch_dataset("ds-1").await.unwrap();
        assert_eq!(items, vec![json!({"title": "Villa"})]);

        let result = c.fetch_dataset("ds-object").await;
        assert!(matches!(result, Err(ScrapeError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_run_sync_upstream_error() {
        let c = apify_server().await;
        match c.run_sync("broken", &json!({})).await {
            Err(ScrapeError::Upstream(msg)) => assert!(msg.contains("actor crashed")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_standby_failed_body() {
        let c = apify_server().await;
        let base = c.base_url.clone();

        let result = c
            .call_standby(&format!("{base}/standby/failed"), &json!({}), Duration::from_secs(5))
            .await;
        match result {
            Err(ScrapeError::Upstream(msg)) => assert_eq!(msg, "listing blocked"),
            other => panic!("unexpected result: {other:?}"),
        }

        let data = c
            .call_standby(&format!("{base}/standby/ok"), &json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(data["title"], "Flat");
    }
}
