//! Image fingerprints.
//!
//! Every image yields a URL key built from the last path segment of its URL
//! (`u:` prefix) and, when the download succeeds, a content key built from
//! the xxh3 hash of its bytes (`c:` prefix). Two images are considered the
//! same when they share any key.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::{Client, Url};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use xxhash_rust::xxh3::xxh3_64;

use crate::matching::MatchingConfig;
use crate::models::NormalizedListing;

/// Key derived from the image file name.
pub fn url_key(url: &str) -> Option<String> {
    let segment = match Url::parse(url.trim()) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(str::to_string),
        Err(_) => url
            .trim()
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(str::to_string),
    }?;

    Some(format!("u:{}", segment.to_lowercase()))
}

/// Key derived from the image bytes.
pub fn content_key(bytes: &[u8]) -> String {
    format!("c:{:016x}", xxh3_64(bytes))
}

/// Share of the sale images with at least one key in `rental_keys`.
#[allow(clippy::cast_precision_loss)]
pub fn image_similarity(sale_images: &[Vec<String>], rental_keys: &HashSet<String>) -> f64 {
    let fingerprinted: Vec<&Vec<String>> = sale_images.iter().filter(|k| !k.is_empty()).collect();
    if fingerprinted.is_empty() || rental_keys.is_empty() {
        return 0.0;
    }

    let hits = fingerprinted
        .iter()
        .filter(|keys| keys.iter().any(|k| rental_keys.contains(k)))
        .count();
    hits as f64 / fingerprinted.len() as f64
}

/// Downloads and fingerprints listing images with bounded concurrency.
#[derive(Debug, Clone)]
pub struct ImageFingerprinter {
    client: Client,
    permits: Arc<Semaphore>,
    max_images: usize,
    max_bytes: usize,
    fetch_content: bool,
}

impl ImageFingerprinter {
    /// Fingerprinter that downloads images.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(config: &MatchingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.image_timeout)
            .connect_timeout(config.image_timeout)
            .build()?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_workers.max(1))),
            max_images: config.max_images_per_listing,
            max_bytes: config.max_image_bytes,
            fetch_content: true,
        })
    }

    /// Fingerprinter that never touches the network and only emits URL keys.
    pub fn url_only(config: &MatchingConfig) -> Self {
        Self {
            client: Client::new(),
            permits: Arc::new(Semaphore::new(config.max_workers.max(1))),
            max_images: config.max_images_per_listing,
            max_bytes: config.max_image_bytes,
            fetch_content: false,
        }
    }

    /// The images of a listing that get fingerprinted.
    pub fn selected_images(&self, listing: &NormalizedListing) -> Vec<String> {
        listing
            .real_images()
            .take(self.max_images)
            .map(str::to_string)
            .collect()
    }

    /// Keys for a single image.
    pub async fn fingerprint_image(&self, url: &str) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(key) = url_key(url) {
            keys.push(key);
        }
        if self.fetch_content {
            if let Some(bytes) = self.download(url).await {
                keys.push(content_key(&bytes));
            }
        }
        keys
    }

    /// Keys per image, in input order.
    pub async fn fingerprint_urls(&self, urls: Vec<String>) -> Vec<Vec<String>> {
        let mut results = vec![Vec::new(); urls.len()];
        let mut tasks = JoinSet::new();
        for (position, url) in urls.into_iter().enumerate() {
            let this = self.clone();
            tasks.spawn(async move { (position, this.fingerprint_image(&url).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, keys)) => results[position] = keys,
                Err(e) => tracing::warn!(error = %e, "Image fingerprint task failed"),
            }
        }
        results
    }

    /// Deduplicated keys for every listing, in input order.
    pub async fn fingerprint_listings(&self, listings: &[NormalizedListing]) -> Vec<Vec<String>> {
        let mut owners = Vec::new();
        let mut urls = Vec::new();
        for (position, listing) in listings.iter().enumerate() {
            for url in self.selected_images(listing) {
                owners.push(position);
                urls.push(url);
            }
        }

        let mut per_listing: Vec<Vec<String>> = vec![Vec::new(); listings.len()];
        for (owner, keys) in owners.into_iter().zip(self.fingerprint_urls(urls).await) {
            per_listing[owner].extend(keys);
        }
        for keys in &mut per_listing {
            keys.sort();
            keys.dedup();
        }
        per_listing
    }

    async fn download(&self, url: &str) -> Option<Vec<u8>> {
        let _permit = self.permits.acquire().await.ok()?;

        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e.without_url(), "Image download failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Image download rejected");
            return None;
        }

        let limit = u64::try_from(self.max_bytes).unwrap_or(u64::MAX);
        if let Some(length) = response.content_length().filter(|len| *len > limit) {
            tracing::debug!(length, limit, "Image too large, skipping content key");
            return None;
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > self.max_bytes {
                        tracing::debug!(limit, "Image body exceeded limit, skipping content key");
                        return None;
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e.without_url(), "Image body read failed");
                    return None;
                }
            }
        }

        (!body.is_empty()).then_some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingId, PLACEHOLDER_IMAGE};
    use axum::{http::StatusCode, routing::get, Router};

    fn listing(images: &[&str]) -> NormalizedListing {
        NormalizedListing {
            id: ListingId::Number(1),
            url: None,
            title: "Flat".to_string(),
            desc: "Nice".to_string(),
            price: 1000.0,
            rooms: 2,
            location: "Madrid".to_string(),
            images: images.iter().map(ToString::to_string).collect(),
            platform: None,
        }
    }

    #[test]
    fn test_url_key_uses_last_segment() {
        assert_eq!(
            url_key("https://img.idealista.com/blur/WEB_DETAIL/0/id.pro.es.image/ab/cd/Photo1.JPG?v=2").as_deref(),
            Some("u:photo1.jpg")
        );
        assert_eq!(url_key("https://cdn.example.com/a/b/").as_deref(), Some("u:b"));
        assert_eq!(url_key("relative/path/pic.png?x=1").as_deref(), Some("u:pic.png"));
        assert_eq!(url_key("https://cdn.example.com/"), None);
    }

    #[test]
    fn test_content_key_is_stable() {
        assert_eq!(content_key(b"jpeg bytes"), content_key(b"jpeg bytes"));
        assert_ne!(content_key(b"jpeg bytes"), content_key(b"png bytes"));
        assert!(content_key(b"x").starts_with("c:"));
    }

    #[test]
    fn test_image_similarity() {
        let rental: HashSet<String> = ["u:a.jpg", "c:0001"].iter().map(ToString::to_string).collect();
        let sale = vec![
            vec!["u:a.jpg".to_string()],
            vec!["u:z.jpg".to_string(), "c:0001".to_string()],
            vec!["u:q.jpg".to_string()],
            vec![],
        ];
        let score = image_similarity(&sale, &rental);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_image_similarity_empty_sides() {
        let rental: HashSet<String> = HashSet::new();
        assert_eq!(image_similarity(&[vec!["u:a".to_string()]], &rental), 0.0);
        let rental: HashSet<String> = ["u:a".to_string()].into_iter().collect();
        assert_eq!(image_similarity(&[], &rental), 0.0);
    }

    #[test]
    fn test_selected_images_skip_placeholder_and_cap() {
        let fp = ImageFingerprinter::url_only(&MatchingConfig::default());
        let l = listing(&[PLACEHOLDER_IMAGE, "https://img/1.jpg", "https://img/2.jpg", "https://img/3.jpg"]);
        assert_eq!(fp.selected_images(&l), vec!["https://img/1.jpg", "https://img/2.jpg"]);
    }

    #[tokio::test]
    async fn test_url_only_fingerprints_listings() {
        let fp = ImageFingerprinter::url_only(&MatchingConfig::default());
        let listings = vec![
            listing(&["https://img/b.jpg", "https://cdn/a.jpg", "https://img/c.jpg"]),
            listing(&[PLACEHOLDER_IMAGE]),
        ];

        let keys = fp.fingerprint_listings(&listings).await;
        assert_eq!(keys[0], vec!["u:a.jpg".to_string(), "u:b.jpg".to_string()]);
        assert!(keys[1].is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_urls_keeps_order() {
        let fp = ImageFingerprinter::url_only(&MatchingConfig::default());
        let keys = fp
            .fingerprint_urls(vec!["https://x/1.jpg".to_string(), "https://x/2.jpg".to_string()])
            .await;
        assert_eq!(keys, vec![vec!["u:1.jpg".to_string()], vec!["u:2.jpg".to_string()]]);
    }

    // ============ 이미지 다운로드 테스트 ============

    async fn image_server() -> String {
        let router = Router::new()
            .route("/small.jpg", get(|| async { vec![1_u8; 32] }))
            .route("/large.jpg", get(|| async { vec![2_u8; 4096] }))
            .route("/missing.jpg", get(|| async { StatusCode::NOT_FOUND }));
        crate::test_server::spawn(router).await
    }

    fn capped(max_image_bytes: usize) -> ImageFingerprinter {
        ImageFingerprinter::new(&MatchingConfig {
            max_image_bytes,
            ..MatchingConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_download_adds_content_key() {
        let base = image_server().await;
        let keys = capped(1024).fingerprint_image(&format!("{base}/small.jpg")).await;

        assert_eq!(keys, vec!["u:small.jpg".to_string(), content_key(&[1_u8; 32])]);
    }

    #[tokio::test]
    async fn test_download_skips_oversized_images() {
        let base = image_server().await;
        let fp = capped(1024);

        let keys = fp.fingerprint_image(&format!("{base}/large.jpg")).await;
        assert_eq!(keys, vec!["u:large.jpg".to_string()]);

        let keys = fp.fingerprint_image(&format!("{base}/small.jpg")).await;
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_download_failure_keeps_url_key() {
        let base = image_server().await;
        let keys = capped(1024).fingerprint_image(&format!("{base}/missing.jpg")).await;

        assert_eq!(keys, vec!["u:missing.jpg".to_string()]);
    }
}
