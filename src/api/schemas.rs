//! 요청/응답 스키마 모듈.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::matching::RentalMatch;
use crate::models::listing::{DEFAULT_DESCRIPTION, DEFAULT_LOCATION, DEFAULT_TITLE};
use crate::models::{ListingId, NormalizedListing, PLACEHOLDER_IMAGE};
use crate::scrapers::Provider;
use crate::services::ScrapeOutcome;
use crate::utils::json::as_f64_lenient;

/// Platform tag for listings supplied directly in a request body.
pub const PROVIDED_LISTING_PLATFORM: &str = "Provided Listing";

/// Request to scrape a single listing URL.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScrapeRequest {
    #[validate(url(message = "post_url must be a valid URL"))]
    pub post_url: String,
}

/// Request to scrape a listing URL and match it against the rental index.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScrapeAndMatchRequest {
    #[validate(url(message = "post_url must be a valid URL"))]
    pub post_url: String,

    /// Number of matches to return (1-50)
    #[validate(range(min = 1, max = 50, message = "top_k must be between 1 and 50"))]
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Sale listing supplied by the client. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SaleListing {
    #[serde(default)]
    pub id: Option<ListingId>,
    #[validate(url(message = "Invalid listing URL"))]
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[validate(range(min = 0.0, message = "price must not be negative"))]
    #[serde(default, deserialize_with = "lenient_price")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_rooms")]
    pub rooms: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl SaleListing {
    /// Fills missing fields with the normalizer's defaults.
    pub fn into_listing(self) -> NormalizedListing {
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

        let id = self.id.unwrap_or_else(|| {
            ListingId::hashed(self.url.as_deref().unwrap_or(PROVIDED_LISTING_PLATFORM))
        });
        let images: Vec<String> = self
            .images
            .unwrap_or_default()
            .into_iter()
            .filter(|url| !url.trim().is_empty())
            .collect();

        NormalizedListing {
            id,
            url: non_blank(self.url),
            title: non_blank(self.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            desc: non_blank(self.desc).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            price: self.price.unwrap_or(0.0),
            rooms: self.rooms.unwrap_or(0),
            location: non_blank(self.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            images: if images.is_empty() {
                vec![PLACEHOLDER_IMAGE.to_string()]
            } else {
                images
            },
            platform: Some(
                non_blank(self.platform).unwrap_or_else(|| PROVIDED_LISTING_PLATFORM.to_string()),
            ),
        }
    }
}

/// Accepts a number or a numeric string.
fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_f64_lenient(&value)
            .filter(|p| p.is_finite())
            .map(Some)
            .ok_or_else(|| de::Error::custom("price must be a number")),
    }
}

/// Accepts whole numbers given as integers, floats (`2.0`) or strings (`"2"`).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_rooms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_f64_lenient(&value)
            .filter(|r| r.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(r))
            .map(|r| Some(r as u32))
            .ok_or_else(|| de::Error::custom("rooms must be a whole non-negative number")),
    }
}

/// Request to match a provided sale listing.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MatchRequest {
    #[serde(default)]
    pub sale_url: Option<String>,

    #[validate(nested)]
    #[serde(default)]
    pub sale_listing: Option<SaleListing>,

    /// Number of matches to return (1-50)
    #[validate(range(min = 1, max = 50, message = "top_k must be between 1 and 50"))]
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl MatchRequest {
    /// Takes the sale listing out of the request.
    ///
    /// # Errors
    ///
    /// `BadRequest` when neither field is present, or when only `sale_url`
    /// is given (scraping belongs to `/scrape_and_match`).
    pub fn into_sale_listing(self) -> AppResult<SaleListing> {
        let has_url = self.sale_url.as_deref().is_some_and(|u| !u.trim().is_empty());
        match self.sale_listing {
            Some(listing) => Ok(listing),
            None if has_url => Err(AppError::BadRequest(
                "This endpoint requires 'sale_listing' data. To scrape a URL, use /scrape_and_match endpoint."
                    .to_string(),
            )),
            None => Err(AppError::BadRequest(
                "Provide either 'sale_url' or 'sale_listing' in the request body.".to_string(),
            )),
        }
    }
}

/// Response for `/scrape`.
#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub status: &'static str,
    pub provider: Provider,
    pub data: Vec<Value>,
    pub normalized: Vec<NormalizedListing>,
}

impl From<ScrapeOutcome> for ScrapeResponse {
    fn from(outcome: ScrapeOutcome) -> Self {
        Self {
            status: "success",
            provider: outcome.provider,
            data: outcome.data,
            normalized: outcome.normalized,
        }
    }
}

/// Response for `/match`.
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub sale_listing: NormalizedListing,
    pub matches: Vec<RentalMatch>,
}

/// Response for `/scrape_and_match`.
#[derive(Debug, Serialize)]
pub struct ScrapeAndMatchResponse {
    pub status: &'static str,
    pub provider: Provider,
    pub data: Vec<Value>,
    pub normalized: Vec<NormalizedListing>,
    pub sale_listing: NormalizedListing,
    pub matches: Vec<RentalMatch>,
}
