//! Listing model module.
//!
//! Contains the provider-independent listing shape and the normalization of
//! raw scraper records into it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::utils::json::{
    as_f64_lenient, ensure_list_of_strings, first_non_empty, first_truthy, get, get_path,
    get_str, is_truthy, value_to_text,
};
use crate::utils::price::parse_price_amount;

/// Image shown when a listing has no photos.
pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/400x250?text=Image+Not+Available";

/// Maximum number of images kept on a normalized listing.
pub const MAX_LISTING_IMAGES: usize = 3;

pub const DEFAULT_TITLE: &str = "Untitled Listing";
pub const DEFAULT_DESCRIPTION: &str = "Description not provided.";
pub const DEFAULT_LOCATION: &str = "Location not provided";

/// Listing identifier as reported by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListingId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl ListingId {
    /// Builds an id from a JSON scalar.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .or_else(|| Some(Self::Text(n.to_string()))),
            Value::String(s) if !s.trim().is_empty() => Some(Self::Text(s.trim().to_string())),
            _ => None,
        }
    }

    /// Deterministic fallback id derived from a seed string.
    #[allow(clippy::cast_possible_wrap)]
    pub fn hashed(seed: &str) -> Self {
        Self::Number((xxh3_64(seed.as_bytes()) % 1_000_000) as i64)
    }
}

/// Provider-independent listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub id: ListingId,
    #[serde(default)]
    pub url: Option<String>,
    pub title: String,
    pub desc: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub rooms: u32,
    pub location: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl NormalizedListing {
    /// Text used for lexical matching.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.desc, self.location)
    }

    /// Images excluding the placeholder.
    pub fn real_images(&self) -> impl Iterator<Item = &str> {
        self.images
            .iter()
            .map(String::as_str)
            .filter(|url| *url != PLACEHOLDER_IMAGE && !url.trim().is_empty())
    }
}

/// Normalizes a raw scraped record into a [`NormalizedListing`].
///
/// Returns `None` when the record is not an object or has no fields.
pub fn normalize_scraped_listing(provider: &str, raw: &Value) -> Option<NormalizedListing> {
    let object = raw.as_object()?;
    if object.is_empty() {
        return None;
    }

    let url = first_non_empty([
        get(raw, "listingUrl"),
        get(raw, "url"),
        get_path(raw, &["location", "listingUrl"]),
    ])
    .and_then(|v| value_to_text(&v));

    let id = first_non_empty([get(raw, "id"), get_path(raw, &["dataAttributes", "id"])])
        .and_then(|v| ListingId::from_value(&v))
        .unwrap_or_else(|| ListingId::hashed(url.as_deref().unwrap_or(provider)));

    let title = first_non_empty([get(raw, "title"), get(raw, "name")])
        .and_then(|v| value_to_text(&v))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let images = extract_images(raw);
    let location = extract_location(raw);

    Some(NormalizedListing {
        id,
        url,
        title,
        desc: extract_description(raw),
        price: extract_price(raw),
        rooms: extract_rooms(raw),
        location: if location.trim().is_empty() {
            DEFAULT_LOCATION.to_string()
        } else {
            location
        },
        images: if images.is_empty() {
            vec![PLACEHOLDER_IMAGE.to_string()]
        } else {
            images
        },
        platform: Some(provider.to_string()),
    })
}

fn extract_price(raw: &Value) -> f64 {
    let Some(block) = first_truthy([get(raw, "price"), get(raw, "priceInfo")]) else {
        return 0.0;
    };

    let amount = if block.is_object() {
        let direct = first_non_empty([
            get(block, "parsed"),
            get(block, "amount"),
            get(block, "dataPrice"),
            get(block, "value"),
        ])
        .and_then(|v| price_from_value(&v))
        .filter(|p| *p != 0.0);

        direct.or_else(|| get_str(block, "formatted").and_then(parse_price_amount))
    } else {
        price_from_value(block)
    };

    amount.filter(|p| p.is_finite()).unwrap_or(0.0)
}

fn price_from_value(value: &Value) -> Option<f64> {
    as_f64_lenient(value).or_else(|| value.as_str().and_then(parse_price_amount))
}

fn extract_location(raw: &Value) -> String {
    let Some(block) = first_truthy([
        get(raw, "location"),
        get(raw, "locationInfo"),
        get(raw, "address"),
    ]) else {
        return String::new();
    };

    if block.is_object() {
        let state = first_truthy([get(block, "state"), get(block, "region")]);
        [get(block, "city"), state, get(block, "country")]
            .into_iter()
            .flatten()
            .filter(|v| is_truthy(v))
            .filter_map(value_to_text)
            .map(|s| s.trim().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        value_to_text(block).unwrap_or_default()
    }
}

fn extract_images(raw: &Value) -> Vec<String> {
    let mut images = ["photos", "imageUrls", "images", "gallery"]
        .iter()
        .map(|key| ensure_list_of_strings(get(raw, key)))
        .find(|list| !list.is_empty())
        .unwrap_or_default();

    if images.is_empty() {
        if let Some(primary) = first_truthy([get(raw, "primaryImageUrl"), get(raw, "image")]) {
            images = ensure_list_of_strings(Some(primary));
        }
    }

    images.truncate(MAX_LISTING_IMAGES);
    images
}

fn extract_description(raw: &Value) -> String {
    let features = Value::String(ensure_list_of_strings(get(raw, "features")).join(" "));

    first_non_empty([
        get(raw, "description"),
        Some(&features),
        get(raw, "summary"),
        get(raw, "propertyType"),
    ])
    .and_then(|v| value_to_text(&v))
    .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn extract_rooms(raw: &Value) -> u32 {
    first_non_empty([
        get(raw, "rooms"),
        get(raw, "bedrooms"),
        get(raw, "bedroomCount"),
        get(raw, "roomCount"),
    ])
    .and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<u32>().ok().map(f64::from),
        _ => None,
    })
    .filter(|r| r.is_finite() && *r >= 0.0)
    .map_or(0, |r| r as u32)
}
