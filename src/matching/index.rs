//! Rental index file model.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::matching::ImageFingerprinter;
use crate::models::{normalize_scraped_listing, NormalizedListing};
use crate::scrapers::Provider;
use crate::utils::json::get_str;

/// Provider tag used when neither the record nor the caller names one.
const UNKNOWN_PROVIDER: &str = "unknown";

/// A rental listing with its precomputed image keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRental {
    pub listing: NormalizedListing,
    #[serde(default)]
    pub image_fingerprints: Vec<String>,
}

impl IndexedRental {
    pub fn fingerprint_set(&self) -> HashSet<String> {
        self.image_fingerprints.iter().cloned().collect()
    }
}

/// Rental listings the engine matches sale listings against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RentalIndex {
    rentals: Vec<IndexedRental>,
    #[serde(default)]
    built_at: Option<DateTime<Utc>>,
}

impl RentalIndex {
    pub fn new(rentals: Vec<IndexedRental>) -> Self {
        Self {
            rentals,
            built_at: Some(Utc::now()),
        }
    }

    pub fn len(&self) -> usize {
        self.rentals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rentals.is_empty()
    }

    pub fn rentals(&self) -> &[IndexedRental] {
        &self.rentals
    }

    pub const fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }
}

/// Normalizes raw rental records and fingerprints their images.
///
/// A record's own `provider` or `source` field takes precedence over
/// `default_provider`. Records that do not normalize are skipped.
pub async fn build_rental_index(
    records: &[Value],
    default_provider: Option<&str>,
    fingerprinter: &ImageFingerprinter,
) -> RentalIndex {
    let listings: Vec<NormalizedListing> = records
        .iter()
        .filter_map(|record| {
            let tag = get_str(record, "provider")
                .or_else(|| get_str(record, "source"))
                .or(default_provider)
                .unwrap_or(UNKNOWN_PROVIDER);
            let provider = match Provider::parse(tag) {
                Some(provider) => provider.as_str(),
                None => tag,
            };
            normalize_scraped_listing(provider, record)
        })
        .collect();

    let skipped = records.len() - listings.len();
    if skipped > 0 {
        tracing::warn!(skipped, "Skipped records that could not be normalized");
    }

    let fingerprints = fingerprinter.fingerprint_listings(&listings).await;
    let rentals = listings
        .into_iter()
        .zip(fingerprints)
        .map(|(listing, image_fingerprints)| IndexedRental {
            listing,
            image_fingerprints,
        })
        .collect();

    RentalIndex::new(rentals)
}
