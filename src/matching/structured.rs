//! Similarity over structured listing fields.

use std::collections::HashSet;

use crate::matching::text::tokenize;
use crate::models::listing::DEFAULT_LOCATION;
use crate::models::NormalizedListing;

/// 1.0 for equal room counts, 0.5 one apart, 0.0 otherwise.
/// An unknown count (0) scores 0.5.
pub fn room_similarity(a: u32, b: u32) -> f64 {
    if a == 0 || b == 0 {
        return 0.5;
    }
    match a.abs_diff(b) {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    }
}

fn location_tokens(location: &str) -> HashSet<String> {
    if location.trim() == DEFAULT_LOCATION {
        return HashSet::new();
    }
    tokenize(location).into_iter().collect()
}

/// Jaccard similarity of location tokens; 0.0 when either side is unknown.
#[allow(clippy::cast_precision_loss)]
pub fn location_similarity(a: &str, b: &str) -> f64 {
    let a = location_tokens(a);
    let b = location_tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

/// Mean of room and location similarity.
pub fn structured_similarity(sale: &NormalizedListing, rental: &NormalizedListing) -> f64 {
    (room_similarity(sale.rooms, rental.rooms) + location_similarity(&sale.location, &rental.location))
        / 2.0
}
