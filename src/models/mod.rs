//! 모델 모듈.

pub mod listing;

pub use listing::{
    normalize_scraped_listing, ListingId, NormalizedListing, MAX_LISTING_IMAGES,
    PLACEHOLDER_IMAGE,
};
