//! Matching engine tuning.

use std::time::Duration;

use crate::config::get_env_flag;

/// Candidate pool sizes, score weights and image fetch limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    /// Rentals kept from the lexical ranking.
    pub text_top_k: usize,
    /// Rentals kept from the image ranking.
    pub image_top_k: usize,
    /// Upper bound on rentals that get a full score.
    pub final_candidates: usize,
    pub text_weight: f64,
    pub image_weight: f64,
    pub structured_weight: f64,
    /// Concurrent image downloads.
    pub max_workers: usize,
    pub image_timeout: Duration,
    pub max_images_per_listing: usize,
    /// Downloads larger than this are dropped without a content key.
    pub max_image_bytes: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            text_top_k: 20,
            image_top_k: 20,
            final_candidates: 30,
            text_weight: 0.45,
            image_weight: 0.35,
            structured_weight: 0.20,
            max_workers: 4,
            image_timeout: Duration::from_secs(5),
            max_images_per_listing: 2,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl MatchingConfig {
    /// Smaller candidate pools with text-heavy weights.
    pub fn fast_mode() -> Self {
        Self {
            text_top_k: 10,
            image_top_k: 10,
            final_candidates: 15,
            text_weight: 0.6,
            image_weight: 0.2,
            structured_weight: 0.2,
            ..Self::default()
        }
    }

    /// Picks fast mode when `MATCHING_FAST_MODE` is set.
    pub fn from_env() -> Self {
        if get_env_flag("MATCHING_FAST_MODE", false) {
            tracing::info!("Matching engine running in fast mode");
            Self::fast_mode()
        } else {
            Self::default()
        }
    }
}
