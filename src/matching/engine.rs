//! Sale-to-rental matching.

use std::collections::HashSet;

use serde::Serialize;

use crate::matching::image::image_similarity;
use crate::matching::structured::structured_similarity;
use crate::matching::text::{rank, TextIndex};
use crate::matching::{ImageFingerprinter, MatchingConfig, RentalIndex};
use crate::models::NormalizedListing;

/// A scored rental candidate.
#[derive(Debug, Clone, Serialize)]
pub struct RentalMatch {
    pub rental: NormalizedListing,
    pub score: f64,
    pub text_score: f64,
    pub image_score: f64,
    pub structured_score: f64,
    /// Annual rent divided by the sale price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_gross_yield: Option<f64>,
}

/// Ranks rentals from the index against a sale listing.
///
/// Candidates come from the best text matches and the best image matches,
/// topped up from the text ranking until `final_candidates` is reached.
/// Every candidate then gets the weighted text/image/structured score.
#[derive(Debug)]
pub struct MatchingEngine {
    config: MatchingConfig,
    index: RentalIndex,
    text_index: TextIndex,
    fingerprint_sets: Vec<HashSet<String>>,
    fingerprinter: ImageFingerprinter,
}

impl MatchingEngine {
    pub fn new(index: RentalIndex, config: MatchingConfig, fingerprinter: ImageFingerprinter) -> Self {
        let text_index = TextIndex::build(
            index
                .rentals()
                .iter()
                .map(|r| r.listing.search_text())
                .collect::<Vec<_>>()
                .iter()
                .map(String::as_str),
        );
        let fingerprint_sets = index.rentals().iter().map(|r| r.fingerprint_set()).collect();

        tracing::info!(
            rentals = index.len(),
            text_top_k = config.text_top_k,
            image_top_k = config.image_top_k,
            final_candidates = config.final_candidates,
            "Matching engine ready"
        );

        Self {
            config,
            index,
            text_index,
            fingerprint_sets,
            fingerprinter,
        }
    }

    pub fn rental_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_ready(&self) -> bool {
        !self.index.is_empty()
    }

    pub const fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Returns the `top_k` best rentals for the sale listing, best first.
    pub async fn match_sale_to_rentals(
        &self,
        sale: &NormalizedListing,
        top_k: usize,
    ) -> Vec<RentalMatch> {
        if top_k == 0 || self.index.is_empty() {
            return Vec::new();
        }

        let text_scores = self.text_index.scores(&sale.search_text());

        let sale_images = self
            .fingerprinter
            .fingerprint_urls(self.fingerprinter.selected_images(sale))
            .await;
        let image_scores: Vec<f64> = self
            .fingerprint_sets
            .iter()
            .map(|keys| image_similarity(&sale_images, keys))
            .collect();

        let candidates = self.candidates(&text_scores, &image_scores);

        let mut matches: Vec<(usize, RentalMatch)> = candidates
            .into_iter()
            .map(|position| {
                let rental = &self.index.rentals()[position].listing;
                let text_score = text_scores[position];
                let image_score = image_scores[position];
                let structured_score = structured_similarity(sale, rental);
                let score = self.config.text_weight * text_score
                    + self.config.image_weight * image_score
                    + self.config.structured_weight * structured_score;

                (
                    position,
                    RentalMatch {
                        rental: rental.clone(),
                        score,
                        text_score,
                        image_score,
                        structured_score,
                        estimated_gross_yield: gross_yield(sale.price, rental.price),
                    },
                )
            })
            .collect();

        matches.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        matches.truncate(top_k);

        tracing::debug!(
            sale = %sale.title,
            matches = matches.len(),
            best = matches.first().map_or(0.0, |m| m.1.score),
            "Matched sale listing"
        );

        matches.into_iter().map(|(_, m)| m).collect()
    }

    fn candidates(&self, text_scores: &[f64], image_scores: &[f64]) -> Vec<usize> {
        let limit = self.config.final_candidates.max(1);
        let text_ranking = rank(text_scores, text_scores.len());

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(limit);
        let mut push = |position: usize| {
            if candidates.len() < limit && seen.insert(position) {
                candidates.push(position);
            }
        };

        for &(position, _) in text_ranking.iter().take(self.config.text_top_k) {
            push(position);
        }
        for (position, score) in rank(image_scores, self.config.image_top_k) {
            if score > 0.0 {
                push(position);
            }
        }
        for &(position, _) in &text_ranking {
            push(position);
        }

        candidates
    }
}

/// Twelve months of rent over the sale price.
fn gross_yield(sale_price: f64, monthly_rent: f64) -> Option<f64> {
    (sale_price > 0.0 && monthly_rent > 0.0).then(|| monthly_rent * 12.0 / sale_price)
}
