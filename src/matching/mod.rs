//! Sale-to-rental matching engine.
//!
//! Rentals are loaded once from a prebuilt [`RentalIndex`]. A sale listing is
//! scored against them on three signals: TF-IDF text similarity, shared image
//! fingerprints and structured fields (rooms, location).

pub mod config;
pub mod engine;
pub mod image;
pub mod index;
pub mod structured;
pub mod text;

pub use config::MatchingConfig;
pub use engine::{MatchingEngine, RentalMatch};
pub use image::ImageFingerprinter;
pub use index::{build_rental_index, IndexedRental, RentalIndex};
pub use text::TextIndex;
