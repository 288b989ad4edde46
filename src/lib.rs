//! Real estate listing scraping and sale-to-rental matching API.

pub mod api;
pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_server;
