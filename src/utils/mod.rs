//! 유틸리티 모듈.

pub mod json;
pub mod price;

pub use price::{parse_price_amount, split_price_currency};
