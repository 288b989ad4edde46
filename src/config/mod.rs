//! 설정 모듈.

pub mod cache;
pub mod env;
pub mod index;

pub use cache::*;
pub use env::*;
pub use index::*;
