#![warn(clippy::unwrap_used)]

pub mod key;
pub mod local;

pub use key::{CacheDomain, CacheKey};
pub use local::{CacheStats, ResponseCache};
