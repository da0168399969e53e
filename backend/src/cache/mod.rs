pub mod cache_service;
pub mod models;

pub use cache_service::{CacheError, PredictionCache};
pub use models::PredictionCacheEntry;
