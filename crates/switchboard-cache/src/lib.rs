mod cache;
mod error;

pub use cache::{CacheConfig, StagingCache};
pub use error::CacheError;
