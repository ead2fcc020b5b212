pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod matcher;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{RetailerPolicy, ScoutConfig};
pub use matcher::MatchEngine;
pub use models::{CatalogEntry, Classification, CrawlRun, MatchResult, ProductRecord};
pub use utils::error::ScoutError;

pub type Result<T> = std::result::Result<T, ScoutError>;
