use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod baseline;
pub mod catalog_entry;
pub mod crawl_run;
pub mod match_result;
pub mod product_record;

// Re-exports for convenience
pub use baseline::*;
pub use catalog_entry::*;
pub use crawl_run::*;
pub use match_result::*;
pub use product_record::*;

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum Classification {
    #[sqlx(rename = "new")]
    New,
    #[sqlx(rename = "confirmed_existing")]
    ConfirmedExisting,
    #[sqlx(rename = "suspected_duplicate")]
    SuspectedDuplicate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum MatchMethod {
    #[sqlx(rename = "exact_url")]
    ExactUrl,
    #[sqlx(rename = "normalized_url")]
    NormalizedUrl,
    #[sqlx(rename = "product_code")]
    ProductCode,
    #[sqlx(rename = "title_price_fuzzy")]
    TitlePriceFuzzy,
    #[sqlx(rename = "no_match")]
    NoMatch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum ProcessingStage {
    #[sqlx(rename = "discovered")]
    Discovered,
    #[sqlx(rename = "scraped")]
    Scraped,
    #[sqlx(rename = "drafted")]
    Drafted,
    #[sqlx(rename = "published")]
    Published,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Discovered => "discovered",
            ProcessingStage::Scraped => "scraped",
            ProcessingStage::Drafted => "drafted",
            ProcessingStage::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum CrawlMode {
    #[sqlx(rename = "baseline")]
    Baseline,
    #[sqlx(rename = "monitoring")]
    Monitoring,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum RunStatus {
    #[sqlx(rename = "running")]
    Running,
    #[sqlx(rename = "completed")]
    Completed,
    #[sqlx(rename = "partial")]
    Partial,
    #[sqlx(rename = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded,
    Failed,
    Rejected,
    SkippedExisting,
}

// Helper function to generate ids in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
