use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::utils::error::ScoutError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoutConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-retailer behavior expressed as data. Adding a retailer is a
    /// configuration change, never an engine code change.
    #[serde(default)]
    pub retailers: HashMap<String, RetailerPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Hard bound on pages per session; applies to both modes.
    pub max_pages: u32,
    /// Fetch retry attempts inside the fetch collaborator.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub dir: String,
    /// Flush the full checkpoint state every N processed items.
    pub flush_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_age_secs: u64,
}

/// Everything that varies by retailer: URL canonicalization, the ordered
/// extraction tier list, crawl stop behavior, and the empirically tuned
/// matching constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerPolicy {
    #[serde(default)]
    pub url_rules: UrlRules,
    /// Ordered extraction tiers, cheapest first. Fallback never leaves
    /// this list.
    pub tiers: Vec<String>,
    /// Consecutive confirmed-existing results that stop a monitoring crawl.
    /// Retailers without a newest-first sort should set this higher.
    #[serde(default = "defaults::early_stop_threshold")]
    pub early_stop_threshold: usize,
    #[serde(default = "defaults::title_similarity_threshold")]
    pub title_similarity_threshold: f64,
    #[serde(default = "defaults::price_tolerance")]
    pub price_tolerance: Decimal,
    #[serde(default = "defaults::tier_timeout_secs")]
    pub tier_timeout_secs: u64,
    /// CSS selectors for the lightweight HTML extraction tier.
    #[serde(default)]
    pub selectors: Option<SelectorTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UrlRules {
    /// Regex whose first capture group is the stable identifier path for
    /// this retailer, e.g. `(/dp/[A-Z0-9]+)`.
    pub stable_id_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorTable {
    pub title: String,
    pub price: String,
    pub product_code: Option<String>,
    pub images: Option<String>,
}

mod defaults {
    use rust_decimal::Decimal;

    pub fn early_stop_threshold() -> usize {
        3
    }

    pub fn title_similarity_threshold() -> f64 {
        0.90
    }

    pub fn price_tolerance() -> Decimal {
        Decimal::ONE
    }

    pub fn tier_timeout_secs() -> u64 {
        45
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/shopscout.db".to_string(),
            max_connections: 5,
            acquire_timeout: 30,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 200,
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: "data/checkpoints".to_string(),
            flush_every: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_age_secs: 6 * 60 * 60 }
    }
}

impl RetailerPolicy {
    pub fn tier_timeout(&self) -> Duration {
        Duration::from_secs(self.tier_timeout_secs)
    }
}

impl ScoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SCOUT_"
            .add_source(Environment::with_prefix("SCOUT").separator("__"))
            .build()?;

        let config: ScoutConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.crawler.max_pages == 0 {
            return Err(ConfigError::Message(
                "Crawler max_pages must be greater than 0".into(),
            ));
        }

        if self.checkpoint.flush_every == 0 {
            return Err(ConfigError::Message(
                "Checkpoint flush_every must be greater than 0".into(),
            ));
        }

        for (retailer, policy) in &self.retailers {
            if policy.tiers.is_empty() {
                return Err(ConfigError::Message(format!(
                    "Retailer {} has an empty tier list",
                    retailer
                )));
            }

            if policy.early_stop_threshold == 0 {
                return Err(ConfigError::Message(format!(
                    "Retailer {} early_stop_threshold must be greater than 0",
                    retailer
                )));
            }

            if !(0.0..=1.0).contains(&policy.title_similarity_threshold) {
                return Err(ConfigError::Message(format!(
                    "Retailer {} title_similarity_threshold must be within [0, 1]",
                    retailer
                )));
            }

            if policy.price_tolerance < Decimal::ZERO {
                return Err(ConfigError::Message(format!(
                    "Retailer {} price_tolerance must not be negative",
                    retailer
                )));
            }

            if let Some(pattern) = &policy.url_rules.stable_id_pattern {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(ConfigError::Message(format!(
                        "Retailer {} stable_id_pattern is not a valid regex: {}",
                        retailer, e
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a retailer's policy; unknown retailers are a hard
    /// configuration failure, never silently skipped.
    pub fn policy(&self, retailer: &str) -> Result<&RetailerPolicy, ScoutError> {
        self.retailers
            .get(retailer)
            .ok_or_else(|| ScoutError::UnknownRetailer {
                retailer: retailer.to_string(),
            })
    }
}
