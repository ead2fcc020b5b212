use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One product listing as observed during a catalog crawl.
///
/// Ephemeral: produced per crawl page, classified, and either queued for
/// extraction or dropped. `source_url` and `retailer` are always present;
/// everything else is best-effort from the listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub source_url: String,
    pub normalized_url: String,
    pub product_code: Option<String>,
    pub title: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub image_refs: Vec<String>,
    pub retailer: String,
    pub category: String,
    pub observed_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Stable key used for checkpointing and downstream idempotence.
    pub fn item_id(&self) -> &str {
        &self.normalized_url
    }

    pub fn discount_fraction(&self) -> Option<Decimal> {
        let original = self.original_price?;
        if original.is_zero() || original < self.price {
            return None;
        }
        Some((original - self.price) / original)
    }
}
