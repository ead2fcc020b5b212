use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::CatalogEntry;

/// Finalized snapshot of a retailer/category catalog.
///
/// Immutable once built: later crawls supersede a snapshot with a newer
/// `snapshot_date`, they never mutate it. Monitoring runs compare only
/// against the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaselineSnapshot {
    pub retailer: String,
    pub category: String,
    pub snapshot_date: NaiveDate,
    pub entries: Vec<CatalogEntry>,
    /// Crawl parameters in effect when the snapshot was taken.
    pub crawl_config: serde_json::Value,
}

impl BaselineSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_url(&self, source_url: &str) -> bool {
        self.entries.iter().any(|e| e.source_url == source_url)
    }

    pub fn find_by_normalized_url(&self, normalized_url: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.normalized_url == normalized_url)
    }

    pub fn find_by_product_code(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.product_code.as_deref() == Some(code))
    }
}

/// Accumulates pages during a baseline crawl and produces the immutable
/// snapshot at finalization.
#[derive(Debug)]
pub struct BaselineBuilder {
    retailer: String,
    category: String,
    snapshot_date: NaiveDate,
    entries: Vec<CatalogEntry>,
    crawl_config: serde_json::Value,
}

impl BaselineBuilder {
    pub fn new(
        retailer: &str,
        category: &str,
        snapshot_date: NaiveDate,
        crawl_config: serde_json::Value,
    ) -> Self {
        Self {
            retailer: retailer.to_string(),
            category: category.to_string(),
            snapshot_date,
            entries: Vec::new(),
            crawl_config,
        }
    }

    pub fn push_page(&mut self, entries: impl IntoIterator<Item = CatalogEntry>) {
        self.entries.extend(entries);
    }

    pub fn finalize(self) -> BaselineSnapshot {
        BaselineSnapshot {
            retailer: self.retailer,
            category: self.category,
            snapshot_date: self.snapshot_date,
            entries: self.entries,
            crawl_config: self.crawl_config,
        }
    }
}
