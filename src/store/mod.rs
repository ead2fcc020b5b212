use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{BaselineSnapshot, CrawlRun, NewProductRecord, ProcessingStage, ProductRecord};
use crate::utils::error::ScoutError;
use crate::Result;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Persistent product records, keyed by (retailer, normalized_url,
/// product_code). Concurrent readers, serialized writers.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_url(&self, retailer: &str, url: &str) -> Result<Option<ProductRecord>>;

    async fn find_by_normalized_url(
        &self,
        retailer: &str,
        normalized_url: &str,
    ) -> Result<Option<ProductRecord>>;

    async fn find_by_product_code(
        &self,
        retailer: &str,
        code: &str,
    ) -> Result<Option<ProductRecord>>;

    /// Same-retailer records priced within `tolerance` of `price`, the
    /// candidate set for title fuzzy matching.
    async fn price_window(
        &self,
        retailer: &str,
        price: Decimal,
        tolerance: Decimal,
    ) -> Result<Vec<ProductRecord>>;

    async fn insert(&self, record: NewProductRecord) -> Result<ProductRecord>;

    async fn advance_stage(&self, id: &str, to: ProcessingStage) -> Result<()>;

    async fn set_external_id(&self, id: &str, external_id: &str) -> Result<()>;

    async fn add_cost(&self, id: &str, cost: Decimal) -> Result<()>;
}

/// Versioned baseline snapshots, one active per (retailer, category).
#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn latest(&self, retailer: &str, category: &str) -> Result<Option<BaselineSnapshot>>;

    async fn save(&self, snapshot: &BaselineSnapshot) -> Result<()>;
}

/// Append-only crawl run log.
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn record(&self, run: &CrawlRun) -> Result<()>;
}

/// In-memory product store used in tests and as a reference implementation.
/// Can be flipped unreachable to exercise degraded classification.
#[derive(Default)]
pub struct MemoryProductStore {
    records: RwLock<HashMap<String, ProductRecord>>,
    unreachable: AtomicBool,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ScoutError::Internal("product store unreachable".to_string()));
        }
        Ok(())
    }

    pub async fn all(&self) -> Vec<ProductRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn seed(&self, record: ProductRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn find_by_url(&self, retailer: &str, url: &str) -> Result<Option<ProductRecord>> {
        self.check_reachable()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.retailer == retailer && r.url == url)
            .cloned())
    }

    async fn find_by_normalized_url(
        &self,
        retailer: &str,
        normalized_url: &str,
    ) -> Result<Option<ProductRecord>> {
        self.check_reachable()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.retailer == retailer && r.normalized_url == normalized_url)
            .cloned())
    }

    async fn find_by_product_code(
        &self,
        retailer: &str,
        code: &str,
    ) -> Result<Option<ProductRecord>> {
        self.check_reachable()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.retailer == retailer && r.product_code.as_deref() == Some(code))
            .cloned())
    }

    async fn price_window(
        &self,
        retailer: &str,
        price: Decimal,
        tolerance: Decimal,
    ) -> Result<Vec<ProductRecord>> {
        self.check_reachable()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.retailer == retailer && (r.price - price).abs() <= tolerance)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: NewProductRecord) -> Result<ProductRecord> {
        self.check_reachable()?;
        let record = ProductRecord::new(record);
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn advance_stage(&self, id: &str, to: ProcessingStage) -> Result<()> {
        self.check_reachable()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScoutError::Internal(format!("no such record: {}", id)))?;
        record.advance_stage(to)
    }

    async fn set_external_id(&self, id: &str, external_id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScoutError::Internal(format!("no such record: {}", id)))?;
        record.external_id = Some(external_id.to_string());
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn add_cost(&self, id: &str, cost: Decimal) -> Result<()> {
        self.check_reachable()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScoutError::Internal(format!("no such record: {}", id)))?;
        record.add_cost(cost);
        Ok(())
    }
}

/// In-memory baseline store: latest snapshot per (retailer, category).
#[derive(Default)]
pub struct MemoryBaselineStore {
    snapshots: RwLock<HashMap<(String, String), Vec<BaselineSnapshot>>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn latest(&self, retailer: &str, category: &str) -> Result<Option<BaselineSnapshot>> {
        let snapshots = self.snapshots.read().await;
        let key = (retailer.to_string(), category.to_string());
        Ok(snapshots.get(&key).and_then(|versions| {
            versions
                .iter()
                .max_by_key(|s| s.snapshot_date)
                .cloned()
        }))
    }

    async fn save(&self, snapshot: &BaselineSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        let key = (snapshot.retailer.clone(), snapshot.category.clone());
        snapshots.entry(key).or_default().push(snapshot.clone());
        Ok(())
    }
}

/// In-memory run log.
#[derive(Default)]
pub struct MemoryRunLog {
    runs: RwLock<Vec<CrawlRun>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<CrawlRun> {
        self.runs.read().await.clone()
    }
}

#[async_trait]
impl RunLog for MemoryRunLog {
    async fn record(&self, run: &CrawlRun) -> Result<()> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }
}

/// Convenience bundle for wiring the three stores together.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductStore>,
    pub baselines: Arc<dyn BaselineStore>,
    pub runs: Arc<dyn RunLog>,
}
