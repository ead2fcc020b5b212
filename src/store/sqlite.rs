use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::models::{
    BaselineSnapshot, CatalogEntry, CrawlMode, CrawlRun, NewProductRecord, ProcessingStage,
    ProductRecord, RunStatus,
};
use crate::utils::error::ScoutError;
use crate::Result;

/// SQLite-backed implementation of the three stores.
///
/// WAL mode gives concurrent readers with serialized writers, which is the
/// concurrency contract the rest of the crate assumes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

// Money is stored as TEXT to keep decimal exactness; a numeric mirror
// column backs the price-window range scan.
#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    retailer: String,
    url: String,
    normalized_url: String,
    product_code: Option<String>,
    title: String,
    price: String,
    external_id: Option<String>,
    processing_stage: ProcessingStage,
    cost_incurred: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BaselineRow {
    retailer: String,
    category: String,
    snapshot_date: NaiveDate,
    entries: String,
    crawl_config: String,
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| ScoutError::Data {
        message: format!("bad decimal '{}': {}", raw, e),
    })
}

impl TryFrom<ProductRow> for ProductRecord {
    type Error = ScoutError;

    fn try_from(row: ProductRow) -> Result<ProductRecord> {
        Ok(ProductRecord {
            price: parse_decimal(&row.price)?,
            cost_incurred: parse_decimal(&row.cost_incurred)?,
            id: row.id,
            retailer: row.retailer,
            url: row.url,
            normalized_url: row.normalized_url,
            product_code: row.product_code,
            title: row.title,
            external_id: row.external_id,
            processing_stage: row.processing_stage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<BaselineRow> for BaselineSnapshot {
    type Error = ScoutError;

    fn try_from(row: BaselineRow) -> Result<BaselineSnapshot> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(&row.entries)?;
        let crawl_config = serde_json::from_str(&row.crawl_config)?;
        Ok(BaselineSnapshot {
            retailer: row.retailer,
            category: row.category,
            snapshot_date: row.snapshot_date,
            entries,
            crawl_config,
        })
    }
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(ScoutError::Database)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: 5,
        })
        .await
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                url TEXT NOT NULL,
                normalized_url TEXT NOT NULL,
                product_code TEXT,
                title TEXT NOT NULL,
                price TEXT NOT NULL,
                price_num REAL NOT NULL,
                external_id TEXT,
                processing_stage TEXT NOT NULL,
                cost_incurred TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(retailer, normalized_url, product_code)
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_products_lookup \
             ON products(retailer, normalized_url)",
            "CREATE INDEX IF NOT EXISTS idx_products_price \
             ON products(retailer, price_num)",
            r#"CREATE TABLE IF NOT EXISTS baselines (
                retailer TEXT NOT NULL,
                category TEXT NOT NULL,
                snapshot_date TEXT NOT NULL,
                entries TEXT NOT NULL,
                crawl_config TEXT NOT NULL,
                PRIMARY KEY (retailer, category, snapshot_date)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS crawl_runs (
                run_id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                category TEXT NOT NULL,
                mode TEXT NOT NULL,
                pages_crawled INTEGER NOT NULL,
                new_found INTEGER NOT NULL,
                existing_found INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                status TEXT NOT NULL
            )"#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        retailer: &str,
        value: &str,
    ) -> Result<Option<ProductRecord>> {
        let sql = format!(
            "SELECT id, retailer, url, normalized_url, product_code, title, price, \
             external_id, processing_stage, cost_incurred, created_at, updated_at \
             FROM products WHERE retailer = ? AND {} = ? LIMIT 1",
            clause
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(retailer)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProductRecord::try_from).transpose()
    }
}

#[async_trait]
impl super::ProductStore for SqliteStore {
    async fn find_by_url(&self, retailer: &str, url: &str) -> Result<Option<ProductRecord>> {
        self.fetch_one_where("url", retailer, url).await
    }

    async fn find_by_normalized_url(
        &self,
        retailer: &str,
        normalized_url: &str,
    ) -> Result<Option<ProductRecord>> {
        self.fetch_one_where("normalized_url", retailer, normalized_url)
            .await
    }

    async fn find_by_product_code(
        &self,
        retailer: &str,
        code: &str,
    ) -> Result<Option<ProductRecord>> {
        self.fetch_one_where("product_code", retailer, code).await
    }

    async fn price_window(
        &self,
        retailer: &str,
        price: Decimal,
        tolerance: Decimal,
    ) -> Result<Vec<ProductRecord>> {
        let center = price.to_f64().unwrap_or_default();
        let width = tolerance.to_f64().unwrap_or_default();
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, url, normalized_url, product_code, title, price, \
             external_id, processing_stage, cost_incurred, created_at, updated_at \
             FROM products WHERE retailer = ? AND price_num BETWEEN ? AND ?",
        )
        .bind(retailer)
        .bind(center - width)
        .bind(center + width)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProductRecord::try_from).collect()
    }

    async fn insert(&self, record: NewProductRecord) -> Result<ProductRecord> {
        let record = ProductRecord::new(record);
        sqlx::query(
            "INSERT INTO products \
             (id, retailer, url, normalized_url, product_code, title, price, price_num, \
              external_id, processing_stage, cost_incurred, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.retailer)
        .bind(&record.url)
        .bind(&record.normalized_url)
        .bind(&record.product_code)
        .bind(&record.title)
        .bind(record.price.to_string())
        .bind(record.price.to_f64().unwrap_or_default())
        .bind(&record.external_id)
        .bind(record.processing_stage)
        .bind(record.cost_incurred.to_string())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn advance_stage(&self, id: &str, to: ProcessingStage) -> Result<()> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, url, normalized_url, product_code, title, price, \
             external_id, processing_stage, cost_incurred, created_at, updated_at \
             FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| ScoutError::Internal(format!("no such record: {}", id)))?;

        let mut record = ProductRecord::try_from(row)?;
        record.advance_stage(to)?;

        sqlx::query("UPDATE products SET processing_stage = ?, updated_at = ? WHERE id = ?")
            .bind(record.processing_stage)
            .bind(record.updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_external_id(&self, id: &str, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE products SET external_id = ?, updated_at = ? WHERE id = ?")
            .bind(external_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_cost(&self, id: &str, cost: Decimal) -> Result<()> {
        let current: Option<(String,)> =
            sqlx::query_as("SELECT cost_incurred FROM products WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let (current,) =
            current.ok_or_else(|| ScoutError::Internal(format!("no such record: {}", id)))?;
        let total = parse_decimal(&current)? + cost;

        sqlx::query("UPDATE products SET cost_incurred = ?, updated_at = ? WHERE id = ?")
            .bind(total.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl super::BaselineStore for SqliteStore {
    async fn latest(&self, retailer: &str, category: &str) -> Result<Option<BaselineSnapshot>> {
        let row: Option<BaselineRow> = sqlx::query_as(
            "SELECT retailer, category, snapshot_date, entries, crawl_config \
             FROM baselines WHERE retailer = ? AND category = ? \
             ORDER BY snapshot_date DESC LIMIT 1",
        )
        .bind(retailer)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BaselineSnapshot::try_from).transpose()
    }

    async fn save(&self, snapshot: &BaselineSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO baselines \
             (retailer, category, snapshot_date, entries, crawl_config) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&snapshot.retailer)
        .bind(&snapshot.category)
        .bind(snapshot.snapshot_date)
        .bind(serde_json::to_string(&snapshot.entries)?)
        .bind(serde_json::to_string(&snapshot.crawl_config)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl super::RunLog for SqliteStore {
    async fn record(&self, run: &CrawlRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO crawl_runs \
             (run_id, retailer, category, mode, pages_crawled, new_found, existing_found, \
              started_at, ended_at, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.run_id)
        .bind(&run.retailer)
        .bind(&run.category)
        .bind(run.mode)
        .bind(run.pages_crawled)
        .bind(run.new_found)
        .bind(run.existing_found)
        .bind(run.started_at)
        .bind(run.ended_at)
        .bind(run.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteStore {
    /// Runs recorded for a retailer, newest first. Used by embedders for
    /// run-history views.
    pub async fn runs_for(&self, retailer: &str) -> Result<Vec<CrawlRun>> {
        #[derive(FromRow)]
        struct RunRow {
            run_id: String,
            retailer: String,
            category: String,
            mode: CrawlMode,
            pages_crawled: u32,
            new_found: u32,
            existing_found: u32,
            started_at: DateTime<Utc>,
            ended_at: Option<DateTime<Utc>>,
            status: RunStatus,
        }

        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT run_id, retailer, category, mode, pages_crawled, new_found, \
             existing_found, started_at, ended_at, status \
             FROM crawl_runs WHERE retailer = ? ORDER BY started_at DESC",
        )
        .bind(retailer)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CrawlRun {
                run_id: r.run_id,
                retailer: r.retailer,
                category: r.category,
                mode: r.mode,
                pages_crawled: r.pages_crawled,
                new_found: r.new_found,
                existing_found: r.existing_found,
                started_at: r.started_at,
                ended_at: r.ended_at,
                status: r.status,
            })
            .collect())
    }
}
