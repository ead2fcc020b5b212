// Integration tests for shopscout
// These tests verify that all components work together correctly

pub mod discovery_tests;
pub mod resume_tests;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use shopscout::config::{
    CheckpointConfig, RetailerPolicy, ScoutConfig, SelectorTable, UrlRules,
};
use shopscout::extract::{BackendResponse, ExtractedData, ExtractionBackend, TierRouter};
use shopscout::fetch::{FetchError, FetchedPage, PageFetcher};
use shopscout::models::CatalogEntry;
use shopscout::pipeline::BatchProcessor;
use shopscout::session::CrawlSession;
use shopscout::sink::MemorySink;
use shopscout::store::{SqliteStore, Stores};

/// Test configuration for integration tests
pub fn test_config(checkpoint_dir: &TempDir) -> Arc<ScoutConfig> {
    let mut config = ScoutConfig::default();
    config.crawler.max_pages = 50;
    config.checkpoint = CheckpointConfig {
        dir: checkpoint_dir.path().to_string_lossy().to_string(),
        flush_every: 2,
    };
    config.retailers.insert(
        "shopco".to_string(),
        RetailerPolicy {
            url_rules: UrlRules {
                stable_id_pattern: Some(r"(/dp/[A-Z0-9]+)".to_string()),
            },
            tiers: vec!["fetch_api".to_string()],
            early_stop_threshold: 3,
            title_similarity_threshold: 0.90,
            price_tolerance: Decimal::ONE,
            tier_timeout_secs: 45,
            selectors: Some(SelectorTable {
                title: ".product-title".to_string(),
                price: ".price".to_string(),
                product_code: None,
                images: None,
            }),
        },
    );
    Arc::new(config)
}

pub fn entry(slug: &str, title: &str, price: &str) -> CatalogEntry {
    CatalogEntry {
        source_url: format!("https://shop.example/brand/dp/{}/?ref=grid", slug),
        normalized_url: String::new(),
        product_code: Some(slug.to_string()),
        title: title.to_string(),
        price: price.parse().unwrap(),
        original_price: None,
        image_refs: vec![],
        retailer: "shopco".to_string(),
        category: "dresses".to_string(),
        observed_at: Utc::now(),
    }
}

/// Serves a scripted sequence of listing pages; can be told to fail a
/// specific page to simulate listing outages.
pub struct ScriptedFetcher {
    pub pages: Vec<Result<Vec<CatalogEntry>, FetchError>>,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(pages: Vec<Result<Vec<CatalogEntry>, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        _retailer: &str,
        _category: &str,
        page_token: Option<&str>,
    ) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let idx: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        match self.pages.get(idx) {
            Some(Ok(entries)) => Ok(FetchedPage {
                entries: entries.clone(),
                next_page_token: (idx + 1 < self.pages.len()).then(|| (idx + 1).to_string()),
            }),
            Some(Err(FetchError::Transient(m))) => Err(FetchError::Transient(m.clone())),
            Some(Err(FetchError::Permanent(m))) => Err(FetchError::Permanent(m.clone())),
            None => Ok(FetchedPage::default()),
        }
    }
}

/// Extraction backend that derives product data from the URL slug, so
/// tests never touch the network. Counts calls for cost assertions.
pub struct SlugBackend {
    pub cost: Decimal,
    pub calls: AtomicUsize,
}

impl SlugBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cost: "0.01".parse().unwrap(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ExtractionBackend for SlugBackend {
    fn tier(&self) -> &str {
        "fetch_api"
    }

    fn nominal_cost(&self) -> Decimal {
        self.cost
    }

    async fn run(&self, url: &str, _retailer: &str) -> BackendResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let slug = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("X")
            .to_string();
        BackendResponse::ok(
            ExtractedData {
                title: Some(format!("Product {}", slug)),
                price: Some("49.99".parse().unwrap()),
                product_code: Some(slug),
                ..Default::default()
            },
            self.cost,
        )
    }
}

pub struct TestApp {
    pub config: Arc<ScoutConfig>,
    pub store: SqliteStore,
    pub stores: Stores,
    pub backend: Arc<SlugBackend>,
    pub sink: Arc<MemorySink>,
    pub processor: BatchProcessor,
}

/// Wire a full application over an in-memory database.
pub async fn create_test_app(checkpoint_dir: &TempDir) -> anyhow::Result<TestApp> {
    let config = test_config(checkpoint_dir);
    let store = SqliteStore::connect_in_memory().await?;
    let stores = Stores {
        products: Arc::new(store.clone()),
        baselines: Arc::new(store.clone()),
        runs: Arc::new(store.clone()),
    };

    let backend = SlugBackend::new();
    let mut router = TierRouter::new(config.clone());
    router.register(backend.clone());
    router.validate_tiers()?;

    let sink = Arc::new(MemorySink::new());
    let processor = BatchProcessor::new(
        config.clone(),
        Arc::new(router),
        sink.clone(),
        stores.clone(),
    );

    Ok(TestApp {
        config,
        store,
        stores,
        backend,
        sink,
        processor,
    })
}

pub fn session(app: &TestApp, fetcher: Arc<dyn PageFetcher>) -> CrawlSession {
    CrawlSession::new(app.config.clone(), fetcher, app.stores.clone())
}
