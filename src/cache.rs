use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CacheConfig;

/// Cache key: one fetched page per retailer, URL, and crawl date. The date
/// component keeps a monitoring run from reusing pages fetched during a
/// previous day's session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    retailer: String,
    url: String,
    date: NaiveDate,
}

struct CachedPage {
    body: String,
    fetched_at: DateTime<Utc>,
}

/// In-memory raw page cache shared by extraction backends so that a
/// fallback tier can reuse a page the cheaper tier already downloaded.
pub struct PageCache {
    pages: RwLock<HashMap<PageKey, CachedPage>>,
    max_age: Duration,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            max_age: Duration::from_secs(config.max_age_secs),
        }
    }

    pub async fn get(&self, retailer: &str, url: &str) -> Option<String> {
        let key = PageKey {
            retailer: retailer.to_string(),
            url: url.to_string(),
            date: Utc::now().date_naive(),
        };
        let pages = self.pages.read().await;
        let cached = pages.get(&key)?;
        let age = (Utc::now() - cached.fetched_at).to_std().ok()?;
        if age > self.max_age {
            return None;
        }
        Some(cached.body.clone())
    }

    pub async fn put(&self, retailer: &str, url: &str, body: String) {
        let key = PageKey {
            retailer: retailer.to_string(),
            url: url.to_string(),
            date: Utc::now().date_naive(),
        };
        debug!(retailer, url, "caching fetched page");
        let mut pages = self.pages.write().await;
        pages.insert(key, CachedPage {
            body,
            fetched_at: Utc::now(),
        });
    }

    /// Drop entries past their maximum age. Called opportunistically by
    /// long-running sessions.
    pub async fn evict_stale(&self) -> usize {
        let now = Utc::now();
        let mut pages = self.pages.write().await;
        let before = pages.len();
        pages.retain(|_, cached| {
            (now - cached.fetched_at)
                .to_std()
                .map(|age| age <= self.max_age)
                .unwrap_or(false)
        });
        before - pages.len()
    }

    pub async fn len(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pages.read().await.is_empty()
    }
}
