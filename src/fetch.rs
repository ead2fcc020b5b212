use async_trait::async_trait;
use std::sync::Arc;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::CrawlerConfig;
use crate::models::CatalogEntry;

/// One page of catalog listings plus the opaque cursor for the next page.
/// `next_page_token == None` means the listing is exhausted.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub entries: Vec<CatalogEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Worth retrying: timeouts, 5xx, connection resets.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// Not worth retrying: 4xx, parse failures, bad cursor.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Source of catalog listing pages for one retailer/category.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        retailer: &str,
        category: &str,
        page_token: Option<&str>,
    ) -> Result<FetchedPage, FetchError>;
}

/// Wraps any fetcher with bounded exponential-backoff retries on
/// transient failures. Permanent failures pass straight through.
pub struct RetryingFetcher {
    inner: Arc<dyn PageFetcher>,
    attempts: usize,
    base_delay_ms: u64,
}

impl RetryingFetcher {
    pub fn new(inner: Arc<dyn PageFetcher>, config: &CrawlerConfig) -> Self {
        Self {
            inner,
            attempts: config.retry_attempts as usize,
            base_delay_ms: config.retry_delay_ms,
        }
    }
}

#[async_trait]
impl PageFetcher for RetryingFetcher {
    async fn fetch_page(
        &self,
        retailer: &str,
        category: &str,
        page_token: Option<&str>,
    ) -> Result<FetchedPage, FetchError> {
        let strategy = ExponentialBackoff::from_millis(self.base_delay_ms.max(1))
            .factor(2)
            .take(self.attempts.saturating_sub(1));

        RetryIf::spawn(
            strategy,
            || async {
                let result = self.inner.fetch_page(retailer, category, page_token).await;
                if let Err(FetchError::Transient(reason)) = &result {
                    warn!(retailer, category, %reason, "transient fetch failure, retrying");
                }
                result
            },
            FetchError::is_transient,
        )
        .await
    }
}
