use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::extract::ExtractedData;
use crate::models::ProductRecord;
use crate::Result;

/// Downstream verdict on a drafted product. Rejection is a business
/// outcome, not an error; the item is done either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Accepted { external_id: String },
    Rejected { reason: String },
}

/// Destination for fully extracted products, e.g. a listing drafts API.
#[async_trait]
pub trait ProductSink: Send + Sync {
    async fn submit(&self, record: &ProductRecord, data: &ExtractedData) -> Result<SinkOutcome>;
}

/// In-memory sink for tests and dry runs. Accepts everything unless the
/// title contains the configured marker.
#[derive(Default)]
pub struct MemorySink {
    submissions: RwLock<Vec<(String, ExtractedData)>>,
    counter: AtomicUsize,
    reject_marker: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(marker: impl Into<String>) -> Self {
        Self {
            reject_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    pub async fn submissions(&self) -> Vec<(String, ExtractedData)> {
        self.submissions.read().await.clone()
    }
}

#[async_trait]
impl ProductSink for MemorySink {
    async fn submit(&self, record: &ProductRecord, data: &ExtractedData) -> Result<SinkOutcome> {
        self.submissions
            .write()
            .await
            .push((record.id.clone(), data.clone()));

        if let Some(marker) = &self.reject_marker {
            let title = data.title.as_deref().unwrap_or_default();
            if title.contains(marker.as_str()) {
                return Ok(SinkOutcome::Rejected {
                    reason: format!("title contains '{}'", marker),
                });
            }
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SinkOutcome::Accepted {
            external_id: format!("ext-{}", n),
        })
    }
}
