use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, CrawlMode, RunStatus};

/// Append-only log entry for one crawl session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlRun {
    pub run_id: String,
    pub retailer: String,
    pub category: String,
    pub mode: CrawlMode,
    pub pages_crawled: u32,
    pub new_found: u32,
    pub existing_found: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

impl CrawlRun {
    pub fn start(retailer: &str, category: &str, mode: CrawlMode) -> Self {
        Self {
            run_id: generate_id(),
            retailer: retailer.to_string(),
            category: category.to_string(),
            mode,
            pages_crawled: 0,
            new_found: 0,
            existing_found: 0,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_milliseconds())
    }
}
