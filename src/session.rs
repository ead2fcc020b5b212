use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ScoutConfig;
use crate::fetch::{FetchError, PageFetcher};
use crate::matcher::MatchEngine;
use crate::models::{
    BaselineBuilder, CatalogEntry, Classification, CrawlMode, CrawlRun, MatchResult, RunStatus,
};
use crate::normalizer::UrlNormalizer;
use crate::store::Stores;
use crate::Result;

/// Session lifecycle, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    FetchingPage,
    Classifying,
    Stopping,
    Finalized,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::FetchingPage => "fetching_page",
            SessionState::Classifying => "classifying",
            SessionState::Stopping => "stopping",
            SessionState::Finalized => "finalized",
        }
    }
}

/// An entry the session decided is worth downstream processing, paired
/// with why.
#[derive(Debug, Clone)]
pub struct QueuedCandidate {
    pub entry: CatalogEntry,
    pub match_result: MatchResult,
}

/// What one crawl session produced. `run` carries the counters and final
/// status; `queued` feeds the processing pipeline.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub run: CrawlRun,
    pub queued: Vec<QueuedCandidate>,
}

/// Drives one crawl over a retailer/category listing.
///
/// Baseline mode walks the whole listing (bounded by max_pages) and
/// records a snapshot of current inventory. Monitoring mode classifies
/// each entry against the latest baseline and the product store, queues
/// new and suspect entries, and stops early once it hits a run of
/// consecutive already-known products.
pub struct CrawlSession {
    config: Arc<ScoutConfig>,
    fetcher: Arc<dyn PageFetcher>,
    matcher: MatchEngine,
    normalizer: UrlNormalizer,
    stores: Stores,
}

impl CrawlSession {
    pub fn new(config: Arc<ScoutConfig>, fetcher: Arc<dyn PageFetcher>, stores: Stores) -> Self {
        let matcher = MatchEngine::new(config.clone());
        let normalizer = UrlNormalizer::from_config(&config);
        Self {
            config,
            fetcher,
            matcher,
            normalizer,
            stores,
        }
    }

    pub async fn run(&self, retailer: &str, category: &str, mode: CrawlMode) -> Result<CrawlOutcome> {
        // Unknown retailers fail loudly before any network traffic.
        let policy = self.config.policy(retailer)?;
        let early_stop = policy.early_stop_threshold;
        let max_pages = self.config.crawler.max_pages;

        let mut run = CrawlRun::start(retailer, category, mode);
        let mut state = SessionState::Idle;
        let mut queued = Vec::new();
        let mut builder = BaselineBuilder::new(
            retailer,
            category,
            Utc::now().date_naive(),
            serde_json::json!({ "mode": mode, "max_pages": max_pages }),
        );

        let baseline = match mode {
            CrawlMode::Monitoring => {
                self.stores.baselines.latest(retailer, category).await?
            }
            CrawlMode::Baseline => None,
        };
        if mode == CrawlMode::Monitoring && baseline.is_none() {
            warn!(retailer, category, "monitoring without a baseline snapshot");
        }

        info!(retailer, category, mode = ?mode, "crawl session starting");

        let mut page_token: Option<String> = None;
        let mut consecutive_existing = 0usize;
        let mut status = RunStatus::Completed;

        loop {
            if run.pages_crawled >= max_pages {
                debug!(retailer, category, max_pages, "page bound reached");
                break;
            }

            self.transition(&mut state, SessionState::FetchingPage);
            let page = match self
                .fetcher
                .fetch_page(retailer, category, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(FetchError::Transient(reason)) | Err(FetchError::Permanent(reason)) => {
                    // Keep everything collected so far; the run is partial,
                    // not lost.
                    warn!(retailer, category, %reason, "fetch failed, ending session early");
                    status = RunStatus::Partial;
                    break;
                }
            };
            run.pages_crawled += 1;

            self.transition(&mut state, SessionState::Classifying);
            for mut entry in page.entries {
                entry.normalized_url = self.normalizer.normalize(&entry.source_url, retailer);

                match mode {
                    CrawlMode::Baseline => {
                        run.new_found += 1;
                        builder.push_page(vec![entry]);
                    }
                    CrawlMode::Monitoring => {
                        let result = self
                            .matcher
                            .classify(&entry, baseline.as_ref(), self.stores.products.as_ref())
                            .await;

                        match result.classification {
                            Classification::ConfirmedExisting => {
                                run.existing_found += 1;
                                consecutive_existing += 1;
                            }
                            Classification::New | Classification::SuspectedDuplicate => {
                                run.new_found += 1;
                                consecutive_existing = 0;
                                queued.push(QueuedCandidate {
                                    entry,
                                    match_result: result,
                                });
                            }
                        }

                        if consecutive_existing >= early_stop {
                            info!(
                                retailer,
                                category,
                                streak = consecutive_existing,
                                "early stop: reached known inventory"
                            );
                            self.transition(&mut state, SessionState::Stopping);
                            break;
                        }
                    }
                }
            }

            if state == SessionState::Stopping {
                break;
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        if mode == CrawlMode::Baseline && status == RunStatus::Completed {
            let snapshot = builder.finalize();
            self.stores.baselines.save(&snapshot).await?;
            info!(
                retailer,
                category,
                entries = snapshot.entries.len(),
                "baseline snapshot saved"
            );
        }

        run.finish(status);
        self.transition(&mut state, SessionState::Finalized);
        self.stores.runs.record(&run).await?;

        info!(
            retailer,
            category,
            pages = run.pages_crawled,
            new = run.new_found,
            existing = run.existing_found,
            status = ?run.status,
            duration_ms = run.duration_ms(),
            "crawl session finished"
        );

        Ok(CrawlOutcome { run, queued })
    }

    fn transition(&self, state: &mut SessionState, to: SessionState) {
        if *state != to {
            debug!(from = state.as_str(), to = to.as_str(), "session state change");
            *state = to;
        }
    }
}
