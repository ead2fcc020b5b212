use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointManager, CheckpointState};
use crate::config::ScoutConfig;
use crate::extract::TierRouter;
use crate::matcher::MatchEngine;
use crate::models::{Classification, ItemOutcome, NewProductRecord, ProcessingStage};
use crate::session::QueuedCandidate;
use crate::sink::{ProductSink, SinkOutcome};
use crate::store::Stores;
use crate::Result;

/// Summary of one batch invocation. Outcome counts cover the whole batch,
/// including items finished by a previous interrupted invocation;
/// `cost_this_run` covers only work done now.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: String,
    pub processed: usize,
    pub new_records: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub rejected: usize,
    /// Suspected duplicates held back for external disposition. Not
    /// checkpointed, so a later run can pick them up once resolved.
    pub needs_review: usize,
    pub cost_this_run: Decimal,
}

/// Works through queued candidates: extract, persist, submit downstream,
/// checkpointing as it goes so an interrupted batch resumes where it
/// stopped instead of starting over.
///
/// Item identity is the normalized URL, which makes reprocessing the
/// checkpoint tail safe: a candidate whose record was already inserted
/// re-classifies as confirmed existing and is skipped without paying for
/// extraction again.
pub struct BatchProcessor {
    matcher: MatchEngine,
    router: Arc<TierRouter>,
    sink: Arc<dyn ProductSink>,
    stores: Stores,
    checkpoints: CheckpointManager,
}

impl BatchProcessor {
    pub fn new(
        config: Arc<ScoutConfig>,
        router: Arc<TierRouter>,
        sink: Arc<dyn ProductSink>,
        stores: Stores,
    ) -> Self {
        let checkpoints = CheckpointManager::new(&config.checkpoint);
        let matcher = MatchEngine::new(config);
        Self {
            matcher,
            router,
            sink,
            stores,
            checkpoints,
        }
    }

    pub async fn process(
        &self,
        batch_id: &str,
        candidates: &[QueuedCandidate],
    ) -> Result<BatchReport> {
        let mut state = self.checkpoints.load_or_start(batch_id).await?;
        let mut cost_this_run = Decimal::ZERO;
        let mut needs_review = 0usize;

        info!(
            batch_id,
            candidates = candidates.len(),
            already_done = state.processed_count(),
            "processing batch"
        );

        for candidate in candidates {
            let item_id = candidate.entry.item_id().to_string();
            if state.is_processed(&item_id) {
                debug!(batch_id, item = %item_id, "already checkpointed, skipping");
                continue;
            }

            // Ambiguous classifications are a terminal state for this
            // batch; they wait for external disposition.
            if candidate.match_result.is_uncertain() {
                info!(
                    batch_id,
                    item = %item_id,
                    confidence = candidate.match_result.confidence,
                    "suspected duplicate held for review"
                );
                needs_review += 1;
                continue;
            }

            let outcome = match self.process_one(candidate, &mut cost_this_run).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Persist progress before surfacing the failure so the
                    // finished prefix is not repeated on retry.
                    error!(batch_id, item = %item_id, error = %e, "batch aborting");
                    if let Err(flush_err) = self.checkpoints.flush(&mut state).await {
                        error!(batch_id, error = %flush_err, "checkpoint flush on abort failed");
                    }
                    return Err(e);
                }
            };

            state.record_outcome(&item_id, outcome);
            if self.checkpoints.should_flush(&state) {
                self.checkpoints.flush(&mut state).await?;
            }
        }

        self.checkpoints.flush(&mut state).await?;

        let report = BatchReport {
            batch_id: batch_id.to_string(),
            processed: state.processed_count(),
            new_records: state.count_of(ItemOutcome::Succeeded),
            skipped_existing: state.count_of(ItemOutcome::SkippedExisting),
            failed: state.count_of(ItemOutcome::Failed),
            rejected: state.count_of(ItemOutcome::Rejected),
            needs_review,
            cost_this_run,
        };
        info!(
            batch_id,
            processed = report.processed,
            new = report.new_records,
            skipped = report.skipped_existing,
            failed = report.failed,
            rejected = report.rejected,
            needs_review = report.needs_review,
            cost = %report.cost_this_run,
            "batch finished"
        );
        Ok(report)
    }

    /// Business failures (extraction exhausted, sink rejection) come back
    /// as outcomes; only persistence failures return Err and abort.
    async fn process_one(
        &self,
        candidate: &QueuedCandidate,
        cost_this_run: &mut Decimal,
    ) -> Result<ItemOutcome> {
        let entry = &candidate.entry;

        // Re-classify against the live store. Records inserted before an
        // interruption classify as existing here and cost nothing.
        let recheck = self
            .matcher
            .classify(entry, None, self.stores.products.as_ref())
            .await;
        if recheck.classification == Classification::ConfirmedExisting {
            debug!(item = %entry.item_id(), "already in product store, skipping");
            return Ok(ItemOutcome::SkippedExisting);
        }

        let extraction = self.router.extract(&entry.source_url, &entry.retailer).await?;
        *cost_this_run += extraction.total_cost;

        let Some(data) = extraction.data.filter(|_| extraction.success) else {
            warn!(
                item = %entry.item_id(),
                error = extraction.error.as_deref().unwrap_or("unknown"),
                "extraction exhausted all tiers"
            );
            return Ok(ItemOutcome::Failed);
        };

        let record = self
            .stores
            .products
            .insert(NewProductRecord {
                retailer: entry.retailer.clone(),
                url: entry.source_url.clone(),
                normalized_url: entry.normalized_url.clone(),
                product_code: data.product_code.clone().or_else(|| entry.product_code.clone()),
                title: data.title.clone().unwrap_or_else(|| entry.title.clone()),
                price: data.price.unwrap_or(entry.price),
            })
            .await?;
        self.stores
            .products
            .advance_stage(&record.id, ProcessingStage::Scraped)
            .await?;
        self.stores
            .products
            .add_cost(&record.id, extraction.total_cost)
            .await?;

        match self.sink.submit(&record, &data).await? {
            SinkOutcome::Accepted { external_id } => {
                self.stores
                    .products
                    .set_external_id(&record.id, &external_id)
                    .await?;
                self.stores
                    .products
                    .advance_stage(&record.id, ProcessingStage::Drafted)
                    .await?;
                Ok(ItemOutcome::Succeeded)
            }
            SinkOutcome::Rejected { reason } => {
                info!(item = %entry.item_id(), %reason, "sink rejected draft");
                Ok(ItemOutcome::Rejected)
            }
        }
    }
}
