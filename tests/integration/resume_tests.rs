// Interrupt-and-resume behavior of batch processing.

use std::sync::atomic::Ordering;
use tempfile::TempDir;

use shopscout::models::{CrawlMode, NewProductRecord, ProcessingStage};
use shopscout::store::ProductStore;

use super::*;

fn five_candidates() -> Vec<shopscout::session::QueuedCandidate> {
    ["N1", "N2", "N3", "N4", "N5"]
        .iter()
        .map(|slug| shopscout::session::QueuedCandidate {
            entry: {
                let mut e = entry(slug, &format!("Product {}", slug), "49.99");
                e.normalized_url = format!("https://shop.example/dp/{}", slug);
                e
            },
            match_result: shopscout::models::MatchResult::unmatched(0.0, "no candidates"),
        })
        .collect()
}

#[tokio::test]
async fn test_interrupted_batch_resumes_where_it_stopped() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = create_test_app(&dir).await?;
    let candidates = five_candidates();

    // First invocation only gets through two items before "crashing".
    app.processor.process("batch-7", &candidates[..2]).await?;
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 2);

    // Resume with the full candidate list against the same checkpoint.
    let report = app.processor.process("batch-7", &candidates).await?;
    assert_eq!(report.processed, 5);
    assert_eq!(report.new_records, 5);
    // Only the unfinished tail was extracted
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 5);
    assert_eq!(report.cost_this_run, "0.03".parse()?);

    let records = app.store.find_by_normalized_url("shopco", "https://shop.example/dp/N1").await?;
    assert!(records.is_some());

    Ok(())
}

#[tokio::test]
async fn test_interrupted_run_matches_uninterrupted_run() -> anyhow::Result<()> {
    let candidates = five_candidates();

    // Run A: one uninterrupted pass.
    let dir_a = TempDir::new()?;
    let app_a = create_test_app(&dir_a).await?;
    let report_a = app_a.processor.process("batch-7", &candidates).await?;

    // Run B: interrupted after three, then resumed.
    let dir_b = TempDir::new()?;
    let app_b = create_test_app(&dir_b).await?;
    app_b.processor.process("batch-7", &candidates[..3]).await?;
    let report_b = app_b.processor.process("batch-7", &candidates).await?;

    assert_eq!(report_a.processed, report_b.processed);
    assert_eq!(report_a.new_records, report_b.new_records);
    assert_eq!(
        app_a.backend.calls.load(Ordering::SeqCst),
        app_b.backend.calls.load(Ordering::SeqCst)
    );
    for slug in ["N1", "N2", "N3", "N4", "N5"] {
        let url = format!("https://shop.example/dp/{}", slug);
        let a = app_a.store.find_by_normalized_url("shopco", &url).await?.unwrap();
        let b = app_b.store.find_by_normalized_url("shopco", &url).await?.unwrap();
        assert_eq!(a.processing_stage, b.processing_stage);
        assert_eq!(a.cost_incurred, b.cost_incurred);
    }

    Ok(())
}

#[tokio::test]
async fn test_crash_between_insert_and_checkpoint_does_not_duplicate() -> anyhow::Result<()> {
    // The at-least-once window: a record was inserted but the outcome
    // never reached the checkpoint file. On resume the item re-classifies
    // as existing and is skipped rather than re-inserted.
    let dir = TempDir::new()?;
    let app = create_test_app(&dir).await?;
    let candidates = five_candidates();

    app.store
        .insert(NewProductRecord {
            retailer: "shopco".to_string(),
            url: candidates[0].entry.source_url.clone(),
            normalized_url: candidates[0].entry.normalized_url.clone(),
            product_code: Some("N1".to_string()),
            title: "Product N1".to_string(),
            price: "49.99".parse()?,
        })
        .await?;

    let report = app.processor.process("batch-7", &candidates).await?;
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.new_records, 4);
    // N1 never paid for extraction
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.cost_this_run, "0.04".parse()?);

    // Still exactly one N1 row, untouched at its pre-crash stage
    let record = app
        .store
        .find_by_normalized_url("shopco", "https://shop.example/dp/N1")
        .await?
        .unwrap();
    assert_eq!(record.processing_stage, ProcessingStage::Discovered);

    Ok(())
}

#[tokio::test]
async fn test_resumed_monitoring_crawl_feeds_a_resumable_batch() -> anyhow::Result<()> {
    // A partial crawl still yields processable candidates, and the batch
    // made from them checkpoints like any other.
    let dir = TempDir::new()?;
    let app = create_test_app(&dir).await?;

    let fetcher = ScriptedFetcher::new(vec![
        Ok(vec![entry("N1", "Product N1", "49.99")]),
        Err(shopscout::fetch::FetchError::Permanent("listing 500".to_string())),
    ]);
    let outcome = session(&app, fetcher)
        .run("shopco", "dresses", CrawlMode::Monitoring)
        .await?;
    assert_eq!(outcome.run.status, shopscout::models::RunStatus::Partial);
    assert_eq!(outcome.queued.len(), 1);

    let report = app.processor.process(&outcome.run.run_id, &outcome.queued).await?;
    assert_eq!(report.new_records, 1);

    // Replaying the same batch is a no-op.
    let report = app.processor.process(&outcome.run.run_id, &outcome.queued).await?;
    assert_eq!(report.cost_this_run, rust_decimal::Decimal::ZERO);

    Ok(())
}
