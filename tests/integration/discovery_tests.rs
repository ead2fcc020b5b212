// End-to-end discovery workflow over a real (in-memory) database.

use tempfile::TempDir;

use shopscout::models::{Classification, CrawlMode, ProcessingStage, RunStatus};
use shopscout::store::{BaselineStore, ProductStore};

use super::*;

#[tokio::test]
async fn test_baseline_then_monitoring_discovers_one_new_product() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = create_test_app(&dir).await?;

    // Day 0: establish the baseline inventory.
    let fetcher = ScriptedFetcher::new(vec![
        Ok(vec![
            entry("A1", "Blue Midi Dress", "49.99"),
            entry("A2", "Red Wrap Skirt", "35.00"),
        ]),
        Ok(vec![entry("A3", "Linen Shirt", "59.95")]),
    ]);
    let outcome = session(&app, fetcher)
        .run("shopco", "dresses", CrawlMode::Baseline)
        .await?;
    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert!(outcome.queued.is_empty());

    let snapshot = app.stores.baselines.latest("shopco", "dresses").await?.unwrap();
    assert_eq!(snapshot.entries.len(), 3);
    // URLs are canonicalized through the retailer's stable-id rule
    assert!(snapshot
        .entries
        .iter()
        .all(|e| e.normalized_url.starts_with("https://shop.example/dp/")));

    // Day 1: the same three products plus one new arrival.
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![
        entry("NEW9", "Velvet Blazer", "120.00"),
        entry("A1", "Blue Midi Dress", "49.99"),
        entry("A2", "Red Wrap Skirt", "35.00"),
        entry("A3", "Linen Shirt", "59.95"),
    ])]);
    let outcome = session(&app, fetcher)
        .run("shopco", "dresses", CrawlMode::Monitoring)
        .await?;

    assert_eq!(outcome.run.existing_found, 3);
    assert_eq!(outcome.queued.len(), 1);
    let candidate = &outcome.queued[0];
    assert_eq!(candidate.entry.product_code.as_deref(), Some("NEW9"));
    assert_eq!(candidate.match_result.classification, Classification::New);

    // Process the discovery through extraction and drafting.
    let report = app.processor.process("batch-day1", &outcome.queued).await?;
    assert_eq!(report.new_records, 1);
    assert_eq!(report.cost_this_run, "0.01".parse()?);

    let record = app
        .stores
        .products
        .find_by_normalized_url("shopco", "https://shop.example/dp/NEW9")
        .await?
        .unwrap();
    assert_eq!(record.processing_stage, ProcessingStage::Drafted);
    assert!(record.external_id.is_some());
    assert_eq!(record.cost_incurred, "0.01".parse()?);
    assert_eq!(app.sink.submissions().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_processed_product_is_existing_on_the_next_crawl() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = create_test_app(&dir).await?;

    let day1 = ScriptedFetcher::new(vec![Ok(vec![entry("NEW9", "Velvet Blazer", "120.00")])]);
    let outcome = session(&app, day1)
        .run("shopco", "dresses", CrawlMode::Monitoring)
        .await?;
    app.processor.process("batch-day1", &outcome.queued).await?;

    // Day 2: the product shows up again, now with tracking junk on the URL.
    let mut reseen = entry("NEW9", "Velvet Blazer", "120.00");
    reseen.source_url = "https://shop.example/brand/dp/NEW9/?utm_source=mail#top".to_string();
    let day2 = ScriptedFetcher::new(vec![Ok(vec![reseen])]);
    let outcome = session(&app, day2)
        .run("shopco", "dresses", CrawlMode::Monitoring)
        .await?;

    assert_eq!(outcome.run.existing_found, 1);
    assert!(outcome.queued.is_empty());
    assert_eq!(app.backend.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_run_log_captures_both_modes() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = create_test_app(&dir).await?;

    let fetcher = ScriptedFetcher::new(vec![Ok(vec![entry("A1", "Blue Midi Dress", "49.99")])]);
    session(&app, fetcher)
        .run("shopco", "dresses", CrawlMode::Baseline)
        .await?;
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![entry("A1", "Blue Midi Dress", "49.99")])]);
    session(&app, fetcher)
        .run("shopco", "dresses", CrawlMode::Monitoring)
        .await?;

    let runs = app.store.runs_for("shopco").await?;
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().any(|r| r.mode == CrawlMode::Baseline));
    assert!(runs.iter().any(|r| r.mode == CrawlMode::Monitoring));
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));

    Ok(())
}
