//! End-to-end harvest runs against the in-memory portal fixture
//!
//! Every test drives the full stack (connect, localization, pagination,
//! extraction, output, checkpoints) with compressed timings on a paused
//! clock, so even the timeout paths run instantly.

use async_trait::async_trait;
use cme_harvester::config::{RunConfig, SiteSelectors, TimingConfig, UploadConfig};
use cme_harvester::driver::{FixtureDetail, FixtureDriver, FixtureSite};
use cme_harvester::output::CsvSink;
use cme_harvester::upload::{UploadClient, UploadResult};
use cme_harvester::{Harvester, RunSummary, ShardPlan};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Records every uploaded key instead of talking to a store
#[derive(Default)]
struct RecordingUploader {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl UploadClient for RecordingUploader {
    async fn put(&self, _local: &Path, key: &str) -> UploadResult<()> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

struct TestRun {
    driver: Arc<FixtureDriver>,
    out_dir: TempDir,
    uploader: Option<Arc<RecordingUploader>>,
    summary: RunSummary,
}

async fn harvest(
    site: FixtureSite,
    plan: ShardPlan,
    max_pages: u32,
    upload: Option<UploadConfig>,
    shutdown_immediately: bool,
) -> TestRun {
    let out_dir = tempfile::tempdir().unwrap();
    let root_url = site.root_url.clone();
    let driver = Arc::new(FixtureDriver::new(site));
    let sink = CsvSink::new(out_dir.path(), &plan.artifact_suffix()).unwrap();
    let uploader = upload
        .as_ref()
        .map(|_| Arc::new(RecordingUploader::default()));

    let config = RunConfig {
        root_url,
        out_dir: out_dir.path().to_path_buf(),
        max_pages,
        start_page: 1,
        list_timeout: Duration::from_millis(100),
        headless: true,
        upload,
        timing: TimingConfig::fast(),
    };
    let shutdown = Arc::new(AtomicBool::new(shutdown_immediately));

    let harvester = Harvester::new(
        config,
        SiteSelectors::default(),
        plan,
        Arc::clone(&driver) as Arc<dyn cme_harvester::Driver>,
        Box::new(sink),
        uploader
            .as_ref()
            .map(|u| Arc::clone(u) as Arc<dyn UploadClient>),
        shutdown,
    );
    let summary = harvester.run().await.unwrap();

    TestRun {
        driver,
        out_dir,
        uploader,
        summary,
    }
}

#[tokio::test(start_paused = true)]
async fn an_unsharded_run_walks_every_page_in_order() {
    let run = harvest(
        FixtureSite::generate(3, 2),
        ShardPlan::plan(1, 0, 1).unwrap(),
        0,
        None,
        false,
    )
    .await;

    assert_eq!(run.summary.pages_processed, 3);
    assert_eq!(run.summary.records_extracted, 6);
    assert_eq!(run.summary.rows_skipped, 0);
    assert_eq!(
        run.driver.opened_ids(),
        vec!["101", "102", "201", "202", "301", "302"]
    );
    assert!(run.driver.is_localized());
}

#[tokio::test(start_paused = true)]
async fn a_sharded_worker_covers_exactly_its_stride() {
    // worker 2 of 3 from page 1: pages 2, 5, 8
    let run = harvest(
        FixtureSite::generate(8, 1),
        ShardPlan::plan(3, 1, 1).unwrap(),
        0,
        None,
        false,
    )
    .await;

    assert_eq!(run.summary.pages_processed, 3);
    assert_eq!(run.driver.opened_ids(), vec!["201", "501", "801"]);
}

#[tokio::test(start_paused = true)]
async fn the_page_cap_stops_the_walk_early() {
    let run = harvest(
        FixtureSite::generate(5, 1),
        ShardPlan::plan(1, 0, 1).unwrap(),
        2,
        None,
        false,
    )
    .await;

    assert_eq!(run.summary.pages_processed, 2);
    assert_eq!(run.driver.opened_ids(), vec!["101", "201"]);
}

#[tokio::test(start_paused = true)]
async fn a_row_without_a_view_affordance_is_counted_and_skipped() {
    let site = FixtureSite {
        pages: vec![vec![
            FixtureDetail::sample("101"),
            FixtureDetail::sample("102").without_view_action(),
        ]],
        ..FixtureSite::generate(1, 1)
    };
    let run = harvest(site, ShardPlan::plan(1, 0, 1).unwrap(), 0, None, false).await;

    assert_eq!(run.summary.records_extracted, 1);
    assert_eq!(run.summary.rows_skipped, 1);
    assert_eq!(run.driver.opened_ids(), vec!["101"]);
}

#[tokio::test(start_paused = true)]
async fn permanently_stale_pagination_ends_the_run_cleanly() {
    let site = FixtureSite::generate(3, 1);
    let out_dir = tempfile::tempdir().unwrap();
    let root_url = site.root_url.clone();
    let driver = Arc::new(FixtureDriver::new(site).with_stale_next_clicks(u32::MAX));
    let sink = CsvSink::new(out_dir.path(), "").unwrap();

    let config = RunConfig {
        root_url,
        out_dir: out_dir.path().to_path_buf(),
        max_pages: 0,
        start_page: 1,
        list_timeout: Duration::from_millis(100),
        headless: true,
        upload: None,
        timing: TimingConfig::fast(),
    };
    let harvester = Harvester::new(
        config,
        SiteSelectors::default(),
        ShardPlan::plan(1, 0, 1).unwrap(),
        Arc::clone(&driver) as Arc<dyn cme_harvester::Driver>,
        Box::new(sink),
        None,
        Arc::new(AtomicBool::new(false)),
    );
    let summary = harvester.run().await.unwrap();

    // page 1 is harvested; the dead next control ends the walk without error
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.records_extracted, 1);
}

#[tokio::test(start_paused = true)]
async fn a_mid_row_driver_error_is_recovered_without_aborting_the_page() {
    let site = FixtureSite::generate(1, 2);
    let out_dir = tempfile::tempdir().unwrap();
    let root_url = site.root_url.clone();
    // the first click localizes the portal; the next one (row 1's view
    // affordance) drops the session
    let driver = Arc::new(FixtureDriver::new(site).with_click_failures(1, 1));
    let sink = CsvSink::new(out_dir.path(), "").unwrap();

    let config = RunConfig {
        root_url,
        out_dir: out_dir.path().to_path_buf(),
        max_pages: 0,
        start_page: 1,
        list_timeout: Duration::from_millis(100),
        headless: true,
        upload: None,
        timing: TimingConfig::fast(),
    };
    let harvester = Harvester::new(
        config,
        SiteSelectors::default(),
        ShardPlan::plan(1, 0, 1).unwrap(),
        Arc::clone(&driver) as Arc<dyn cme_harvester::Driver>,
        Box::new(sink),
        None,
        Arc::new(AtomicBool::new(false)),
    );
    let summary = harvester.run().await.unwrap();

    // the failed row is counted and skipped; the rest of the page survives
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.records_extracted, 1);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(driver.opened_ids(), vec!["102"]);
}

#[tokio::test(start_paused = true)]
async fn a_requested_shutdown_stops_before_any_page() {
    let run = harvest(
        FixtureSite::generate(3, 1),
        ShardPlan::plan(1, 0, 1).unwrap(),
        0,
        None,
        true,
    )
    .await;

    assert_eq!(run.summary.pages_processed, 0);
    assert_eq!(run.summary.records_extracted, 0);
}

#[tokio::test(start_paused = true)]
async fn the_master_accumulates_every_extracted_record() {
    let run = harvest(
        FixtureSite::generate(2, 2),
        ShardPlan::plan(1, 0, 1).unwrap(),
        0,
        None,
        false,
    )
    .await;

    let master = run.out_dir.path().join("external_activities_master.csv");
    let content = std::fs::read_to_string(master).unwrap();
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("URL,Activity ID,"));
    assert_eq!(lines.count(), 4);

    // one artifact per record as well
    for id in ["101", "102", "201", "202"] {
        assert!(run
            .out_dir
            .path()
            .join("activities")
            .join(format!("detail_{id}.csv"))
            .exists());
    }
}

#[tokio::test(start_paused = true)]
async fn checkpoints_are_uploaded_under_the_shard_prefix() {
    let upload = UploadConfig {
        endpoint: "https://store.test/bucket".to_string(),
        prefix: "runs/current".to_string(),
        flush_every: 2,
    };
    let run = harvest(
        FixtureSite::generate(1, 3),
        ShardPlan::plan(2, 0, 1).unwrap(),
        0,
        Some(upload),
        false,
    )
    .await;

    let keys = run.uploader.as_ref().unwrap().keys.lock().unwrap().clone();
    assert!(keys.contains(&"runs/current/shard_1of2/activities/detail_101.csv".to_string()));
    assert!(keys.contains(&"runs/current/shard_1of2/activities/detail_103.csv".to_string()));

    let master_key = "runs/current/shard_1of2/external_activities_master_shard1of2.csv";
    let master_uploads = keys.iter().filter(|k| *k == master_key).count();
    // once at the 2-record flush threshold, plus the forced page/run flushes
    assert!(master_uploads >= 2, "saw {master_uploads} master uploads");
}

#[tokio::test(start_paused = true)]
async fn a_flaky_portal_is_absorbed_by_reconnection() {
    let site = FixtureSite::generate(2, 1);
    let out_dir = tempfile::tempdir().unwrap();
    let root_url = site.root_url.clone();
    let driver = Arc::new(FixtureDriver::new(site).with_navigate_failures(2));
    let sink = CsvSink::new(out_dir.path(), "").unwrap();

    let config = RunConfig {
        root_url,
        out_dir: out_dir.path().to_path_buf(),
        max_pages: 0,
        start_page: 1,
        list_timeout: Duration::from_millis(100),
        headless: true,
        upload: None,
        timing: TimingConfig::fast(),
    };
    let harvester = Harvester::new(
        config,
        SiteSelectors::default(),
        ShardPlan::plan(1, 0, 1).unwrap(),
        Arc::clone(&driver) as Arc<dyn cme_harvester::Driver>,
        Box::new(sink),
        None,
        Arc::new(AtomicBool::new(false)),
    );
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.records_extracted, 2);
}
