//! Run loop
//!
//! Owns the outer crawl: connect, fast-forward to the shard's start page, then
//! alternate page processing with stride advances until pagination ends, the
//! page cap is hit, or shutdown is requested. Failures stay local: a row that
//! cannot be extracted is counted and skipped, a wobbling session goes through
//! recovery, and only a configuration or disk problem can abort the run.

use crate::config::RunConfig;
use crate::driver::{find_with_text, Driver, DriverResult, Locator};
use crate::extract::{ExtractError, ExtractionEngine};
use crate::output::RecordSink;
use crate::paginate::Paginator;
use crate::recover::RecoveryController;
use crate::shard::ShardPlan;
use crate::upload::UploadClient;
use crate::{HarvestError, SiteSelectors};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one worker accomplished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages_processed: u32,
    pub records_extracted: u64,
    pub rows_skipped: u64,
}

/// How one list row ended up
enum RowOutcome {
    Extracted,
    Skipped,
}

/// One worker: a browser session walking its shard of the paginated list
pub struct Harvester {
    config: RunConfig,
    driver: Arc<dyn Driver>,
    selectors: Arc<SiteSelectors>,
    paginator: Paginator,
    recovery: RecoveryController,
    engine: ExtractionEngine,
    plan: ShardPlan,
    sink: Box<dyn RecordSink>,
    uploader: Option<Arc<dyn UploadClient>>,
    key_prefix: String,
    rows_since_flush: u32,
    shutdown: Arc<AtomicBool>,
    summary: RunSummary,
}

impl Harvester {
    pub fn new(
        config: RunConfig,
        selectors: SiteSelectors,
        plan: ShardPlan,
        driver: Arc<dyn Driver>,
        sink: Box<dyn RecordSink>,
        uploader: Option<Arc<dyn UploadClient>>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let selectors = Arc::new(selectors);
        let paginator = Paginator::new(Arc::clone(&driver), Arc::clone(&selectors), config.timing);
        let recovery = RecoveryController::new(
            Arc::clone(&driver),
            Arc::clone(&selectors),
            config.timing,
            config.root_url.clone(),
            config.list_timeout,
        );
        let engine =
            ExtractionEngine::new(Arc::clone(&driver), Arc::clone(&selectors), config.timing);
        let key_prefix = config
            .upload
            .as_ref()
            .map(|u| plan.key_prefix(&u.prefix))
            .unwrap_or_default();
        Self {
            config,
            driver,
            selectors,
            paginator,
            recovery,
            engine,
            plan,
            sink,
            uploader,
            key_prefix,
            rows_since_flush: 0,
            shutdown,
            summary: RunSummary::default(),
        }
    }

    pub async fn run(mut self) -> crate::Result<RunSummary> {
        info!(
            "Starting shard {}/{} at page {}, stride {}",
            self.plan.shard_index + 1,
            self.plan.shard_count,
            self.plan.effective_start_page,
            self.plan.stride
        );

        self.recovery.connect().await?;
        self.paginator.wait_rows_ready().await?;
        if self.plan.effective_start_page > 1 {
            self.paginator.jump_to(self.plan.effective_start_page).await?;
        }
        let mut expected = self
            .paginator
            .current_page()
            .await?
            .unwrap_or(self.plan.effective_start_page);

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping before page {expected}");
                break;
            }
            if let Some(observed) = self.paginator.current_page().await? {
                if observed != expected {
                    // the UI is authoritative; a reset collapses drift here
                    warn!("Expected page {expected} but the UI shows {observed}");
                    expected = observed;
                }
            }

            self.process_page(expected).await?;
            self.summary.pages_processed += 1;
            self.upload_master(true).await;

            if self.config.max_pages > 0 && self.summary.pages_processed >= self.config.max_pages {
                info!("Reached the {}-page cap", self.config.max_pages);
                break;
            }
            if self.shutdown_requested() {
                info!("Shutdown requested after page {expected}");
                break;
            }
            match self.paginator.advance_by(self.plan.stride).await {
                Ok(true) => expected += self.plan.stride,
                Ok(false) => {
                    info!("Pagination ended after page {expected}");
                    break;
                }
                Err(e) => {
                    warn!("Advance from page {expected} failed: {e}");
                    let target = expected + self.plan.stride;
                    match self.recovery.recover(Some(target), &self.paginator).await? {
                        Some(observed) if observed > expected => expected = observed,
                        _ => break,
                    }
                }
            }
        }

        self.upload_master(true).await;
        info!(
            "Done: {} page(s), {} record(s), {} skipped row(s)",
            self.summary.pages_processed,
            self.summary.records_extracted,
            self.summary.rows_skipped
        );
        Ok(self.summary)
    }

    async fn process_page(&mut self, page: u32) -> crate::Result<()> {
        let rows = self.paginator.row_count().await?;
        info!("Page {page}: {rows} row(s)");

        for index in 0..rows {
            if self.shutdown_requested() {
                break;
            }
            match self.process_row(page, index).await {
                Ok(RowOutcome::Extracted) => {}
                Ok(RowOutcome::Skipped) => self.summary.rows_skipped += 1,
                Err(HarvestError::Driver(e)) => {
                    warn!("Row {} on page {page} failed: {e}", index + 1);
                    self.summary.rows_skipped += 1;
                    self.recovery.recover(Some(page), &self.paginator).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn process_row(&mut self, page: u32, index: usize) -> crate::Result<RowOutcome> {
        let Some(action) = self.find_view_action(index).await? else {
            debug!("Row {} on page {page} has no view affordance", index + 1);
            return Ok(RowOutcome::Skipped);
        };
        if !self.driver.click(&action).await? {
            return Ok(RowOutcome::Skipped);
        }

        let outcome = match self.engine.extract().await {
            Ok(record) => {
                let detail = self.sink.append(&record)?;
                self.summary.records_extracted += 1;
                self.rows_since_flush += 1;
                debug!("Extracted activity {} ({} fields)", record.id(), record.len());
                self.upload_detail(&detail).await;
                self.upload_master(false).await;
                RowOutcome::Extracted
            }
            Err(ExtractError::NotReady) => {
                warn!("Detail view for row {} on page {page} never rendered", index + 1);
                RowOutcome::Skipped
            }
            Err(ExtractError::Driver(e)) => return Err(HarvestError::Driver(e)),
        };

        self.return_to_list(page).await?;
        Ok(outcome)
    }

    /// Walks the view-affordance strategies in priority order within the row
    async fn find_view_action(&self, index: usize) -> DriverResult<Option<Locator>> {
        let row = self.paginator.rows().at(index);
        for strategy in &self.selectors.view_actions {
            let candidate = row.clone().child(strategy);
            if self.driver.count(&candidate).await? > 0 {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Leaves the detail view and re-establishes the expected list page
    async fn return_to_list(&self, page: u32) -> crate::Result<()> {
        let back = find_with_text(
            self.driver.as_ref(),
            &self.selectors.back_button,
            &self.selectors.back_button_text,
        )
        .await?;
        match back {
            Some(button) => {
                self.driver.click(&button).await?;
            }
            None => self.driver.back().await?,
        }
        self.recovery.recover(Some(page), &self.paginator).await?;
        Ok(())
    }

    /// Mirrors a per-record artifact; failures are logged, never fatal
    async fn upload_detail(&self, path: &Path) {
        let Some(uploader) = self.uploader.clone() else {
            return;
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let key = format!("{}/activities/{}", self.key_prefix, name);
        if let Err(e) = uploader.put(path, &key).await {
            warn!("Detail upload failed for {key}: {e}");
        }
    }

    /// Mirrors the cumulative master, either because the per-record flush
    /// threshold was reached or forced at a page/run boundary
    async fn upload_master(&mut self, force: bool) {
        let Some(uploader) = self.uploader.clone() else {
            return;
        };
        let flush_every = self
            .config
            .upload
            .as_ref()
            .map(|u| u.flush_every)
            .unwrap_or(0);
        if !force && (flush_every == 0 || self.rows_since_flush < flush_every) {
            return;
        }

        let path = self.sink.master_path().to_path_buf();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return;
        };
        let key = format!("{}/{}", self.key_prefix, name);
        match uploader.put(&path, &key).await {
            Ok(()) => self.rows_since_flush = 0,
            Err(e) => warn!("Master upload failed for {key}: {e}"),
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
