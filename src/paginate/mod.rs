//! Pagination protocol
//!
//! "Click next" against an asynchronously-rendered list can silently no-op
//! when the UI has not caught up, so no advance is ever trusted blindly: every
//! [`Paginator::advance_one`] records a fingerprint of the current row content
//! first and only reports progress once that fingerprint actually changed.
//! Without this check duplicate or skipped pages are possible, which would
//! break the shard-disjointness guarantee.
//!
//! The page cursor is never cached: the UI is the source of truth and can be
//! mutated externally (a dropped navigation, the user's own back button), so
//! the current page number is re-read on demand.

use crate::config::{SiteSelectors, TimingConfig};
use crate::driver::{Driver, DriverResult, Locator};
use crate::observe::PageObservation;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

pub struct Paginator {
    driver: Arc<dyn Driver>,
    selectors: Arc<SiteSelectors>,
    timing: TimingConfig,
}

impl Paginator {
    pub fn new(driver: Arc<dyn Driver>, selectors: Arc<SiteSelectors>, timing: TimingConfig) -> Self {
        Self {
            driver,
            selectors,
            timing,
        }
    }

    /// Locator for the list rows, scoped under the list component
    pub fn rows(&self) -> Locator {
        self.table_body().child(&self.selectors.row)
    }

    fn table_body(&self) -> Locator {
        Locator::css(&self.selectors.list_component).child(&self.selectors.table_body)
    }

    fn next_button(&self) -> Locator {
        Locator::css(&self.selectors.next_button)
    }

    /// Reads the highlighted page indicator; `None` when it is unreadable
    pub async fn current_page(&self) -> DriverResult<Option<u32>> {
        let text = self
            .driver
            .text(&Locator::css(&self.selectors.active_page))
            .await?;
        Ok(text.and_then(|t| t.trim().parse::<u32>().ok()))
    }

    /// Number of rows currently displayed
    pub async fn row_count(&self) -> DriverResult<usize> {
        self.driver.count(&self.rows()).await
    }

    /// Snapshot of the current row content, empty when the table is absent
    pub async fn fingerprint(&self) -> DriverResult<String> {
        Ok(self.driver.html(&self.table_body()).await?.unwrap_or_default())
    }

    /// Waits for the in-table spinner to clear, then (best effort) for rows
    pub async fn wait_rows_ready(&self) -> DriverResult<()> {
        let observation = PageObservation::new(
            Arc::clone(&self.driver),
            Locator::css(&self.selectors.list_spinner),
            self.rows(),
            self.timing.poll_interval,
        );
        // an empty result list is legitimate, so a missing row is not an error
        let _ = observation
            .wait_ready(self.timing.spinner_timeout, self.timing.rows_timeout)
            .await?;
        Ok(())
    }

    async fn next_enabled(&self) -> DriverResult<bool> {
        let next = self.next_button();
        if self.driver.count(&next).await? == 0 {
            return Ok(false);
        }
        if self.driver.attribute(&next, "disabled").await?.is_some() {
            return Ok(false);
        }
        let classes = self.driver.attribute(&next, "class").await?.unwrap_or_default();
        Ok(!classes.split_whitespace().any(|c| c == "p-disabled"))
    }

    /// Polls until the row fingerprint differs from `prev`
    async fn wait_swap(&self, prev: &str, timeout: Duration) -> DriverResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.fingerprint().await?;
            if !current.is_empty() && current != prev {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.timing.poll_interval).await;
        }
    }

    /// Advances one page, verified by a fingerprint change
    ///
    /// Returns `false` when the next control is disabled/absent or when the
    /// content never swapped within the retry budget; the caller must not
    /// assume progress occurred.
    pub async fn advance_one(&self) -> DriverResult<bool> {
        for attempt in 0..self.timing.advance_attempts {
            let prev = self.fingerprint().await?;
            if self.next_enabled().await? && self.driver.click(&self.next_button()).await? {
                self.wait_rows_ready().await?;
                if self.wait_swap(&prev, self.timing.swap_timeout).await? {
                    return Ok(true);
                }
                debug!("next-click attempt {} did not swap content", attempt + 1);
            }
            sleep(self.timing.advance_retry_pause).await;
        }
        Ok(false)
    }

    /// Advances `k` pages, all-or-nothing: the first failed advance aborts
    /// the stride and reports no overall progress guarantee
    pub async fn advance_by(&self, k: u32) -> DriverResult<bool> {
        for _ in 0..k {
            if !self.advance_one().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Advances until the indicator reads `target`, capped at a hard step
    /// budget because the remote page count is unknown in advance. Failing to
    /// land exactly is best-effort, not an error.
    pub async fn jump_to(&self, target: u32) -> DriverResult<()> {
        let mut current = match self.current_page().await? {
            Some(page) => Some(page),
            None => {
                self.wait_rows_ready().await?;
                self.current_page().await?
            }
        };

        let mut steps = 0u32;
        while let Some(page) = current {
            if page >= target || steps >= self.timing.jump_step_cap {
                break;
            }
            if !self.advance_one().await? {
                break;
            }
            current = Some(self.current_page().await?.unwrap_or(page + 1));
            steps += 1;
        }

        if current != Some(target) {
            warn!(
                "Fast-forward ended on page {:?}, expected {}",
                current, target
            );
        }
        Ok(())
    }
}
