//! Two-tier recovery
//!
//! Anything that goes wrong mid-crawl funnels through here. Tier one tries to
//! re-acquire the list view in place within a bounded budget; when that lapses
//! (or the session itself errored) tier two reconnects from the root URL with
//! an unbounded, capped-backoff retry loop. Reconnecting re-runs locale
//! normalization, because a fresh load may come up in the wrong language
//! again.
//!
//! The page cursor is restored by fast-forwarding to the expected page; if the
//! portal reset its pagination the jump is best-effort and the page the UI
//! actually shows becomes authoritative.

use crate::config::{SiteSelectors, TimingConfig};
use crate::driver::{find_with_text, Driver, DriverError, DriverResult, Locator};
use crate::observe::{wait_gone, wait_present, Readiness};
use crate::paginate::Paginator;
use crate::retry::{run_with_retry, Backoff, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub struct RecoveryController {
    driver: Arc<dyn Driver>,
    selectors: Arc<SiteSelectors>,
    timing: TimingConfig,
    root_url: String,
    list_timeout: Duration,
}

impl RecoveryController {
    pub fn new(
        driver: Arc<dyn Driver>,
        selectors: Arc<SiteSelectors>,
        timing: TimingConfig,
        root_url: String,
        list_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            timing,
            root_url,
            list_timeout,
        }
    }

    /// Establishes (or re-establishes) a usable list view from scratch.
    ///
    /// Retries forever: a long portal outage stalls the run rather than
    /// killing it. Each attempt navigates to the root, normalizes the locale,
    /// and waits for the list container to render.
    pub async fn connect(&self) -> DriverResult<()> {
        let backoff = Backoff::exponential(
            self.timing.navigate_backoff_initial,
            self.timing.navigate_backoff_max,
            2.0,
        );
        run_with_retry(RetryPolicy::Unbounded, backoff, "portal connect", || async {
            self.driver.navigate(&self.root_url).await?;
            self.normalize_localization().await?;
            self.acquire_list().await
        })
        .await
    }

    /// Brings the crawl back to the expected list page after any failure.
    ///
    /// Returns the page the UI actually shows, which may differ from
    /// `expected` when the portal reset its pagination.
    pub async fn recover(
        &self,
        expected: Option<u32>,
        paginator: &Paginator,
    ) -> DriverResult<Option<u32>> {
        let in_place = self.reacquire_in_place().await;
        if let Err(e) = in_place {
            warn!("In-place recovery failed ({e}), reconnecting from the root");
            self.connect().await?;
        }
        paginator.wait_rows_ready().await?;

        if let Some(page) = expected {
            if paginator.current_page().await? != Some(page) {
                info!("Fast-forwarding back to page {page}");
                paginator.jump_to(page).await?;
            }
        }
        paginator.current_page().await
    }

    /// Tier one: wait out any in-flight loading and re-locate the list view
    /// without navigating
    async fn reacquire_in_place(&self) -> DriverResult<()> {
        self.wait_quiescent().await?;
        self.acquire_list().await
    }

    /// One-time locale normalization: click the language toggle until it
    /// disappears and the list view is present.
    ///
    /// Unbounded, because a half-localized session poisons every extracted
    /// label. A toggle that persists after clicking means the switch did not
    /// take; force a fresh load and try again.
    async fn normalize_localization(&self) -> DriverResult<()> {
        let backoff = Backoff::linear(
            self.timing.navigate_backoff_initial,
            self.timing.navigate_backoff_max,
        );
        let mut attempt = 0u32;
        loop {
            if let Some(toggle) = self.find_toggle().await? {
                if self.driver.click(&toggle).await? {
                    self.wait_quiescent().await?;
                }
            }
            if self.find_toggle().await?.is_none() && self.list_present().await? {
                return Ok(());
            }

            warn!("Locale switch did not take (attempt {}), reloading", attempt + 1);
            self.driver.navigate(&self.root_url).await?;
            sleep(backoff.delay_for(attempt)).await;
            attempt = attempt.saturating_add(1);
        }
    }

    async fn find_toggle(&self) -> DriverResult<Option<Locator>> {
        find_with_text(
            self.driver.as_ref(),
            &self.selectors.language_switch,
            &self.selectors.language_switch_text,
        )
        .await
    }

    async fn list_present(&self) -> DriverResult<bool> {
        Ok(self
            .driver
            .count(&Locator::css(&self.selectors.list_component))
            .await?
            > 0)
    }

    async fn wait_quiescent(&self) -> DriverResult<()> {
        wait_gone(
            self.driver.as_ref(),
            &Locator::css(&self.selectors.list_spinner),
            self.timing.spinner_timeout,
            self.timing.poll_interval,
        )
        .await?;
        sleep(self.timing.settle).await;
        Ok(())
    }

    async fn acquire_list(&self) -> DriverResult<()> {
        match wait_present(
            self.driver.as_ref(),
            &Locator::css(&self.selectors.list_component),
            self.list_timeout,
            self.timing.poll_interval,
        )
        .await?
        {
            Readiness::Ready => {
                sleep(self.timing.settle).await;
                Ok(())
            }
            Readiness::TimedOut => Err(DriverError::Navigation {
                url: self.root_url.clone(),
                message: "list view did not render".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{FixtureDriver, FixtureSite};

    fn controller_over(driver: Arc<FixtureDriver>, root: &str) -> RecoveryController {
        RecoveryController::new(
            driver,
            Arc::new(SiteSelectors::default()),
            TimingConfig::fast(),
            root.to_string(),
            Duration::from_millis(100),
        )
    }

    fn paginator_over(driver: Arc<FixtureDriver>) -> Paginator {
        Paginator::new(driver, Arc::new(SiteSelectors::default()), TimingConfig::fast())
    }

    #[tokio::test(start_paused = true)]
    async fn connect_normalizes_the_locale() {
        let site = FixtureSite::generate(2, 1);
        let root = site.root_url.clone();
        let driver = Arc::new(FixtureDriver::new(site));
        let controller = controller_over(Arc::clone(&driver), &root);

        controller.connect().await.unwrap();
        assert!(driver.is_localized());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_outlasts_transient_navigation_failures() {
        let site = FixtureSite::generate(1, 1);
        let root = site.root_url.clone();
        let driver = Arc::new(FixtureDriver::new(site).with_navigate_failures(3));
        let controller = controller_over(Arc::clone(&driver), &root);

        controller.connect().await.unwrap();
        assert!(driver.is_localized());
    }

    #[tokio::test(start_paused = true)]
    async fn recover_restores_the_expected_page_after_a_reset() {
        let site = FixtureSite::generate(4, 1);
        let root = site.root_url.clone();
        let driver = Arc::new(FixtureDriver::new(site));
        let controller = controller_over(Arc::clone(&driver), &root);
        let paginator = paginator_over(Arc::clone(&driver));

        controller.connect().await.unwrap();
        paginator.jump_to(3).await.unwrap();
        // a dropped session lands back on page 1
        driver.navigate(&root).await.unwrap();

        let page = controller.recover(Some(3), &paginator).await.unwrap();
        assert_eq!(page, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn recover_reports_the_observed_page_when_the_target_is_gone() {
        let site = FixtureSite::generate(2, 1);
        let root = site.root_url.clone();
        let driver = Arc::new(FixtureDriver::new(site));
        let controller = controller_over(Arc::clone(&driver), &root);
        let paginator = paginator_over(Arc::clone(&driver));

        controller.connect().await.unwrap();
        let page = controller.recover(Some(5), &paginator).await.unwrap();
        // only 2 pages exist: recovery lands on the last and says so
        assert_eq!(page, Some(2));
    }
}
