//! Page readiness observation
//!
//! The remote list renders asynchronously: a busy spinner appears, content
//! swaps, and required elements attach late. This module is the single place
//! that turns that timing noise into a yes/no answer. Readiness is modeled as
//! an explicit phase machine driven by two read-only observations (busy
//! indicator visible? required marker present?), with the polling loop kept
//! separate from the transition logic so the latter is testable without a UI.
//!
//! Ordinary timing never produces an error here: a wait that runs out of
//! budget returns [`Readiness::TimedOut`] and the caller decides whether to
//! retry or skip.

use crate::driver::{Driver, DriverResult, Locator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Where the observed page is in its render cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservePhase {
    /// Nothing observed yet
    Idle,
    /// Busy indicator visible
    Loading,
    /// Busy indicator gone and the required marker present
    Ready,
    /// Marker was present but has gone away again (content being swapped)
    Stale,
}

/// Outcome of a bounded readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Pure transition function for the readiness machine
pub fn advance_phase(phase: ObservePhase, busy: bool, marker_present: bool) -> ObservePhase {
    match (busy, marker_present) {
        (true, _) => ObservePhase::Loading,
        (false, true) => ObservePhase::Ready,
        (false, false) => match phase {
            ObservePhase::Ready | ObservePhase::Stale => ObservePhase::Stale,
            _ => ObservePhase::Idle,
        },
    }
}

/// Bounded readiness polling over a busy indicator and a required marker
pub struct PageObservation {
    driver: Arc<dyn Driver>,
    busy: Locator,
    marker: Locator,
    poll_interval: Duration,
}

impl PageObservation {
    pub fn new(
        driver: Arc<dyn Driver>,
        busy: Locator,
        marker: Locator,
        poll_interval: Duration,
    ) -> Self {
        Self {
            driver,
            busy,
            marker,
            poll_interval,
        }
    }

    /// Waits for the busy indicator to clear (bounded by `busy_timeout`), then
    /// for the marker to attach (bounded separately by `marker_timeout`)
    pub async fn wait_ready(
        &self,
        busy_timeout: Duration,
        marker_timeout: Duration,
    ) -> DriverResult<Readiness> {
        if self.wait_busy_gone(busy_timeout).await? == Readiness::TimedOut {
            return Ok(Readiness::TimedOut);
        }
        wait_present(self.driver.as_ref(), &self.marker, marker_timeout, self.poll_interval).await
    }

    /// Waits for the busy indicator to clear; a page with no indicator at all
    /// is immediately quiet
    pub async fn wait_busy_gone(&self, timeout: Duration) -> DriverResult<Readiness> {
        let deadline = Instant::now() + timeout;
        let mut phase = ObservePhase::Idle;
        loop {
            let busy = self.driver.count(&self.busy).await? > 0;
            let next = advance_phase(phase, busy, false);
            if next != phase {
                trace!("observe phase {:?} -> {:?}", phase, next);
                phase = next;
            }
            if !busy {
                return Ok(Readiness::Ready);
            }
            if Instant::now() >= deadline {
                return Ok(Readiness::TimedOut);
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Polls until the locator matches at least one element
pub async fn wait_present(
    driver: &dyn Driver,
    locator: &Locator,
    timeout: Duration,
    poll_interval: Duration,
) -> DriverResult<Readiness> {
    let deadline = Instant::now() + timeout;
    loop {
        if driver.count(locator).await? > 0 {
            return Ok(Readiness::Ready);
        }
        if Instant::now() >= deadline {
            return Ok(Readiness::TimedOut);
        }
        sleep(poll_interval).await;
    }
}

/// Polls until the locator matches nothing
pub async fn wait_gone(
    driver: &dyn Driver,
    locator: &Locator,
    timeout: Duration,
    poll_interval: Duration,
) -> DriverResult<Readiness> {
    let deadline = Instant::now() + timeout;
    loop {
        if driver.count(locator).await? == 0 {
            return Ok(Readiness::Ready);
        }
        if Instant::now() >= deadline {
            return Ok(Readiness::TimedOut);
        }
        sleep(poll_interval).await;
    }
}
