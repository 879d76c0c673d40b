//! Page automation driver
//!
//! The crawl core never talks to a browser directly; it goes through the
//! [`Driver`] trait, whose element operations are addressed by a [`Locator`]
//! (an ordered chain of CSS-selector/index steps, resolved lazily against the
//! live page on every call). Absence of an element is an ordinary outcome
//! (`Ok(None)` / `Ok(0)` / `Ok(false)`), never an error, so readiness polling
//! can run without exception plumbing.
//!
//! Two implementations ship with the crate: [`CdpDriver`] drives a real
//! browser over the Chrome DevTools Protocol, and [`FixtureDriver`] simulates
//! the portal in memory for tests.

mod cdp;
mod fixture;

pub use cdp::CdpDriver;
pub use fixture::{FixtureDetail, FixtureDriver, FixtureSite};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by a driver
///
/// These describe a broken session or a failed navigation, not a missing
/// element; callers treat them as recoverable and escalate to the reconnect
/// protocol.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to start browser session: {0}")]
    Session(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// One resolution step: the nth match of a CSS selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorStep {
    pub selector: String,
    pub index: usize,
}

/// A lazily-resolved element address
///
/// Steps after the first are resolved within the element found by the
/// preceding step, so `Locator::css("app-list").child("tbody").child("tr")`
/// addresses rows inside the list component. Locators hold no element state:
/// the page is the source of truth and can change under us at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub steps: Vec<LocatorStep>,
}

impl Locator {
    /// First match of a selector at document scope
    pub fn css(selector: impl Into<String>) -> Self {
        Self::nth(selector, 0)
    }

    /// The nth match of a selector at document scope
    pub fn nth(selector: impl Into<String>, index: usize) -> Self {
        Self {
            steps: vec![LocatorStep {
                selector: selector.into(),
                index,
            }],
        }
    }

    /// First match of a selector within the current element
    pub fn child(self, selector: impl Into<String>) -> Self {
        self.child_nth(selector, 0)
    }

    /// The nth match of a selector within the current element
    pub fn child_nth(mut self, selector: impl Into<String>, index: usize) -> Self {
        self.steps.push(LocatorStep {
            selector: selector.into(),
            index,
        });
        self
    }

    /// Re-targets the final step to its nth match
    pub fn at(mut self, index: usize) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.index = index;
        }
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " >> ")?;
            }
            write!(f, "{}", step.selector)?;
            if step.index > 0 {
                write!(f, "[{}]", step.index)?;
            }
        }
        Ok(())
    }
}

/// Narrow automation contract the crawl core depends on
///
/// `count` reports how many elements match the locator's final step (scoped by
/// the preceding steps); `text`/`html`/`attribute` return `None` when the
/// locator resolves to nothing; `click` reports whether anything was clicked.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    /// History-back, used when a detail view has no usable back control
    async fn back(&self) -> DriverResult<()>;

    async fn count(&self, locator: &Locator) -> DriverResult<usize>;

    async fn text(&self, locator: &Locator) -> DriverResult<Option<String>>;

    async fn html(&self, locator: &Locator) -> DriverResult<Option<String>>;

    async fn attribute(&self, locator: &Locator, name: &str) -> DriverResult<Option<String>>;

    async fn click(&self, locator: &Locator) -> DriverResult<bool>;
}

/// Finds the first element under `selector` whose text contains `marker`
/// (case-insensitive). Substitute for the `:has-text()` pseudo-class.
pub async fn find_with_text(
    driver: &dyn Driver,
    selector: &str,
    marker: &str,
) -> DriverResult<Option<Locator>> {
    let marker = marker.to_lowercase();
    let total = driver.count(&Locator::css(selector)).await?;
    for index in 0..total {
        let locator = Locator::nth(selector, index);
        if let Some(text) = driver.text(&locator).await? {
            if text.to_lowercase().contains(&marker) {
                return Ok(Some(locator));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_steps_chain_in_order() {
        let locator = Locator::css("app-list").child("tbody").child_nth("tr", 4);
        assert_eq!(locator.steps.len(), 3);
        assert_eq!(locator.steps[2].selector, "tr");
        assert_eq!(locator.steps[2].index, 4);
    }

    #[test]
    fn at_retargets_only_the_final_step() {
        let locator = Locator::css("tbody").child("tr").at(7);
        assert_eq!(locator.steps[0].index, 0);
        assert_eq!(locator.steps[1].index, 7);
    }

    #[test]
    fn display_is_readable() {
        let locator = Locator::css("tbody").child_nth("tr", 2);
        assert_eq!(locator.to_string(), "tbody >> tr[2]");
    }
}
