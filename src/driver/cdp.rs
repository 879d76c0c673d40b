//! Chrome DevTools Protocol driver
//!
//! Drives a real Chromium instance through chromiumoxide. Locator chains are
//! resolved with `querySelectorAll` semantics: each step narrows the scope to
//! the nth match inside the previous step's element. Element reads that fail
//! because the DOM moved underneath us are reported as absence, not as errors;
//! the crawl's readiness polling re-reads until the page settles.

use crate::driver::{Driver, DriverError, DriverResult, Locator, LocatorStep};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::trace;

/// Browser-backed [`Driver`] implementation
pub struct CdpDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl CdpDriver {
    /// Launches a Chromium instance and opens a blank page
    pub async fn launch(headless: bool) -> DriverResult<Self> {
        let mut builder = BrowserConfig::builder();
        builder = if headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };
        let config = builder.build().map_err(DriverError::Session)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;

        // The handler stream must be polled for the CDP connection to make
        // progress; event errors are not fatal to the session.
        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("CDP handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Closes the browser and stops the handler task
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            trace!("Browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }

    /// Resolves a full locator chain to an element, `None` when any step
    /// matches nothing
    async fn resolve(&self, steps: &[LocatorStep]) -> DriverResult<Option<Element>> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(None);
        };

        let mut current = match self.page.find_elements(first.selector.as_str()).await {
            Ok(elements) => match elements.into_iter().nth(first.index) {
                Some(element) => element,
                None => return Ok(None),
            },
            Err(e) => {
                trace!("find_elements({}) failed: {}", first.selector, e);
                return Ok(None);
            }
        };

        for step in rest {
            current = match current.find_elements(step.selector.as_str()).await {
                Ok(elements) => match elements.into_iter().nth(step.index) {
                    Some(element) => element,
                    None => return Ok(None),
                },
                Err(e) => {
                    trace!("scoped find_elements({}) failed: {}", step.selector, e);
                    return Ok(None);
                }
            };
        }

        Ok(Some(current))
    }

    /// Builds a `querySelectorAll` walk returning the target's innerHTML
    fn snapshot_script(locator: &Locator) -> DriverResult<String> {
        let mut js = String::from("(function(){ let scope = document;\n");
        for (i, step) in locator.steps.iter().enumerate() {
            let selector = serde_json::to_string(&step.selector)
                .map_err(|e| DriverError::Script(e.to_string()))?;
            js.push_str(&format!(
                "const hits{i} = scope.querySelectorAll({selector});\n\
                 if (hits{i}.length <= {index}) return null;\n\
                 scope = hits{i}[{index}];\n",
                i = i,
                selector = selector,
                index = step.index,
            ));
        }
        js.push_str("return scope.innerHTML; })()");
        Ok(js)
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        // Best effort: SPA pages keep loading after the navigation commits,
        // readiness is the observation layer's job.
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        match self.page.url().await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => Ok("about:blank".to_string()),
            Err(e) => Err(DriverError::Protocol(e.to_string())),
        }
    }

    async fn back(&self) -> DriverResult<()> {
        self.page
            .evaluate("window.history.back()")
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        let Some((last, prefix)) = locator.steps.split_last() else {
            return Ok(0);
        };

        if prefix.is_empty() {
            return Ok(self
                .page
                .find_elements(last.selector.as_str())
                .await
                .map(|elements| elements.len())
                .unwrap_or(0));
        }

        match self.resolve(prefix).await? {
            Some(scope) => Ok(scope
                .find_elements(last.selector.as_str())
                .await
                .map(|elements| elements.len())
                .unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn text(&self, locator: &Locator) -> DriverResult<Option<String>> {
        match self.resolve(&locator.steps).await? {
            Some(element) => Ok(element.inner_text().await.ok().flatten()),
            None => Ok(None),
        }
    }

    async fn html(&self, locator: &Locator) -> DriverResult<Option<String>> {
        let script = Self::snapshot_script(locator)?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        result
            .into_value::<Option<String>>()
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> DriverResult<Option<String>> {
        match self.resolve(&locator.steps).await? {
            Some(element) => Ok(element.attribute(name).await.ok().flatten()),
            None => Ok(None),
        }
    }

    async fn click(&self, locator: &Locator) -> DriverResult<bool> {
        match self.resolve(&locator.steps).await? {
            Some(element) => match element.click().await {
                Ok(_) => Ok(true),
                Err(e) => {
                    trace!("Click on {} failed: {}", locator, e);
                    Ok(false)
                }
            },
            None => Ok(false),
        }
    }
}
