//! In-memory portal fixture
//!
//! Simulates the list/detail topology the crawl runs against: stride
//! pagination, per-row view affordances, detail views with labeled groups and
//! sections, the one-time language toggle, and the failure modes the resilient
//! core exists for (stale next-clicks, dropped navigations). Pages are
//! rendered to HTML and queried with real CSS selectors, so the production
//! selector set is exercised verbatim.

use crate::driver::{Driver, DriverError, DriverResult, Locator, LocatorStep};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Mutex;
use tracing::trace;

/// One activity detail view
#[derive(Debug, Clone)]
pub struct FixtureDetail {
    pub id: String,
    /// Labeled field groups; multi-valued fields render one `<p>` per value
    pub fields: Vec<(String, Vec<String>)>,
    /// Named sections (`<h5>` + following block)
    pub sections: Vec<(String, String)>,
    /// Whether the list row carries a view affordance
    pub has_view_action: bool,
}

impl FixtureDetail {
    /// A representative detail view with multi-valued fields and both sections
    pub fn sample(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fields: vec![
                (
                    "Activity Title".to_string(),
                    vec![format!("Advanced Cardiac Imaging {id}")],
                ),
                ("Activity Type".to_string(), vec!["Conference".to_string()]),
                (
                    "Specialty".to_string(),
                    vec!["Cardiology".to_string(), "Radiology".to_string()],
                ),
                (
                    "Accredited CME Hours".to_string(),
                    vec!["4.5".to_string()],
                ),
            ],
            sections: vec![
                (
                    "Objectives".to_string(),
                    "Review current imaging protocols".to_string(),
                ),
                (
                    "Scientific Program".to_string(),
                    format!("Day one agenda for activity {id}"),
                ),
            ],
            has_view_action: true,
        }
    }

    /// Drops a named section (e.g. an activity without a scientific program)
    pub fn without_section(mut self, title: &str) -> Self {
        self.sections.retain(|(t, _)| t != title);
        self
    }

    /// Drops the row's view affordance
    pub fn without_view_action(mut self) -> Self {
        self.has_view_action = false;
        self
    }
}

/// The simulated portal: a fixed page sequence of detail rows
#[derive(Debug, Clone)]
pub struct FixtureSite {
    pub root_url: String,
    /// Rows per list page, in pagination order
    pub pages: Vec<Vec<FixtureDetail>>,
    /// Whether the portal starts in the non-normalized locale
    pub needs_localization: bool,
}

impl FixtureSite {
    /// Generates `page_count` pages of `rows_per_page` sample activities with
    /// ids `"{page}{row:02}"` (page and row both 1-based)
    pub fn generate(page_count: usize, rows_per_page: usize) -> Self {
        let pages = (1..=page_count)
            .map(|page| {
                (1..=rows_per_page)
                    .map(|row| FixtureDetail::sample(&format!("{page}{row:02}")))
                    .collect()
            })
            .collect();
        Self {
            root_url: "https://portal.test/account/external-activities".to_string(),
            pages,
            needs_localization: true,
        }
    }

    /// The address a detail view is served under
    pub fn detail_url(&self, id: &str) -> String {
        format!("{}/{}", self.root_url.trim_end_matches('/'), id)
    }

    fn find_detail(&self, id: &str) -> Option<(usize, usize)> {
        for (p, rows) in self.pages.iter().enumerate() {
            for (r, detail) in rows.iter().enumerate() {
                if detail.id == id {
                    return Some((p, r));
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    /// 0-based list page index
    List { page: usize },
    Detail { page: usize, row: usize },
}

#[derive(Debug)]
struct FixtureState {
    view: View,
    history: Vec<View>,
    localized: bool,
    /// Next-clicks that silently no-op before pagination works again
    stale_next_clicks: u32,
    /// Navigations that fail before the portal becomes reachable
    navigate_failures: u32,
    /// Successful clicks left before the session starts erroring
    healthy_clicks_before_failure: u32,
    /// Clicks that error once the healthy budget is spent
    failing_clicks: u32,
    opened: Vec<String>,
}

/// In-memory [`Driver`] used by the test suite
pub struct FixtureDriver {
    site: FixtureSite,
    state: Mutex<FixtureState>,
}

impl FixtureDriver {
    pub fn new(site: FixtureSite) -> Self {
        let localized = !site.needs_localization;
        Self {
            site,
            state: Mutex::new(FixtureState {
                view: View::List { page: 0 },
                history: Vec::new(),
                localized,
                stale_next_clicks: 0,
                navigate_failures: 0,
                healthy_clicks_before_failure: 0,
                failing_clicks: 0,
                opened: Vec::new(),
            }),
        }
    }

    /// Makes the next `n` next-clicks no-ops (content never swaps)
    pub fn with_stale_next_clicks(self, n: u32) -> Self {
        self.state.lock().unwrap().stale_next_clicks = n;
        self
    }

    /// Makes the next `n` navigations fail
    pub fn with_navigate_failures(self, n: u32) -> Self {
        self.state.lock().unwrap().navigate_failures = n;
        self
    }

    /// After `healthy` further successful clicks, the next `failing` clicks
    /// error as if the session dropped mid-interaction
    pub fn with_click_failures(self, healthy: u32, failing: u32) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.healthy_clicks_before_failure = healthy;
            state.failing_clicks = failing;
        }
        self
    }

    /// Ids of detail views opened so far, in order
    pub fn opened_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Whether the language toggle has been activated
    pub fn is_localized(&self) -> bool {
        self.state.lock().unwrap().localized
    }

    fn render(&self, state: &FixtureState) -> String {
        match state.view {
            View::List { page } => self.render_list(page, state.localized),
            View::Detail { page, row } => self.render_detail(&self.site.pages[page][row]),
        }
    }

    fn render_list(&self, page: usize, localized: bool) -> String {
        let mut html = String::from("<html><body>");
        if self.site.needs_localization && !localized {
            html.push_str("<a class=\"p-2 text-white hover1\" data-lang=\"en\">English</a>");
        }
        html.push_str("<app-list-external-activities><div class=\"p-datatable\"><table><tbody>");
        for detail in &self.site.pages[page] {
            html.push_str(&format!("<tr><td>Activity {}</td><td>", detail.id));
            if detail.has_view_action {
                html.push_str(&format!(
                    "<span class=\"action mx-2\" data-view=\"{}\">view</span>",
                    detail.id
                ));
            }
            html.push_str("</td></tr>");
        }
        html.push_str("</tbody></table></div>");

        let last = page + 1 == self.site.pages.len();
        html.push_str(&format!(
            "<div class=\"p-paginator\"><div class=\"p-paginator-pages\">\
             <button class=\"p-paginator-page p-paginator-element p-link p-highlight\">{}</button>\
             </div><button class=\"p-paginator-next p-paginator-element{}\"{}>next</button></div>",
            page + 1,
            if last { " p-disabled" } else { "" },
            if last { " disabled" } else { "" },
        ));
        html.push_str("</app-list-external-activities></body></html>");
        html
    }

    fn render_detail(&self, detail: &FixtureDetail) -> String {
        let mut html = String::from("<html><body><h4>Activity Details</h4><div>");
        for (label, values) in &detail.fields {
            html.push_str(&format!("<div class=\"form-group\"><label>{label}</label>"));
            for value in values {
                html.push_str(&format!("<p>{value}</p>"));
            }
            html.push_str("</div>");
        }
        html.push_str("</div>");
        for (title, body) in &detail.sections {
            html.push_str(&format!("<h5>{title}</h5><div>"));
            if title.eq_ignore_ascii_case("scientific program") {
                html.push_str(&format!(
                    "<external-activity-agenda-list>{body}</external-activity-agenda-list>"
                ));
            } else {
                html.push_str(body);
            }
            html.push_str("</div>");
        }
        html.push_str("<button type=\"button\">Back</button></body></html>");
        html
    }

    /// Applies a click's effect based on what the resolved element is
    fn apply_click(&self, state: &mut FixtureState, element: ElementRef<'_>) {
        let value = element.value();

        if let Some(id) = value.attr("data-view") {
            if let Some((page, row)) = self.site.find_detail(id) {
                state.history.push(state.view);
                state.view = View::Detail { page, row };
                state.opened.push(id.to_string());
            }
            return;
        }

        if value.attr("data-lang").is_some() {
            state.localized = true;
            return;
        }

        let classes: Vec<&str> = value.attr("class").unwrap_or("").split_whitespace().collect();
        if classes.contains(&"p-paginator-next") {
            if value.attr("disabled").is_some() || classes.contains(&"p-disabled") {
                return;
            }
            if state.stale_next_clicks > 0 {
                state.stale_next_clicks -= 1;
                return;
            }
            if let View::List { page } = state.view {
                if page + 1 < self.site.pages.len() {
                    state.view = View::List { page: page + 1 };
                }
            }
            return;
        }

        if value.name() == "button" {
            let text: String = element.text().collect();
            if text.contains("Back") {
                state.view = state.history.pop().unwrap_or(View::List { page: 0 });
            }
        }
    }

    /// Resolves a locator chain against the rendered document and feeds the
    /// result to `f`
    fn with_resolved<T>(
        &self,
        steps: &[LocatorStep],
        f: impl FnOnce(&mut FixtureState, Option<ElementRef<'_>>) -> T,
    ) -> T {
        let mut state = self.state.lock().unwrap();
        let document = Html::parse_document(&self.render(&state));
        let resolved = resolve_steps(&document, steps);
        f(&mut state, resolved)
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            trace!("Unparseable selector {selector}: {e:?}");
            None
        }
    }
}

fn resolve_steps<'a>(document: &'a Html, steps: &[LocatorStep]) -> Option<ElementRef<'a>> {
    let (first, rest) = steps.split_first()?;
    let selector = parse_selector(&first.selector)?;
    let mut current = document.select(&selector).nth(first.index)?;
    for step in rest {
        let selector = parse_selector(&step.selector)?;
        current = current.select(&selector).nth(step.index)?;
    }
    Some(current)
}

#[async_trait]
impl Driver for FixtureDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.navigate_failures > 0 {
            state.navigate_failures -= 1;
            return Err(DriverError::Navigation {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }
        // Any root navigation (initial connect or forced reload) lands on the
        // first list page.
        state.view = View::List { page: 0 };
        state.history.clear();
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.state.lock().unwrap();
        Ok(match state.view {
            View::List { .. } => self.site.root_url.clone(),
            View::Detail { page, row } => self.site.detail_url(&self.site.pages[page][row].id),
        })
    }

    async fn back(&self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.view = state.history.pop().unwrap_or(View::List { page: 0 });
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        let Some((last, prefix)) = locator.steps.split_last() else {
            return Ok(0);
        };
        let state = self.state.lock().unwrap();
        let document = Html::parse_document(&self.render(&state));
        let Some(selector) = parse_selector(&last.selector) else {
            return Ok(0);
        };
        if prefix.is_empty() {
            return Ok(document.select(&selector).count());
        }
        Ok(match resolve_steps(&document, prefix) {
            Some(scope) => scope.select(&selector).count(),
            None => 0,
        })
    }

    async fn text(&self, locator: &Locator) -> DriverResult<Option<String>> {
        Ok(self.with_resolved(&locator.steps, |_, resolved| {
            resolved.map(|element| element.text().collect::<Vec<_>>().join(" "))
        }))
    }

    async fn html(&self, locator: &Locator) -> DriverResult<Option<String>> {
        Ok(self.with_resolved(&locator.steps, |_, resolved| {
            resolved.map(|element| element.inner_html())
        }))
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> DriverResult<Option<String>> {
        Ok(self.with_resolved(&locator.steps, |_, resolved| {
            resolved.and_then(|element| element.value().attr(name).map(str::to_string))
        }))
    }

    async fn click(&self, locator: &Locator) -> DriverResult<bool> {
        self.with_resolved(&locator.steps, |state, resolved| match resolved {
            Some(element) => {
                if state.healthy_clicks_before_failure > 0 {
                    state.healthy_clicks_before_failure -= 1;
                } else if state.failing_clicks > 0 {
                    state.failing_clicks -= 1;
                    return Err(DriverError::Protocol(
                        "session dropped mid-click".to_string(),
                    ));
                }
                self.apply_click(state, element);
                Ok(true)
            }
            None => Ok(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::find_with_text;

    #[tokio::test]
    async fn rows_and_paginator_resolve_with_production_selectors() {
        let driver = FixtureDriver::new(FixtureSite::generate(3, 2));
        let rows = Locator::css("app-list-external-activities")
            .child("div.primeng-datatable-container table tbody, div.p-datatable table tbody")
            .child("tr");
        assert_eq!(driver.count(&rows).await.unwrap(), 2);

        let active = Locator::css(".p-paginator-pages .p-paginator-page.p-highlight");
        assert_eq!(driver.text(&active).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn next_click_advances_until_the_last_page() {
        let driver = FixtureDriver::new(FixtureSite::generate(2, 1));
        let next = Locator::css(".p-paginator .p-paginator-next.p-paginator-element");
        assert!(driver.click(&next).await.unwrap());

        let active = Locator::css(".p-paginator-pages .p-paginator-page.p-highlight");
        assert_eq!(driver.text(&active).await.unwrap().as_deref(), Some("2"));
        // last page: control is disabled and clicking it is a no-op
        assert_eq!(
            driver.attribute(&next, "disabled").await.unwrap().as_deref(),
            Some("")
        );
        driver.click(&next).await.unwrap();
        assert_eq!(driver.text(&active).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn view_click_opens_the_detail_and_back_returns() {
        let site = FixtureSite::generate(1, 2);
        let root = site.root_url.clone();
        let driver = FixtureDriver::new(site);

        let action = Locator::css("tbody")
            .child_nth("tr", 1)
            .child("td:last-of-type .action.mx-2");
        assert!(driver.click(&action).await.unwrap());
        assert!(driver.current_url().await.unwrap().ends_with("/102"));
        assert_eq!(driver.opened_ids(), vec!["102".to_string()]);

        let back = find_with_text(&driver, "button", "Back").await.unwrap().unwrap();
        assert!(driver.click(&back).await.unwrap());
        assert_eq!(driver.current_url().await.unwrap(), root);
    }

    #[tokio::test]
    async fn language_toggle_disappears_after_activation() {
        let driver = FixtureDriver::new(FixtureSite::generate(1, 1));
        let link = find_with_text(&driver, "a.p-2.text-white.hover1", "English")
            .await
            .unwrap()
            .expect("toggle visible before normalization");
        assert!(driver.click(&link).await.unwrap());
        assert!(driver.is_localized());
        assert!(find_with_text(&driver, "a.p-2.text-white.hover1", "English")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn clicks_error_once_the_healthy_budget_is_spent() {
        let driver =
            FixtureDriver::new(FixtureSite::generate(1, 2)).with_click_failures(1, 1);
        let action = Locator::css("tbody")
            .child("tr")
            .child("td:last-of-type .action.mx-2");

        assert!(driver.click(&action).await.unwrap());
        driver.back().await.unwrap();
        assert!(matches!(
            driver.click(&action).await,
            Err(DriverError::Protocol(_))
        ));
        // the failure budget is spent, the session works again
        assert!(driver.click(&action).await.unwrap());
        assert_eq!(driver.opened_ids(), vec!["101", "101"]);
    }

    #[tokio::test]
    async fn stale_next_clicks_keep_content_stable() {
        let driver =
            FixtureDriver::new(FixtureSite::generate(3, 1)).with_stale_next_clicks(2);
        let next = Locator::css(".p-paginator .p-paginator-next.p-paginator-element");
        let tbody = Locator::css("div.p-datatable table tbody");
        let before = driver.html(&tbody).await.unwrap();

        driver.click(&next).await.unwrap();
        assert_eq!(driver.html(&tbody).await.unwrap(), before);
        driver.click(&next).await.unwrap();
        assert_eq!(driver.html(&tbody).await.unwrap(), before);
        // budget exhausted, pagination works again
        driver.click(&next).await.unwrap();
        assert_ne!(driver.html(&tbody).await.unwrap(), before);
    }
}
