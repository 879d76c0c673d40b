use crate::config::{SiteSelectors, TimingConfig};
use crate::driver::{find_with_text, Driver, DriverError, DriverResult, Locator};
use crate::extract::record::{activity_id_from_url, collapse_whitespace, ActivityRecord, VALUE_SEPARATOR};
use crate::observe::{wait_gone, wait_present, Readiness};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Why a detail view yielded no record
///
/// `NotReady` is a soft failure: the caller logs it, counts the row as
/// skipped, and moves on. A `Driver` error escalates to recovery instead.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Detail view never became ready")]
    NotReady,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Reads one activity detail view into an [`ActivityRecord`]
///
/// Expects the driver to already be on a detail view; waits for it to render,
/// then walks the labeled field groups, the named sections (pairing headings
/// with their following content blocks by index), and finally the singleton
/// accredited-hours field. Extraction never fails on a missing field: the
/// resulting record simply lacks that key.
pub struct ExtractionEngine {
    driver: Arc<dyn Driver>,
    selectors: Arc<SiteSelectors>,
    timing: TimingConfig,
}

impl ExtractionEngine {
    pub fn new(driver: Arc<dyn Driver>, selectors: Arc<SiteSelectors>, timing: TimingConfig) -> Self {
        Self {
            driver,
            selectors,
            timing,
        }
    }

    pub async fn extract(&self) -> ExtractResult<ActivityRecord> {
        self.wait_detail_ready().await?;

        let mut record = ActivityRecord::new();
        let url = self.driver.current_url().await?;
        let id = activity_id_from_url(&url);
        record.insert("URL", url);
        record.insert("Activity ID", id);

        self.extract_fields(&mut record).await?;
        self.extract_sections(&mut record).await?;
        self.extract_hours(&mut record).await?;
        Ok(record)
    }

    async fn wait_detail_ready(&self) -> ExtractResult<()> {
        wait_gone(
            self.driver.as_ref(),
            &Locator::css(&self.selectors.detail_spinner),
            self.timing.spinner_timeout,
            self.timing.poll_interval,
        )
        .await?;

        let deadline = Instant::now() + self.timing.detail_timeout;
        loop {
            let heading = find_with_text(
                self.driver.as_ref(),
                &self.selectors.detail_heading,
                &self.selectors.detail_heading_text,
            )
            .await?;
            if heading.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ExtractError::NotReady);
            }
            sleep(self.timing.poll_interval).await;
        }

        // sections render after the heading; their absence is legitimate
        let _ = wait_present(
            self.driver.as_ref(),
            &Locator::css(&self.selectors.section_heading),
            self.timing.rows_timeout,
            self.timing.poll_interval,
        )
        .await?;
        Ok(())
    }

    /// Labeled field groups: one key per label, multi-valued paragraphs
    /// joined with [`VALUE_SEPARATOR`]
    async fn extract_fields(&self, record: &mut ActivityRecord) -> DriverResult<()> {
        let groups = self
            .driver
            .count(&Locator::css(&self.selectors.field_group))
            .await?;
        for index in 0..groups {
            let group = Locator::nth(&self.selectors.field_group, index);
            let Some(label) = self
                .driver
                .text(&group.clone().child(&self.selectors.field_label))
                .await?
            else {
                continue;
            };
            let label = collapse_whitespace(label);
            if label.is_empty() {
                continue;
            }

            let values = self.group_values(&group).await?;
            if !values.is_empty() {
                record.insert(label, values.join(VALUE_SEPARATOR));
            }
        }
        Ok(())
    }

    async fn group_values(&self, group: &Locator) -> DriverResult<Vec<String>> {
        let count = self
            .driver
            .count(&group.clone().child(&self.selectors.field_value))
            .await?;
        let mut values = Vec::new();
        for index in 0..count {
            if let Some(text) = self
                .driver
                .text(&group.clone().child_nth(&self.selectors.field_value, index))
                .await?
            {
                let text = collapse_whitespace(text);
                if !text.is_empty() {
                    values.push(text);
                }
            }
        }
        Ok(values)
    }

    /// Named sections, pairing the nth heading with the nth following block
    async fn extract_sections(&self, record: &mut ActivityRecord) -> DriverResult<()> {
        let headings = self
            .driver
            .count(&Locator::css(&self.selectors.section_heading))
            .await?;
        let bodies = self
            .driver
            .count(&Locator::css(&self.selectors.section_body))
            .await?;
        if headings != bodies {
            debug!("{} section headings but {} content blocks", headings, bodies);
        }

        for index in 0..headings.min(bodies) {
            let Some(title) = self
                .driver
                .text(&Locator::nth(&self.selectors.section_heading, index))
                .await?
            else {
                continue;
            };
            let title = collapse_whitespace(title);
            if title.is_empty() {
                continue;
            }

            if title.eq_ignore_ascii_case(&self.selectors.async_section_title) {
                // the agenda sub-component attaches late; give it a bounded
                // window but take whatever has rendered when it lapses
                let agenda = Locator::nth(&self.selectors.section_body, index)
                    .child(&self.selectors.agenda_component);
                if let Readiness::TimedOut = wait_present(
                    self.driver.as_ref(),
                    &agenda,
                    self.timing.section_attach_timeout,
                    self.timing.poll_interval,
                )
                .await?
                {
                    debug!("Agenda component did not attach under '{}'", title);
                }
            }

            if let Some(body) = self
                .driver
                .text(&Locator::nth(&self.selectors.section_body, index))
                .await?
            {
                let body = collapse_whitespace(body);
                if !body.is_empty() {
                    record.insert(title, body);
                }
            }
        }
        Ok(())
    }

    /// Fallback for the accredited-hours field when the generic group walk
    /// missed it (some layouts detach its label from the group selector)
    async fn extract_hours(&self, record: &mut ActivityRecord) -> DriverResult<()> {
        if record.get(&self.selectors.hours_label).is_some() {
            return Ok(());
        }
        let groups = self
            .driver
            .count(&Locator::css(&self.selectors.field_group))
            .await?;
        for index in 0..groups {
            let group = Locator::nth(&self.selectors.field_group, index);
            let Some(label) = self
                .driver
                .text(&group.clone().child(&self.selectors.field_label))
                .await?
            else {
                continue;
            };
            if collapse_whitespace(label).eq_ignore_ascii_case(&self.selectors.hours_label) {
                if let Some(value) = self.group_values(&group).await?.into_iter().next() {
                    record.insert(self.selectors.hours_label.clone(), value);
                }
                return Ok(());
            }
        }
        Ok(())
    }
}
