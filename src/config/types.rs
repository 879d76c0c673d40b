use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default root of the external-activities list view.
pub const DEFAULT_ROOT_URL: &str = "https://mustamir.scfhs.org.sa/account/external-activities";

/// Complete configuration for one worker process
///
/// Built once at startup from CLI flags (plus an optional site profile) and
/// shared immutably for the process lifetime.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root URL of the paginated list view
    pub root_url: String,

    /// Local output directory (per-record artifacts go under `activities/`)
    pub out_dir: PathBuf,

    /// Pages processed by this shard before stopping (0 = until pagination ends)
    pub max_pages: u32,

    /// Global 1-based start page; the shard's effective start adds its index
    pub start_page: u32,

    /// Readiness timeout for the list view container
    pub list_timeout: Duration,

    /// Run the browser without a visible window
    pub headless: bool,

    /// Optional checkpoint upload target
    pub upload: Option<UploadConfig>,

    /// Polling cadences and bounded-wait budgets
    pub timing: TimingConfig,
}

/// Checkpoint upload configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Object-store endpoint; artifacts are `PUT {endpoint}/{key}`
    pub endpoint: String,

    /// Key prefix; sharded runs nest under `{prefix}/shard_{i+1}of{n}`
    pub prefix: String,

    /// Upload the cumulative artifact every N records (forced at end of page
    /// and end of run regardless)
    pub flush_every: u32,
}

/// Polling cadences and bounded-wait budgets
///
/// Every wait in the crawl is bounded by one of these except the top-level
/// reconnect loop, which retries forever with `navigate_backoff_max` between
/// attempts. Tests shrink these to keep paused-clock runs fast.
#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    /// Cadence for readiness polls
    pub poll_interval: Duration,

    /// Budget for a busy/loading indicator to disappear
    pub spinner_timeout: Duration,

    /// Budget for list rows to appear once the spinner is gone
    pub rows_timeout: Duration,

    /// Budget for the row-content fingerprint to change after a next-click
    pub swap_timeout: Duration,

    /// Pause between next-click attempts
    pub advance_retry_pause: Duration,

    /// Click-and-verify attempts per logical page advance
    pub advance_attempts: u32,

    /// Hard step cap for a forward jump (the remote page count is unknown)
    pub jump_step_cap: u32,

    /// Budget for a detail view's heading to appear
    pub detail_timeout: Duration,

    /// Budget for the agenda sub-component to attach inside its section
    pub section_attach_timeout: Duration,

    /// Settle pause after the list container is located
    pub settle: Duration,

    /// Initial delay of the unbounded reconnect loop
    pub navigate_backoff_initial: Duration,

    /// Delay ceiling of the unbounded reconnect loop
    pub navigate_backoff_max: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(150),
            spinner_timeout: Duration::from_secs(30),
            rows_timeout: Duration::from_secs(5),
            swap_timeout: Duration::from_secs(10),
            advance_retry_pause: Duration::from_millis(250),
            advance_attempts: 3,
            jump_step_cap: 4000,
            detail_timeout: Duration::from_secs(30),
            section_attach_timeout: Duration::from_secs(20),
            settle: Duration::from_millis(200),
            navigate_backoff_initial: Duration::from_secs(3),
            navigate_backoff_max: Duration::from_secs(120),
        }
    }
}

impl TimingConfig {
    /// A compressed variant for virtual-clock tests
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            spinner_timeout: Duration::from_millis(200),
            rows_timeout: Duration::from_millis(100),
            swap_timeout: Duration::from_millis(200),
            advance_retry_pause: Duration::from_millis(10),
            advance_attempts: 3,
            jump_step_cap: 4000,
            detail_timeout: Duration::from_millis(200),
            section_attach_timeout: Duration::from_millis(100),
            settle: Duration::from_millis(5),
            navigate_backoff_initial: Duration::from_millis(10),
            navigate_backoff_max: Duration::from_millis(50),
        }
    }
}

/// Selector set for the portal's DOM
///
/// These are data, not control flow: the view-affordance lookup walks
/// `view_actions` in priority order and new DOM variants are added here. Text
/// markers substitute for the `:has-text()` pseudo-class, which plain CSS
/// engines do not support.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteSelectors {
    /// The list-view component element
    pub list_component: String,

    /// Table body holding one row per activity
    pub table_body: String,

    /// Row selector, scoped under the table body
    pub row: String,

    /// In-table loading spinner
    pub list_spinner: String,

    /// Any loading spinner on a detail view
    pub detail_spinner: String,

    /// Highlighted page button in the paginator
    pub active_page: String,

    /// The paginator's next-page control
    pub next_button: String,

    /// Candidate elements for the language toggle
    pub language_switch: String,

    /// Text marking the real toggle among the candidates
    pub language_switch_text: String,

    /// Ordered "view" affordance strategies, first match wins
    pub view_actions: Vec<String>,

    /// Detail-view heading element
    pub detail_heading: String,

    /// Text marking the detail heading
    pub detail_heading_text: String,

    /// Named section headings on a detail view
    pub section_heading: String,

    /// Content block paired with each section heading
    pub section_body: String,

    /// Async agenda sub-component inside the scientific-program section
    pub agenda_component: String,

    /// Section title whose content renders asynchronously
    pub async_section_title: String,

    /// Labeled field group on a detail view
    pub field_group: String,

    /// Label element inside a field group
    pub field_label: String,

    /// Value paragraph inside a field group
    pub field_value: String,

    /// Candidate elements for the back-to-list control
    pub back_button: String,

    /// Text marking the back control
    pub back_button_text: String,

    /// Label of the singleton accredited-hours field
    pub hours_label: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            list_component: "app-list-external-activities".to_string(),
            table_body: "div.primeng-datatable-container table tbody, div.p-datatable table tbody"
                .to_string(),
            row: "tr".to_string(),
            list_spinner: "td.emptyTable .p-progress-spinner".to_string(),
            detail_spinner: ".p-progress-spinner".to_string(),
            active_page: ".p-paginator-pages .p-paginator-page.p-highlight".to_string(),
            next_button: ".p-paginator .p-paginator-next.p-paginator-element".to_string(),
            language_switch: "a.p-2.text-white.hover1".to_string(),
            language_switch_text: "English".to_string(),
            view_actions: vec![
                "td:last-of-type .action.mx-2".to_string(),
                "td .action.mx-2".to_string(),
                "td:last-of-type svg[viewBox=\"0 0 511.626 511.626\"]".to_string(),
                "svg[viewBox=\"0 0 511.626 511.626\"]".to_string(),
            ],
            detail_heading: "h4".to_string(),
            detail_heading_text: "Activity details".to_string(),
            section_heading: "h5".to_string(),
            section_body: "h5 + div".to_string(),
            agenda_component: "external-activity-agenda-list".to_string(),
            async_section_title: "Scientific Program".to_string(),
            field_group: ".form-group".to_string(),
            field_label: "label".to_string(),
            field_value: "p".to_string(),
            back_button: "button".to_string(),
            back_button_text: "Back".to_string(),
            hours_label: "Accredited CME Hours".to_string(),
        }
    }
}

/// Optional TOML site profile overriding the built-in portal defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteProfile {
    /// Root URL override
    pub root_url: Option<String>,

    /// Selector overrides (absent fields keep the defaults)
    #[serde(default)]
    pub selectors: SiteSelectors,
}
