//! cme-harvester: a resilient, shardable extraction worker for the Mustamir
//! CME external-activities portal.
//!
//! One worker process owns one browser session and walks a stride-spaced subset
//! of the portal's paginated activity list, opening each row's detail view,
//! extracting a labeled record, and persisting it incrementally. Transient UI
//! failures (slow loads, stale DOM, dropped navigations, localization resets)
//! are absorbed by a two-tier recovery protocol rather than surfaced.

pub mod config;
pub mod driver;
pub mod extract;
pub mod observe;
pub mod output;
pub mod paginate;
pub mod recover;
pub mod retry;
pub mod run;
pub mod shard;
pub mod upload;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Upload error: {0}")]
    Upload(#[from] upload::UploadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These fail fast at startup, before any navigation happens. Nothing else in
/// the crate is allowed to abort a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read site profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{RunConfig, SiteSelectors, TimingConfig, UploadConfig};
pub use driver::{Driver, Locator};
pub use extract::ActivityRecord;
pub use run::{Harvester, RunSummary};
pub use shard::ShardPlan;
