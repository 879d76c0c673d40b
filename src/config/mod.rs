//! Configuration module
//!
//! A run is configured from CLI flags (see `main.rs`) into an explicit
//! [`RunConfig`] value that is passed down to every component; there is no
//! process-wide mutable configuration. An optional TOML *site profile* can
//! override the portal root URL and the selector set, keeping DOM-variant
//! handling data-driven.

mod profile;
mod types;

pub use profile::load_site_profile;
pub use types::{RunConfig, SiteProfile, SiteSelectors, TimingConfig, UploadConfig, DEFAULT_ROOT_URL};
