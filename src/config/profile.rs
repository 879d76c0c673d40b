//! Site profile loading
//!
//! Profiles are small TOML documents overriding the built-in portal defaults,
//! e.g.
//!
//! ```toml
//! root-url = "https://staging.example.org/account/external-activities"
//!
//! [selectors]
//! next-button = ".p-paginator .p-paginator-next"
//! view-actions = ["td .open-detail"]
//! ```

use crate::config::SiteProfile;
use crate::{ConfigError, ConfigResult};
use std::fs;
use std::path::Path;
use url::Url;

/// Loads and validates a site profile from a TOML file
pub fn load_site_profile(path: &Path) -> ConfigResult<SiteProfile> {
    let content = fs::read_to_string(path)?;
    let profile: SiteProfile = toml::from_str(&content)?;

    if let Some(root) = &profile.root_url {
        Url::parse(root).map_err(|e| ConfigError::InvalidUrl(format!("{root}: {e}")))?;
    }
    for (name, value) in [
        ("list-component", &profile.selectors.list_component),
        ("table-body", &profile.selectors.table_body),
        ("next-button", &profile.selectors.next_button),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector `{name}` must not be empty"
            )));
        }
    }
    if profile.selectors.view_actions.is_empty() {
        return Err(ConfigError::Validation(
            "at least one view-action selector is required".to_string(),
        ));
    }

    Ok(profile)
}
