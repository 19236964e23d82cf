//! Source list configuration.
//!
//! The ordered list of page URLs is fixed at startup and never changes during
//! a run. It comes from, in order of precedence:
//!
//! 1. `--source` flags / `FEED_SOURCES`
//! 2. a YAML file given with `--sources-file`
//! 3. the built-in [`DEFAULT_SOURCES`]
//!
//! ```yaml
//! sources:
//!   - https://www.facebook.com/OfficialLRTA
//!   - https://www.facebook.com/officialLRT1
//! ```

use std::path::Path;

use itertools::Itertools;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use crate::error::{Result, ScrapeError};

pub const DEFAULT_SOURCES: &[&str] = &[
    "https://www.facebook.com/OfficialLRTA",
    "https://www.facebook.com/officialLRT1",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub sources: Vec<String>,
}

impl SourceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ScrapeError::Config(format!("invalid sources file: {e}")))
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScrapeError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_yaml_str(&raw)?;
        info!(count = config.sources.len(), "Loaded sources file");
        Ok(config)
    }
}

/// Pick the effective source list and validate every URL.
///
/// Duplicates are dropped, keeping the first occurrence.
///
/// # Errors
///
/// [`ScrapeError::Config`] for a URL that is not absolute `http(s)`.
pub fn resolve_sources(cli: &[String], file: Option<&SourceConfig>) -> Result<Vec<String>> {
    let chosen: Vec<String> = if !cli.is_empty() {
        cli.to_vec()
    } else if let Some(file) = file.filter(|f| !f.sources.is_empty()) {
        file.sources.clone()
    } else {
        DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()
    };

    chosen
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unique()
        .map(validate_url)
        .collect()
}

fn validate_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| ScrapeError::Config(format!("invalid source url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(ScrapeError::Config(format!(
            "unsupported scheme {other:?} in source url {raw:?}"
        ))),
    }
}
