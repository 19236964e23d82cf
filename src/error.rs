//! Error taxonomy for a scrape-and-ingest run.
//!
//! Every failure the pipeline can meet is a [`ScrapeError`]. Most of them are
//! contained at a boundary (the element, the post, or the source) and only
//! logged; [`ScrapeError::is_fatal`] names the ones that end the whole run and
//! surface at the request boundary.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The browser process could not be started or configured.
    #[error("browser launch failed: {0}")]
    LaunchFailure(String),

    /// The page did not settle before the navigation deadline.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// None of the candidate feed selectors appeared on the page.
    #[error("no feed container found (tried: {tried})")]
    FeedNotFound { tried: String },

    /// A single feed element could not be turned into a post.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A post carried a creation time that is not a valid instant.
    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    /// The store rejected a lookup or write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A CSS selector in the cascade does not parse.
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    /// Startup configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Any other browser-protocol fault during an open session.
    #[error("browser error: {0}")]
    Browser(String),
}

impl ScrapeError {
    /// Whether this error must abort the entire run instead of a single
    /// source, element or post.
    ///
    /// Faults inside an open session ([`ScrapeError::Browser`]) only cost
    /// that source; a browser that cannot start at all ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrapeError::LaunchFailure(_) | ScrapeError::Config(_))
    }
}

impl From<sqlx::Error> for ScrapeError {
    fn from(err: sqlx::Error) -> Self {
        ScrapeError::Persistence(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}
