//! Feed container detection.

use std::time::Duration;

use itertools::Itertools;
use tracing::{info, instrument};

use crate::error::{Result, ScrapeError};
use crate::scrapers::session::BrowserSession;

/// Default wait granted to each candidate selector.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Probe `selectors` in order, each with its own `probe_timeout`, and return
/// the first one present on the page.
///
/// # Errors
///
/// [`ScrapeError::FeedNotFound`] when no selector appeared. Browser faults
/// during a probe are propagated as-is.
#[instrument(level = "info", skip(session, selectors), fields(candidates = selectors.len()))]
pub async fn locate_feed<'a>(
    session: &dyn BrowserSession,
    selectors: &[&'a str],
    probe_timeout: Duration,
) -> Result<&'a str> {
    for &selector in selectors {
        if session.wait_for_selector(selector, probe_timeout).await? {
            info!(selector, "Found feed");
            return Ok(selector);
        }
        info!(selector, timeout_ms = probe_timeout.as_millis() as u64, "Feed selector timed out");
    }
    Err(ScrapeError::FeedNotFound {
        tried: selectors.iter().join(", "),
    })
}
