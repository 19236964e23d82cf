//! Incremental scrolling of a lazily-loaded feed.
//!
//! Feeds only render more posts as the viewport approaches the bottom, so the
//! page is scrolled in small fixed steps on a fixed tick. Scrolling stops at
//! the first of:
//!
//! - the accumulated distance reaches the current document height,
//! - the tick count reaches [`ScrollConfig::max_scrolls`],
//! - the document height did not change since the previous tick.
//!
//! The tick cap bounds the loop even on pages that grow forever.

use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::scrapers::session::BrowserSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollConfig {
    pub tick: Duration,
    pub distance: u32,
    pub max_scrolls: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(250),
            distance: 100,
            max_scrolls: 30,
        }
    }
}

/// Why scrolling ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    ReachedBottom,
    MaxScrolls,
    Stagnated,
}

/// Summary of a finished scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub ticks: u32,
    pub scrolled: u64,
    pub final_height: u64,
    pub stop: ScrollStop,
}

/// Termination bookkeeping, independent of any browser.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    config: ScrollConfig,
    scrolled: u64,
    ticks: u32,
    last_height: Option<u64>,
}

impl ScrollTracker {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            scrolled: 0,
            ticks: 0,
            last_height: None,
        }
    }

    /// Record one tick that observed `height` before scrolling by the
    /// configured distance. Returns the stop reason once scrolling is done.
    pub fn tick(&mut self, height: u64) -> Option<ScrollStop> {
        self.scrolled += u64::from(self.config.distance);
        self.ticks += 1;

        let stop = if self.scrolled >= height {
            Some(ScrollStop::ReachedBottom)
        } else if self.ticks >= self.config.max_scrolls {
            Some(ScrollStop::MaxScrolls)
        } else if self.last_height == Some(height) {
            Some(ScrollStop::Stagnated)
        } else {
            None
        };
        self.last_height = Some(height);
        stop
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn scrolled(&self) -> u64 {
        self.scrolled
    }
}

/// Scroll `session` until one of the stop conditions holds.
#[instrument(level = "info", skip_all, fields(max_scrolls = config.max_scrolls))]
pub async fn auto_scroll(session: &dyn BrowserSession, config: ScrollConfig) -> Result<ScrollOutcome> {
    info!("Starting auto-scroll");
    let mut tracker = ScrollTracker::new(config);
    let mut interval = tokio::time::interval(config.tick);

    loop {
        interval.tick().await;
        let height = session.document_height().await?;
        session.scroll_by(config.distance).await?;

        if let Some(stop) = tracker.tick(height) {
            let outcome = ScrollOutcome {
                ticks: tracker.ticks(),
                scrolled: tracker.scrolled(),
                final_height: height,
                stop,
            };
            info!(ticks = outcome.ticks, scrolled = outcome.scrolled, height = outcome.final_height, stop = ?stop, "Auto-scroll completed");
            return Ok(outcome);
        }
        debug!(scrolled = tracker.scrolled(), height, ticks = tracker.ticks(), "Scroll progress");
    }
}
