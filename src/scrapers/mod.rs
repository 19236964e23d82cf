//! Browser-driven feed scraping.
//!
//! Feeds are client-rendered, so every page is loaded in a headless browser,
//! scrolled until the stream stops growing, and only then parsed.
//!
//! # Stages
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Session | [`session`] | One isolated Chromium per page, heavy resources blocked |
//! | Locate | [`locate`] | Ordered feed selectors, bounded wait each |
//! | Scroll | [`scroll`] | Fixed ticks, stops at bottom, cap or stagnation |
//! | Extract | [`extract`] | Cascade of selector strategies over the HTML |
//! | Timestamps | [`time`] | Relative labels ("2 hrs") to instants |
//! | Filter | [`filter`] | Length threshold and phrase denylist |
//!
//! [`facebook`] strings the stages together for one page.

pub mod extract;
pub mod facebook;
pub mod filter;
pub mod locate;
pub mod scroll;
pub mod session;
pub mod time;

#[cfg(test)]
pub mod testing;
