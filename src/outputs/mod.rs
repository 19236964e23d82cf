//! Files written by one-shot runs.
//!
//! - [`json`]: the run report (posts plus per-source counts) as JSON

pub mod json;
