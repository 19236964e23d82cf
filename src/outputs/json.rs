//! JSON dump of a one-shot run.
//!
//! # Output Structure
//!
//! Files are organized by the UTC date the run started, one file per run:
//! ```text
//! json_output_dir/
//! └── 2024-03-01/
//!     ├── 080000.json
//!     └── 090000.json
//! ```

use std::error::Error;
use std::path::PathBuf;

use tokio::fs;
use tracing::{error, info, instrument};

use crate::pipeline::RunReport;

/// Path a report is written to under `json_output_dir`.
pub fn report_path(report: &RunReport, json_output_dir: &str) -> PathBuf {
    PathBuf::from(json_output_dir)
        .join(report.started_at.format("%Y-%m-%d").to_string())
        .join(format!("{}.json", report.started_at.format("%H%M%S")))
}

/// Write `report` as pretty JSON and return the file path.
///
/// # Arguments
///
/// * `report` - The finished run
/// * `json_output_dir` - Base directory for JSON output
///
/// # Returns
///
/// The written path, or an error if directory creation or file writing fails.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(report: &RunReport, json_output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(report, json_output_dir);

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), posts = report.results.len(), "Wrote JSON report");
    Ok(path)
}
