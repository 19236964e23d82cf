//! # feed_ingest
//!
//! Scrapes the public post feeds of configured Facebook pages with a headless
//! browser and ingests new posts into a forum database.
//!
//! ## Features
//!
//! - Headless Chromium per source, heavy resources blocked
//! - Feed detection and incremental scrolling of the lazily-rendered feed
//! - Cascading selector strategies for message, time, image and permalink
//! - Relative time labels ("2 hrs", "Yesterday") normalized to instants
//! - Idempotent persistence keyed on title and creation time
//! - HTTP triggers plus an hourly recurring run
//!
//! ## Usage
//!
//! ```sh
//! feed_ingest serve
//! feed_ingest scrape --persist -j ./json
//! ```
//!
//! ## Architecture
//!
//! Each run walks the sources one at a time:
//! 1. **Session**: launch a browser and open the page
//! 2. **Locate**: wait for a feed container
//! 3. **Scroll**: load more posts until the feed stops growing
//! 4. **Extract**: parse posts from the rendered HTML and filter noise
//! 5. **Persist**: save posts not already stored

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod pipeline;
mod scheduler;
mod scrapers;
mod server;
mod store;
mod utils;

use cli::{Cli, Command, GlobalArgs};
use config::{SourceConfig, resolve_sources};
use outputs::json;
use pipeline::{RunMode, SourcePipeline};
use scheduler::ScrapeScheduler;
use scrapers::facebook::{FeedScraper, ScrapeSettings};
use scrapers::session::{ChromeLauncher, SessionConfig};
use store::{MemoryPostStore, PgPostStore, PostStore};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "feed_ingest starting up");

    let args = Cli::parse();
    let pipeline = Arc::new(build_pipeline(&args.global).await?);
    info!(sources = ?pipeline.sources(), profile = ?args.global.profile, "Pipeline ready");

    match args.command {
        Command::Serve { bind, schedule, no_schedule } => {
            let scheduler = if no_schedule {
                info!("Recurring runs disabled");
                None
            } else {
                Some(ScrapeScheduler::start(Arc::clone(&pipeline), &schedule).await?)
            };

            let state = server::AppState { pipeline: Arc::clone(&pipeline) };
            server::serve(state, bind, shutdown_signal()).await?;

            if let Some(scheduler) = scheduler {
                scheduler.stop().await?;
            }
        }
        Command::Scrape { persist, json_output_dir } => {
            // Early check: ensure JSON output dir is writable
            if let Some(dir) = &json_output_dir {
                if let Err(e) = ensure_writable_dir(dir).await {
                    error!(path = %dir, error = %e, "JSON output directory is not writable");
                    return Err(e);
                }
            }

            let mode = if persist { RunMode::ScrapeAndPersist } else { RunMode::ScrapeOnly };
            let report = pipeline.run(mode).await?;

            if let Some(dir) = &json_output_dir {
                if let Err(e) = json::write_report(&report, dir).await {
                    error!(error = %e, "Failed to write JSON report");
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}

/// Wire sources, browser launcher and store into a pipeline.
async fn build_pipeline(args: &GlobalArgs) -> Result<SourcePipeline, Box<dyn Error>> {
    let file = match &args.sources_file {
        Some(path) => Some(SourceConfig::load(path).await?),
        None => None,
    };
    let sources = resolve_sources(&args.sources, file.as_ref())?;

    let store: Arc<dyn PostStore> = match &args.database_url {
        Some(url) => Arc::new(PgPostStore::connect(url).await?),
        None => {
            warn!("DATABASE_URL not set; posts are kept in memory only");
            Arc::new(MemoryPostStore::new())
        }
    };

    let settings = ScrapeSettings {
        profile: args.profile,
        session: SessionConfig {
            chrome_executable: args.chrome_executable.clone(),
            ..SessionConfig::default()
        },
        access_token: args.access_token.clone(),
        debug_screenshot: args.debug_screenshot.clone(),
        ..ScrapeSettings::default()
    };
    let scraper = FeedScraper::new(Arc::new(ChromeLauncher), settings)?;

    Ok(SourcePipeline::new(scraper, store, sources))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
