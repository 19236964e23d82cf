//! Command-line interface definitions for feed_ingest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Most arguments can also be provided through environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::scheduler::HOURLY;
use crate::scrapers::extract::CascadeProfile;

/// Command-line arguments for feed_ingest.
///
/// # Examples
///
/// ```sh
/// # HTTP trigger plus hourly scrape-and-persist
/// feed_ingest serve --bind 0.0.0.0:3000
///
/// # One run, persisted, with a JSON dump
/// feed_ingest --source https://www.facebook.com/OfficialLRTA scrape --persist -j ./json
///
/// # Sources from a file, narrow selector profile
/// feed_ingest --sources-file sources.yaml --profile narrow scrape
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Page URL to scrape; repeat for several. Overrides --sources-file
    #[arg(long = "source", env = "FEED_SOURCES", value_delimiter = ',', global = true)]
    pub sources: Vec<String>,

    /// YAML file with a `sources:` list
    #[arg(long, global = true)]
    pub sources_file: Option<PathBuf>,

    /// Selector cascade used for extraction
    #[arg(long, value_enum, default_value_t = CascadeProfile::Broad, global = true)]
    pub profile: CascadeProfile,

    /// Upstream access token, sent as the `access_token` query parameter
    #[arg(long, env = "FB_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// Postgres URL of the application database; posts are kept in memory when unset
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Write a full-page screenshot here after scrolling each source
    #[arg(long, global = true)]
    pub debug_screenshot: Option<PathBuf>,

    /// Chromium binary to launch instead of the auto-detected one
    #[arg(long, env = "CHROME_EXECUTABLE", global = true)]
    pub chrome_executable: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the HTTP trigger endpoints and run the recurring scrape
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,

        /// Cron expression (seconds first) for recurring runs
        #[arg(long, default_value = HOURLY)]
        schedule: String,

        /// Only serve HTTP, without recurring runs
        #[arg(long)]
        no_schedule: bool,
    },

    /// Scrape every source once and exit
    Scrape {
        /// Save new posts to the store
        #[arg(long)]
        persist: bool,

        /// Output directory for the JSON run report
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },
}
