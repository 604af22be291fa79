//! land-tracker - Daily Naver Real Estate listing collector
//!
//! Collects listings through a warmed browser session and keeps day-over-day summaries.

use anyhow::Result;
use chrono::{FixedOffset, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use land_tracker::commands::{PipelineCommand, RunMode, RunOptions};
use land_tracker::config::{Config, OutputFormat};
use land_tracker::land::models::TradeType;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "land-tracker",
    version,
    about = "Daily Naver Real Estate listing collector",
    long_about = "Collects apartment listings per complex and trade type through a warmed \
                  browser session, normalizes prices to 만원, and tracks day-over-day changes."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "LAND_PROXY")]
    proxy: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Directory holding partitions and summaries
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily pipeline
    #[command(alias = "r")]
    Run {
        /// Complex ids to collect (comma-separated)
        #[arg(long, value_delimiter = ',')]
        entity_ids: Option<Vec<String>>,

        /// Trade types to collect (comma-separated: A1, B1, B2)
        #[arg(long, value_delimiter = ',')]
        trade_types: Option<Vec<TradeType>>,

        /// Maximum listings per complex across all trade types
        #[arg(long)]
        max: Option<usize>,

        /// Run date (YYYY-MM-DD); defaults to today in Seoul
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Collect and store the partition, skip summaries
        #[arg(long, conflicts_with = "summarize_only")]
        collect_only: bool,

        /// Summarize an already stored partition without collecting
        #[arg(long)]
        summarize_only: bool,

        /// Skip the browser and replay the configured or last saved cookie header
        #[arg(long)]
        direct: bool,
    },

    /// List supported trade types
    TradeTypes,
}

/// Today's date in Korea, where the listings and the daily cadence live.
fn seoul_today() -> NaiveDate {
    match FixedOffset::east_opt(9 * 3600) {
        Some(kst) => Utc::now().with_timezone(&kst).date_naive(),
        None => Local::now().date_naive(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }
    if cli.headed {
        config.headless = false;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }

    match cli.command {
        Commands::Run {
            entity_ids,
            trade_types,
            max,
            date,
            collect_only,
            summarize_only,
            direct,
        } => {
            if let Some(ids) = entity_ids {
                config.entity_ids = ids;
            }
            if let Some(types) = trade_types {
                config.trade_types = types;
            }
            if let Some(max) = max {
                config.max_listings_per_entity = max;
            }

            let mode = if collect_only {
                RunMode::CollectOnly
            } else if summarize_only {
                RunMode::SummarizeOnly
            } else {
                RunMode::Full
            };
            let options = RunOptions { date: date.unwrap_or_else(seoul_today), mode, direct };

            let cmd = PipelineCommand::new(config);
            let outcome = tokio::select! {
                result = cmd.execute(&options) => result?,
                _ = tokio::signal::ctrl_c() => {
                    // Dropping the pipeline future drops the session, which kills Chromium.
                    error!("Interrupted, aborting run");
                    return Ok(ExitCode::from(130));
                }
            };

            println!("{}", cmd.render(&outcome));

            if !outcome.is_complete() {
                warn!("Some pairs were not collected in full");
                return Ok(ExitCode::from(2));
            }
        }

        Commands::TradeTypes => {
            println!("Supported trade types:\n");
            println!("{:<6} {:<6} {}", "Code", "Label", "Description");
            println!("{:-<6} {:-<6} {:-<25}", "", "", "");

            for trade_type in TradeType::all() {
                println!(
                    "{:<6} {:<6} {}",
                    trade_type.code(),
                    trade_type.label(),
                    trade_type.description()
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
