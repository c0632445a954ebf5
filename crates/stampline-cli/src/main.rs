//! stampline - stamp and SRC20 holder snapshots
//!
//! Fetches holder, balance and transfer data from the stamp indexers into
//! CSV checkpoints, then merges and transforms the collected files.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "stampline")]
#[command(about = "Stamp and SRC20 holder snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./stampline.toml or ~/.config/stampline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Whole-request timeout in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch records for a list of work items into a CSV checkpoint
    Fetch(cmd::fetch::FetchArgs),
    /// Merge per-ticker holder files into one wide table
    Merge(cmd::post::MergeArgs),
    /// Compute token allocations from a merged holder table
    Allocate(cmd::post::AllocateArgs),
    /// Collect wallet addresses from col-/src- lists
    Wallets(cmd::post::WalletsArgs),
    /// Count address occurrences in a CSV
    Count(cmd::post::CountArgs),
    /// Extract unique creator/destination addresses from actions
    Addresses(cmd::post::AddressesArgs),
    /// Mark P2WSH holders ineligible and drop duplicate rows
    Eligibility(cmd::post::EligibilityArgs),
    /// Drop columns, cut timestamps to dates, truncate amounts to integers
    Clean(cmd::post::CleanArgs),
    /// Concatenate JSON dumps (arrays or JSON lines) into one CSV
    JsonToCsv(cmd::post::JsonArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(stampline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    stampline_core::init_logging(quiet, cli.debug, multi).context("Failed to init logging")?;

    stampline_core::install_signal_handlers().context("Failed to install signal handlers")?;

    // Load configuration
    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // CLI overrides config file
    if let Some(secs) = cli.request_timeout {
        config.http.request_timeout = secs;
    }
    if let Some(retries) = cli.max_retries {
        config.http.max_retries = retries;
    }

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Merge(args) => cmd::post::merge(args, &progress),
        Command::Allocate(args) => cmd::post::allocate(args, &config),
        Command::Wallets(args) => cmd::post::wallets(args),
        Command::Count(args) => cmd::post::count(args),
        Command::Addresses(args) => cmd::post::addresses(args),
        Command::Eligibility(args) => cmd::post::eligibility(args),
        Command::Clean(args) => cmd::post::clean(args),
        Command::JsonToCsv(args) => cmd::post::json_to_csv(args),
        Command::Config => {
            let allow = if config.snapshot.allow.is_empty() {
                "all".to_string()
            } else {
                format!(
                    "{} in [{}]",
                    config.snapshot.allow_field,
                    config.snapshot.allow.join(", ")
                )
            };
            let assets = if config.allocation.assets.is_empty() {
                "not set".to_string()
            } else {
                format!(
                    "{} x {}",
                    config.allocation.assets.join(", "),
                    config.allocation.per_asset
                )
            };
            let bonus = match &config.allocation.bonus_asset {
                Some(asset) => format!("{asset} x {}", config.allocation.bonus),
                None => "not set".to_string(),
            };

            cmd::print_summary(
                "Setting",
                &[
                    (
                        "Output directory",
                        config.output.default_dir.display().to_string(),
                    ),
                    ("Openstamp API", config.endpoints.openstamp.clone()),
                    ("Stampchain API", config.endpoints.stampchain.clone()),
                    ("Actions limit", config.endpoints.actions_limit.to_string()),
                    ("Workers", config.pipeline.workers.to_string()),
                    ("Page size", config.pipeline.page_size.to_string()),
                    (
                        "Max pages",
                        config
                            .pipeline
                            .max_pages
                            .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
                    ),
                    (
                        "Checkpoint interval",
                        config.pipeline.checkpoint_interval.to_string(),
                    ),
                    ("Snapshot filter", allow),
                    ("Snapshot quote all", config.snapshot.quote_all.to_string()),
                    ("Allocation", assets),
                    ("Allocation bonus", bonus),
                    ("Request timeout", format!("{}s", config.http.request_timeout)),
                    ("Max retries", config.http.max_retries.to_string()),
                ],
            );
            Ok(())
        }
    }
}
