//! Fetch subcommand - collect records for a list of work items

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use stampline_core::{PipelineConfig, PipelineSummary, SharedProgress, fmt_num, is_shutdown_requested};
use stampline_stamps::{Job, JobConfig};

use super::print_summary;
use crate::config::Config;

/// Failed item ids listed in the summary table
const MAX_LISTED_FAILURES: usize = 10;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Job to run
    #[arg(value_enum)]
    pub job: JobArg,

    /// Work items (tickers, stamp ids or wallet addresses)
    pub items: Vec<String>,

    /// Read work items from a file, one per line
    #[arg(short = 'f', long)]
    pub items_file: Option<PathBuf>,

    /// Output CSV (default: <output.default_dir>/<job file name>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Records requested per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Stop paging an item after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// New records between checkpoints
    #[arg(long)]
    pub checkpoint_interval: Option<usize>,

    /// Persist only records whose allow field is in this list
    #[arg(long, value_delimiter = ',')]
    pub allow: Option<Vec<String>>,

    /// Record field matched against --allow
    #[arg(long)]
    pub allow_field: Option<String>,

    /// Quote every CSV cell
    #[arg(long)]
    pub quote_all: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum JobArg {
    Src20Holders,
    StampHolders,
    Balances,
    Actions,
}

impl From<JobArg> for Job {
    fn from(j: JobArg) -> Self {
        match j {
            JobArg::Src20Holders => Job::Src20Holders,
            JobArg::StampHolders => Job::StampHolders,
            JobArg::Balances => Job::Balances,
            JobArg::Actions => Job::Actions,
        }
    }
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let job = Job::from(args.job);

    let mut items = args.items.clone();
    if let Some(path) = &args.items_file {
        items.extend(stampline_stamps::load_items(path)?);
    }
    if items.is_empty() {
        anyhow::bail!("No work items given for {job} (pass them as arguments or --items-file)");
    }

    let job_config = job_config(job, &args, config);
    let destination = job_config.pipeline.destination.clone();
    let summary = stampline_stamps::run(job, &job_config, &items, progress)
        .with_context(|| format!("{job} failed"))?;

    print_fetch_summary(job, &summary, &destination);

    if is_shutdown_requested() {
        log::warn!(
            "Interrupted: {} items were not fetched",
            summary.items_skipped
        );
    }
    if !summary.items_failed.is_empty() && summary.items_failed.len() == summary.items_completed {
        anyhow::bail!("All {} fetched items failed", summary.items_failed.len());
    }

    Ok(())
}

/// Merge config file defaults with CLI overrides
fn job_config(job: Job, args: &FetchArgs, config: &Config) -> JobConfig {
    let destination = args
        .output
        .clone()
        .unwrap_or_else(|| config.output.default_dir.join(job.default_file_name()));

    let is_snapshot = matches!(job, Job::Balances);
    let allow = match &args.allow {
        Some(values) => Some((
            args.allow_field
                .clone()
                .unwrap_or_else(|| config.snapshot.allow_field.clone()),
            values.clone(),
        )),
        None if is_snapshot && !config.snapshot.allow.is_empty() => Some((
            config.snapshot.allow_field.clone(),
            config.snapshot.allow.clone(),
        )),
        None => None,
    };

    let pipeline = PipelineConfig {
        page_size: args.page_size.unwrap_or(config.pipeline.page_size),
        max_pages: args.max_pages.or(config.pipeline.max_pages),
        workers: args.workers.unwrap_or(config.pipeline.workers),
        checkpoint_interval: args
            .checkpoint_interval
            .unwrap_or(config.pipeline.checkpoint_interval),
        destination,
        http: config.http.to_http_config(),
        quote_all: args.quote_all || (is_snapshot && config.snapshot.quote_all),
    };

    JobConfig {
        pipeline,
        endpoints: config.endpoints.to_endpoints(),
        allow,
    }
}

fn print_fetch_summary(job: Job, summary: &PipelineSummary, destination: &std::path::Path) {
    let mut rows = vec![
        (
            "Items",
            format!(
                "{}/{}",
                fmt_num(summary.items_completed - summary.items_failed.len()),
                fmt_num(summary.items_total)
            ),
        ),
        ("Records", fmt_num(summary.records)),
        ("Duplicates", fmt_num(summary.duplicates)),
        (
            "Rows written",
            format!(
                "{} in {} checkpoints",
                fmt_num(summary.rows_written),
                summary.flushes
            ),
        ),
        ("Output", destination.display().to_string()),
        ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ];
    if summary.rejected > 0 {
        rows.push(("Rejected", fmt_num(summary.rejected)));
    }
    if summary.failed_flushes > 0 {
        rows.push(("Failed checkpoints", summary.failed_flushes.to_string()));
    }
    if summary.items_skipped > 0 {
        rows.push(("Skipped", fmt_num(summary.items_skipped)));
    }
    if !summary.items_failed.is_empty() {
        let mut failed = summary
            .items_failed
            .iter()
            .take(MAX_LISTED_FAILURES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if summary.items_failed.len() > MAX_LISTED_FAILURES {
            failed.push_str(&format!(
                ", ... ({} more)",
                summary.items_failed.len() - MAX_LISTED_FAILURES
            ));
        }
        rows.push(("Failed", failed));
    }
    print_summary(job.name(), &rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: FetchArgs,
    }

    fn parse(argv: &[&str]) -> FetchArgs {
        let mut full = vec!["test"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn job_names_parse() {
        assert!(matches!(parse(&["src20-holders"]).job, JobArg::Src20Holders));
        assert!(matches!(parse(&["stamp-holders"]).job, JobArg::StampHolders));
        assert!(matches!(parse(&["balances"]).job, JobArg::Balances));
        assert!(matches!(parse(&["actions"]).job, JobArg::Actions));
    }

    #[test]
    fn defaults_come_from_config() {
        let args = parse(&["src20-holders", "kevin"]);
        let config = Config::default();
        let jc = job_config(Job::Src20Holders, &args, &config);
        assert_eq!(jc.pipeline.destination, PathBuf::from("./data/src20_holders.csv"));
        assert_eq!(jc.pipeline.workers, 8);
        assert_eq!(jc.pipeline.page_size, 500);
        assert!(jc.allow.is_none());
        assert!(!jc.pipeline.quote_all);
    }

    #[test]
    fn cli_overrides_config() {
        let args = parse(&[
            "actions",
            "stmap",
            "-o",
            "out.csv",
            "-w",
            "3",
            "--max-pages",
            "2",
            "--allow",
            "bc1a,bc1b",
            "--allow-field",
            "creator",
        ]);
        let jc = job_config(Job::Actions, &args, &Config::default());
        assert_eq!(jc.pipeline.destination, PathBuf::from("out.csv"));
        assert_eq!(jc.pipeline.workers, 3);
        assert_eq!(jc.pipeline.max_pages, Some(2));
        let (field, values) = jc.allow.unwrap();
        assert_eq!(field, "creator");
        assert_eq!(values, vec!["bc1a", "bc1b"]);
    }

    #[test]
    fn snapshot_settings_apply_to_balances_only() {
        let mut config = Config::default();
        config.snapshot.allow = vec!["kevin".into()];
        config.snapshot.quote_all = true;

        let balances = job_config(Job::Balances, &parse(&["balances", "bc1a"]), &config);
        assert!(balances.pipeline.quote_all);
        assert_eq!(balances.allow, Some(("tick".into(), vec!["kevin".into()])));

        let holders = job_config(Job::Src20Holders, &parse(&["src20-holders", "kevin"]), &config);
        assert!(!holders.pipeline.quote_all);
        assert!(holders.allow.is_none());
    }
}
