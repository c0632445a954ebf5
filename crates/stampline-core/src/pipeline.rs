//! Fetch-accumulate-checkpoint pipeline.
//!
//! Binds the [`Dispatcher`] to one [`Accumulator`]: workers fetch, the
//! calling thread folds completions and flushes through the sink.

use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use serde::de::DeserializeOwned;

use crate::accumulator::{Accumulator, Record};
use crate::checkpoint::CheckpointSink;
use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{FetchError, PipelineError};
use crate::http::HttpClient;
use crate::paginator::{Endpoint, Paginator};
use crate::progress::fmt_num;
use crate::retry::retry_with_backoff;
use crate::shutdown::shutdown_flag;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub items_total: usize,
    pub items_completed: usize,
    /// Ids of work items whose fetch failed
    pub items_failed: Vec<String>,
    /// Items skipped after a shutdown request
    pub items_skipped: usize,
    /// Unique records after dedup
    pub records: usize,
    pub duplicates: usize,
    pub flushes: usize,
    pub failed_flushes: usize,
    pub rows_written: usize,
    /// Records skipped because they could not be shaped into a row
    pub rejected: usize,
    pub elapsed: Duration,
}

impl PipelineSummary {
    pub fn log(&self) {
        log::info!(
            "{}/{} items fetched, {} failed, {} unique records ({} duplicates), {} rows written in {} flushes ({:.1}s)",
            fmt_num(self.items_completed),
            fmt_num(self.items_total),
            self.items_failed.len(),
            fmt_num(self.records),
            fmt_num(self.duplicates),
            fmt_num(self.rows_written),
            self.flushes,
            self.elapsed.as_secs_f64(),
        );
        if !self.items_failed.is_empty() {
            log::warn!("failed items: {}", self.items_failed.join(", "));
        }
        if self.rejected > 0 {
            log::warn!("{} records could not be written and were skipped", self.rejected);
        }
        if self.items_skipped > 0 {
            log::warn!("{} items skipped after shutdown request", self.items_skipped);
        }
    }
}

/// Everything collected by one run.
#[derive(Debug)]
pub struct PipelineOutcome<R> {
    /// Every unique record, in arrival order
    pub records: Vec<R>,
    pub summary: PipelineSummary,
}

/// Run `fetch` for every item and checkpoint the deduplicated records into `sink`.
///
/// Per-item fetch failures are logged and skipped. Only invalid configuration
/// or a failed final flush returns an error.
pub fn run_pipeline<R, F, S>(
    config: &PipelineConfig,
    items: &[String],
    fetch: F,
    sink: S,
    progress: ProgressBar,
) -> Result<PipelineOutcome<R>, PipelineError>
where
    R: Record + Send,
    F: Fn(&str) -> Result<Vec<R>, FetchError> + Sync,
    S: CheckpointSink<R>,
{
    config.validate()?;
    let dispatcher = Dispatcher::new(config.workers)?.with_progress(progress);
    let start = Instant::now();
    log::info!(
        "fetching {} items with {} workers, checkpoint every {} records to {}",
        fmt_num(items.len()),
        config.workers,
        config.checkpoint_interval,
        config.destination.display()
    );

    let mut accumulator = Accumulator::new(config.checkpoint_interval, sink);
    let dispatch = dispatcher.run(items, fetch, |completion| {
        if let Ok(records) = completion.result {
            let added = accumulator.fold(records);
            log::debug!("{}: {added} new records", completion.item);
        }
    });
    let done = accumulator.finish()?;

    let summary = PipelineSummary {
        items_total: dispatch.submitted,
        items_completed: dispatch.completed,
        items_failed: dispatch.failed,
        items_skipped: dispatch.skipped,
        records: done.records.len(),
        duplicates: done.stats.duplicates,
        flushes: done.stats.flushes,
        failed_flushes: done.stats.failed_flushes,
        rows_written: done.stats.rows_written,
        rejected: done.stats.rejected,
        elapsed: start.elapsed(),
    };
    Ok(PipelineOutcome {
        records: done.records,
        summary,
    })
}

/// Fetch function walking every page of `endpoint` for one item.
///
/// Honors `max_pages`; with `max_retries > 0` a retryable failure restarts
/// the whole item after a backoff, unless shutdown has been requested.
pub fn paged_fetcher<'a, R>(
    client: &'a HttpClient,
    endpoint: &'a Endpoint,
    config: &PipelineConfig,
) -> impl Fn(&str) -> Result<Vec<R>, FetchError> + Sync + 'a
where
    R: DeserializeOwned,
{
    let max_pages = config.max_pages;
    let max_retries = config.http.max_retries;
    move |item: &str| {
        retry_with_backoff(item, max_retries, shutdown_flag(), || {
            Paginator::new(client, endpoint, item)
                .max_pages(max_pages)
                .fetch_all()
        })
    }
}
