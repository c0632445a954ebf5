//! Binds a [`Job`] to the core pipeline

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use stampline_core::{
    AllowList, CsvCheckpoint, Endpoint, HttpClient, PipelineConfig, PipelineSummary,
    ProgressContext, Record, paged_fetcher, run_pipeline,
};

use crate::endpoints::Endpoints;
use crate::job::Job;
use crate::projection::{Persisted, filtered};
use crate::records::{HolderBalance, StampHolder, TickAction, TokenBalance};

/// Everything a job run needs besides its work items.
#[derive(Debug, Clone, Default)]
pub struct JobConfig {
    pub pipeline: PipelineConfig,
    pub endpoints: Endpoints,
    /// Field name and accepted values; records not matching are not persisted
    pub allow: Option<(String, Vec<String>)>,
}

/// Fetch `items` for `job` and checkpoint the records into the destination.
pub fn run(
    job: Job,
    config: &JobConfig,
    items: &[String],
    progress: &ProgressContext,
) -> Result<PipelineSummary> {
    log::info!("{job}: {} work items", items.len());
    match job {
        Job::Src20Holders => run_as::<HolderBalance>(job, config, items, progress, |mut h, tick| {
            h.tick = tick.to_string();
            h
        }),
        Job::StampHolders => run_as::<StampHolder>(job, config, items, progress, |mut h, stamp| {
            h.stamp = stamp.to_string();
            h
        }),
        Job::Balances => run_as::<TokenBalance>(job, config, items, progress, |b, _| b),
        Job::Actions => run_as::<TickAction>(job, config, items, progress, |a, _| a),
    }
}

/// Run the pipeline for one record type.
///
/// `attach` stamps each fetched record with its work item when the
/// response itself does not carry it.
fn run_as<R>(
    job: Job,
    config: &JobConfig,
    items: &[String],
    progress: &ProgressContext,
    attach: fn(R, &str) -> R,
) -> Result<PipelineSummary>
where
    R: Record + Persisted + DeserializeOwned + Send,
{
    let allow = config
        .allow
        .as_ref()
        .map(|(field, values)| AllowList::new(field, values, R::FIELDS))
        .transpose()
        .with_context(|| format!("Invalid allow-list for {job}"))?;
    if let Some(allow) = &allow {
        log::info!("{job}: persisting only {} values of '{}'", allow.len(), allow.field());
    }

    let pipeline = &config.pipeline;
    let endpoint: Endpoint = config.endpoints.for_job(job, pipeline.page_size);
    endpoint
        .validate()
        .with_context(|| format!("Invalid endpoint for {job}"))?;
    let client = HttpClient::new(&pipeline.http).context("Failed to build HTTP client")?;

    let sink = CsvCheckpoint::new(&pipeline.destination, filtered::<R>(allow))
        .quote_all(pipeline.quote_all);
    let fetch_pages = paged_fetcher::<R>(&client, &endpoint, pipeline);
    let fetch = |item: &str| {
        fetch_pages(item).map(|records| {
            records
                .into_iter()
                .map(|record| attach(record, item))
                .collect::<Vec<R>>()
        })
    };

    let outcome = run_pipeline(
        pipeline,
        items,
        fetch,
        sink,
        progress.items_bar(job.name(), items.len()),
    )
    .with_context(|| format!("{job} run failed"))?;
    outcome.summary.log();
    Ok(outcome.summary)
}
