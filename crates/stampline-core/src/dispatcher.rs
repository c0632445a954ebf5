//! Concurrent fetch dispatcher.
//!
//! Workers on a bounded rayon pool claim work items from a [`WorkQueue`],
//! run the fetch function and send the outcome over a channel. The calling
//! thread drains the channel and hands each completion to a callback, so
//! all mutable accumulation state lives on one thread and needs no lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use indicatif::ProgressBar;

use crate::error::{ConfigError, FetchError};
use crate::shutdown::shutdown_flag;
use crate::work_queue::WorkQueue;

/// Default number of fetch workers
pub const DEFAULT_WORKERS: usize = 8;

/// Non-TTY progress log interval (every N completed items)
const LOG_INTERVAL: usize = 50;

/// One finished work item, delivered in completion order.
#[derive(Debug)]
pub struct Completion<'a, R> {
    /// Position of the item in the submitted sequence
    pub index: usize,
    pub item: &'a str,
    pub result: Result<Vec<R>, FetchError>,
}

/// Outcome counters of one dispatch run.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub submitted: usize,
    pub completed: usize,
    /// Ids of items whose fetch failed, in completion order
    pub failed: Vec<String>,
    /// Items never claimed because shutdown was requested
    pub skipped: usize,
}

/// Runs one fetch per work item across a bounded worker pool.
pub struct Dispatcher {
    pool: rayon::ThreadPool,
    workers: usize,
    progress: ProgressBar,
    stop: &'static AtomicBool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::Zero("worker_pool_size"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fetch-{i}"))
            .build()?;
        Ok(Self {
            pool,
            workers,
            progress: ProgressBar::hidden(),
            stop: shutdown_flag(),
        })
    }

    /// Report completed/total on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Watch `stop` instead of the global shutdown flag
    pub fn with_stop_flag(mut self, stop: &'static AtomicBool) -> Self {
        self.stop = stop;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every item once and pass each completion to `on_complete`.
    ///
    /// A failed fetch is logged and counted but never stops the run. Once
    /// the stop flag is set, workers finish their current item and claim no
    /// more; unclaimed items are counted as skipped.
    pub fn run<R, F, C>(&self, items: &[String], fetch: F, mut on_complete: C) -> DispatchStats
    where
        R: Send,
        F: Fn(&str) -> Result<Vec<R>, FetchError> + Sync,
        C: FnMut(Completion<'_, R>),
    {
        let queue = WorkQueue::new(items);
        let mut stats = DispatchStats {
            submitted: items.len(),
            ..Default::default()
        };
        if items.is_empty() {
            return stats;
        }

        let (tx, rx) = mpsc::sync_channel::<(usize, Result<Vec<R>, FetchError>)>(self.workers * 2);
        let queue = &queue;
        let fetch = &fetch;
        let stop = self.stop;
        self.progress.set_length(items.len() as u64);

        self.pool.in_place_scope(|s| {
            for _ in 0..self.workers.min(items.len()) {
                let tx = tx.clone();
                s.spawn(move |_| {
                    while !stop.load(Ordering::Relaxed) {
                        let Some((index, item)) = queue.next() else {
                            break;
                        };
                        let result = fetch(item);
                        if tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            // Workers hold the remaining senders; rx ends when they are done
            drop(tx);

            for (index, result) in rx {
                let item = items[index].as_str();
                stats.completed += 1;
                match &result {
                    Ok(records) => log::debug!("{item}: {} records", records.len()),
                    Err(e) => {
                        log::warn!("{item}: fetch failed: {e}");
                        stats.failed.push(item.to_string());
                    }
                }
                on_complete(Completion {
                    index,
                    item,
                    result,
                });

                self.progress.inc(1);
                if self.progress.is_hidden() && stats.completed % LOG_INTERVAL == 0 {
                    log::info!("{}/{} items fetched", stats.completed, stats.submitted);
                }
            }
        });

        stats.skipped = queue.remaining();
        if stats.skipped > 0 {
            log::warn!("shutdown requested: {} items not fetched", stats.skipped);
        }
        self.progress.finish_and_clear();
        stats
    }
}
