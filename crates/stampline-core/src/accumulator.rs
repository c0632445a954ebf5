//! Deduplicating accumulator with periodic checkpoints

use std::hash::Hash;

use rustc_hash::FxHashSet;

use crate::checkpoint::{BatchWritten, CheckpointSink};
use crate::error::PersistError;

/// Default number of pending records that triggers a checkpoint.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 200;

/// A row of domain data with an identity used for deduplication.
///
/// Use the whole record as `Key` for structural equality, or a designated
/// field (address, tx hash, ...) when that identifies the row.
pub trait Record: Clone {
    type Key: Hash + Eq;

    fn key(&self) -> Self::Key;
}

/// Counters kept by the accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulatorStats {
    /// Records dropped because their key was already seen
    pub duplicates: usize,
    /// Successful checkpoints, final flush included
    pub flushes: usize,
    /// Checkpoints that failed and left their batch pending
    pub failed_flushes: usize,
    /// Rows reported persisted by the sink
    pub rows_written: usize,
    /// Records the sink could not shape and skipped
    pub rejected: usize,
}

/// Final state after the last flush.
#[derive(Debug)]
pub struct Accumulated<R> {
    /// Every unique record, in arrival order
    pub records: Vec<R>,
    pub stats: AccumulatorStats,
}

/// Folds record batches into a running, deduplicated result set.
///
/// `all_seen` only grows. `pending` holds the records not yet persisted; it
/// is handed to the sink whenever it reaches `checkpoint_interval` and is
/// cleared only when the sink succeeds, so a failed checkpoint is retried on
/// the next trigger or at [`finish`](Accumulator::finish). Records the sink
/// rejects as unshapeable count as handled and are not retried.
pub struct Accumulator<R: Record, S> {
    seen: FxHashSet<R::Key>,
    all_seen: Vec<R>,
    pending: Vec<R>,
    checkpoint_interval: usize,
    sink: S,
    stats: AccumulatorStats,
}

impl<R: Record, S: CheckpointSink<R>> Accumulator<R, S> {
    /// `checkpoint_interval` of 0 is treated as 1.
    pub fn new(checkpoint_interval: usize, sink: S) -> Self {
        Self {
            seen: FxHashSet::default(),
            all_seen: Vec::new(),
            pending: Vec::new(),
            checkpoint_interval: checkpoint_interval.max(1),
            sink,
            stats: AccumulatorStats::default(),
        }
    }

    /// Fold one completed work item's records; returns how many were new.
    pub fn fold(&mut self, records: Vec<R>) -> usize {
        let mut added = 0;
        for record in records {
            if !self.seen.insert(record.key()) {
                self.stats.duplicates += 1;
                continue;
            }
            self.all_seen.push(record.clone());
            self.pending.push(record);
            added += 1;

            if self.pending.len() >= self.checkpoint_interval {
                // Failure is logged and counted; the batch stays pending
                let _ = self.checkpoint();
            }
        }
        added
    }

    /// Persist `pending` now. No-op when nothing is pending.
    pub fn checkpoint(&mut self) -> Result<BatchWritten, PersistError> {
        if self.pending.is_empty() {
            return Ok(BatchWritten::default());
        }
        match self.sink.write_batch(&self.pending) {
            Ok(written) => {
                log::debug!(
                    "checkpoint: {} records, {} rows persisted, {} rejected",
                    self.pending.len(),
                    written.rows,
                    written.rejected
                );
                self.pending.clear();
                self.stats.flushes += 1;
                self.stats.rows_written += written.rows;
                self.stats.rejected += written.rejected;
                Ok(written)
            }
            Err(e) => {
                log::error!(
                    "checkpoint of {} records failed, keeping them pending: {e}",
                    self.pending.len()
                );
                self.stats.failed_flushes += 1;
                Err(e)
            }
        }
    }

    /// Final save: flush the remainder and hand back the accumulated records.
    pub fn finish(mut self) -> Result<Accumulated<R>, PersistError> {
        if let Err(e) = self.checkpoint() {
            return Err(PersistError::Unflushed {
                count: self.pending.len(),
                source: Box::new(e),
            });
        }
        Ok(Accumulated {
            records: self.all_seen,
            stats: self.stats,
        })
    }

    pub fn all_seen(&self) -> &[R] {
        &self.all_seen
    }

    pub fn pending(&self) -> &[R] {
        &self.pending
    }

    pub fn stats(&self) -> AccumulatorStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
