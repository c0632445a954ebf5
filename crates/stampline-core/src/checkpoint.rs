//! Checkpoint sinks: append-only CSV destinations with a header-once rule

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};

use rustc_hash::FxHashMap;

use crate::error::PersistError;

/// Outcome of one persisted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWritten {
    /// Rows appended to the destination
    pub rows: usize,
    /// Records that could not be shaped and were skipped
    pub rejected: usize,
}

/// Destination for checkpoint batches.
///
/// `rows` may be lower than `batch.len()` when the sink filters records or
/// rejects ones it cannot shape. An `Err` means nothing of the batch was
/// persisted, so the caller may retry the same batch.
pub trait CheckpointSink<R> {
    fn write_batch(&mut self, batch: &[R]) -> Result<BatchWritten, PersistError>;
}

/// Lock serializing header-check-then-append on one destination.
pub type DestinationLock = Arc<Mutex<()>>;

static DESTINATION_LOCKS: LazyLock<Mutex<FxHashMap<PathBuf, Weak<Mutex<()>>>>> =
    LazyLock::new(Default::default);

/// Lock shared by every sink of this process writing `path`.
///
/// Paths are compared after resolving their parent directory, so
/// `data/out.csv` and `./data/out.csv` get the same lock.
pub fn destination_lock(path: &Path) -> DestinationLock {
    let key = lock_key(path);
    let mut locks = DESTINATION_LOCKS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.retain(|_, lock| lock.strong_count() > 0);
    if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = DestinationLock::default();
    locks.insert(key, Arc::downgrade(&lock));
    lock
}

/// The file may not exist yet, so only its parent is canonicalized
fn lock_key(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

type KeepFn<R> = dyn Fn(&R) -> bool + Send + Sync;
type RowFn<R> = dyn Fn(&R) -> Result<Vec<String>, String> + Send + Sync;

/// Rows shaped from one batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Shaped {
    pub rows: Vec<Vec<String>>,
    /// Why each rejected record could not be shaped, in batch order
    pub rejected: Vec<String>,
}

/// Maps records onto persisted columns.
///
/// `keep` drops records that should not be persisted (e.g. ticker not in
/// the allow-list); `row` renders a kept record as one row of cells.
pub struct Projection<R> {
    columns: Vec<String>,
    keep: Box<KeepFn<R>>,
    row: Box<RowFn<R>>,
}

impl<R> Projection<R> {
    pub fn new<C, F>(columns: C, row: F) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        F: Fn(&R) -> Result<Vec<String>, String> + Send + Sync + 'static,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            keep: Box::new(|_| true),
            row: Box::new(row),
        }
    }

    /// Persist only records for which `keep` returns true
    pub fn filter(mut self, keep: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.keep = Box::new(keep);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Shape every kept record of `batch`.
    ///
    /// A record whose row function fails, or whose row has the wrong width,
    /// is rejected on its own; the rest of the batch is unaffected.
    pub fn shape(&self, batch: &[R]) -> Shaped {
        let mut shaped = Shaped {
            rows: Vec::with_capacity(batch.len()),
            rejected: Vec::new(),
        };
        for record in batch.iter().filter(|r| (self.keep)(r)) {
            match (self.row)(record) {
                Ok(row) if row.len() == self.columns.len() => shaped.rows.push(row),
                Ok(row) => shaped.rejected.push(format!(
                    "row has {} cells, expected {}",
                    row.len(),
                    self.columns.len()
                )),
                Err(reason) => shaped.rejected.push(reason),
            }
        }
        shaped
    }
}

impl<R> std::fmt::Debug for Projection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Append-mode CSV checkpoint file.
///
/// The header is written only when the file is missing or empty, checked at
/// write time while holding the destination lock. Rows are shaped before the
/// file is opened. A failed append is truncated back to the previous length,
/// so a batch is either fully persisted or not at all.
pub struct CsvCheckpoint<R> {
    path: PathBuf,
    projection: Projection<R>,
    quote_all: bool,
    lock: DestinationLock,
}

impl<R> std::fmt::Debug for CsvCheckpoint<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvCheckpoint")
            .field("path", &self.path)
            .field("columns", &self.projection.columns)
            .finish_non_exhaustive()
    }
}

impl<R> CsvCheckpoint<R> {
    pub fn new(path: impl Into<PathBuf>, projection: Projection<R>) -> Self {
        let path = path.into();
        let lock = destination_lock(&path);
        Self {
            path,
            projection,
            quote_all: false,
            lock,
        }
    }

    /// Quote every cell instead of only those that need it
    pub fn quote_all(mut self, quote_all: bool) -> Self {
        self.quote_all = quote_all;
        self
    }

    pub fn lock(&self) -> DestinationLock {
        Arc::clone(&self.lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), PersistError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let needs_header = fs::metadata(&self.path).map_or(true, |m| m.len() == 0);
        if rows.is_empty() && !needs_header {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        append_or_rollback(&file, |file| self.write_rows(file, needs_header, rows))
    }

    fn write_rows(
        &self,
        file: &File,
        needs_header: bool,
        rows: &[Vec<String>],
    ) -> Result<(), PersistError> {
        let quote_style = if self.quote_all {
            csv::QuoteStyle::Always
        } else {
            csv::QuoteStyle::Necessary
        };
        let mut writer = csv::WriterBuilder::new()
            .quote_style(quote_style)
            .from_writer(BufWriter::new(file));

        if needs_header {
            writer.write_record(&self.projection.columns)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        let mut inner = writer
            .into_inner()
            .map_err(|e| PersistError::Io(e.into_error()))?;
        inner.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// Run `write` against `file`; on failure truncate it back to its prior length.
fn append_or_rollback<F>(file: &File, write: F) -> Result<(), PersistError>
where
    F: FnOnce(&File) -> Result<(), PersistError>,
{
    let start = file.metadata()?.len();
    let result = write(file);
    if let Err(e) = &result {
        match file.set_len(start) {
            Ok(()) => log::warn!("append failed, truncated back to {start} bytes: {e}"),
            Err(truncate) => {
                log::error!("append failed and truncating to {start} bytes failed: {truncate}")
            }
        }
    }
    result
}

impl<R> CheckpointSink<R> for CsvCheckpoint<R> {
    fn write_batch(&mut self, batch: &[R]) -> Result<BatchWritten, PersistError> {
        let shaped = self.projection.shape(batch);
        for reason in &shaped.rejected {
            log::warn!("{}: skipping record: {reason}", self.path.display());
        }
        self.append_rows(&shaped.rows)?;
        log::debug!(
            "appended {} rows ({} filtered, {} rejected) to {}",
            shaped.rows.len(),
            batch.len() - shaped.rows.len() - shaped.rejected.len(),
            shaped.rejected.len(),
            self.path.display()
        );
        Ok(BatchWritten {
            rows: shaped.rows.len(),
            rejected: shaped.rejected.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct Bal {
        address: &'static str,
        tick: &'static str,
        amt: &'static str,
    }

    fn bal(address: &'static str, tick: &'static str, amt: &'static str) -> Bal {
        Bal { address, tick, amt }
    }

    fn projection() -> Projection<Bal> {
        Projection::new(["Address", "Ticker", "Amount"], |b: &Bal| {
            let amt: f64 = b.amt.parse().map_err(|_| format!("bad amt {}", b.amt))?;
            Ok(vec![b.address.into(), b.tick.into(), format!("{amt:.2}")])
        })
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn header_written_once_across_flushes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvCheckpoint::new(&path, projection());

        assert_eq!(sink.write_batch(&[]).unwrap().rows, 0);
        assert_eq!(sink.write_batch(&[]).unwrap().rows, 0);
        sink.write_batch(&[bal("bc1a", "kevin", "1")]).unwrap();
        sink.write_batch(&[bal("bc1b", "stamp", "2.346")]).unwrap();

        assert_eq!(
            lines(&path),
            vec![
                "Address,Ticker,Amount",
                "bc1a,kevin,1.00",
                "bc1b,stamp,2.35"
            ]
        );
    }

    #[test]
    fn existing_file_keeps_its_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "Address,Ticker,Amount\nold,kevin,1.00\n").unwrap();

        let mut sink = CsvCheckpoint::new(&path, projection());
        sink.write_batch(&[bal("new", "kevin", "3")]).unwrap();

        assert_eq!(
            lines(&path),
            vec!["Address,Ticker,Amount", "old,kevin,1.00", "new,kevin,3.00"]
        );
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "").unwrap();

        let mut sink = CsvCheckpoint::new(&path, projection());
        sink.write_batch(&[bal("a", "kevin", "1")]).unwrap();
        assert_eq!(lines(&path)[0], "Address,Ticker,Amount");
    }

    #[test]
    fn filter_drops_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvCheckpoint::new(&path, projection().filter(|b| b.tick == "kevin"));

        let written = sink
            .write_batch(&[bal("a", "kevin", "1"), bal("b", "other", "1")])
            .unwrap();
        assert_eq!(written, BatchWritten { rows: 1, rejected: 0 });
        assert_eq!(lines(&path).len(), 2);
    }

    #[test]
    fn unshapeable_record_is_skipped_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvCheckpoint::new(&path, projection());

        let written = sink
            .write_batch(&[
                bal("a", "kevin", "1"),
                bal("b", "kevin", "lots"),
                bal("c", "kevin", "2"),
            ])
            .unwrap();
        assert_eq!(written, BatchWritten { rows: 2, rejected: 1 });
        assert_eq!(
            lines(&path),
            vec!["Address,Ticker,Amount", "a,kevin,1.00", "c,kevin,2.00"]
        );
    }

    #[test]
    fn wrong_width_row_is_rejected() {
        let projection = Projection::new(["a", "b"], |b: &Bal| Ok(vec![b.address.into()]));
        let shaped = projection.shape(&[bal("a", "kevin", "1")]);
        assert!(shaped.rows.is_empty());
        assert_eq!(shaped.rejected, vec!["row has 1 cells, expected 2".to_string()]);
    }

    #[test]
    fn failed_append_is_truncated_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "Address,Ticker,Amount\nold,kevin,1.00\n").unwrap();
        let file = OpenOptions::new().append(true).open(&path).unwrap();

        let result = append_or_rollback(&file, |mut f| {
            f.write_all(b"new,kevin,2.00\nhalf,ke")?;
            Err(PersistError::Io(std::io::Error::other("no space left")))
        });

        assert!(matches!(result, Err(PersistError::Io(_))));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Address,Ticker,Amount\nold,kevin,1.00\n"
        );
    }

    #[test]
    fn sinks_on_one_path_share_a_lock() {
        let dir = TempDir::new().unwrap();
        let a = CsvCheckpoint::new(dir.path().join("out.csv"), projection());
        let b = CsvCheckpoint::new(dir.path().join(".").join("out.csv"), projection());
        let other = CsvCheckpoint::new(dir.path().join("other.csv"), projection());

        assert!(Arc::ptr_eq(&a.lock(), &b.lock()));
        assert!(!Arc::ptr_eq(&a.lock(), &other.lock()));
    }

    #[test]
    fn quote_all_quotes_every_cell() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvCheckpoint::new(&path, projection()).quote_all(true);
        sink.write_batch(&[bal("a", "kevin", "1")]).unwrap();
        assert_eq!(
            lines(&path),
            vec![
                r#""Address","Ticker","Amount""#,
                r#""a","kevin","1.00""#
            ]
        );
    }

    #[test]
    fn missing_parent_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("out.csv");
        let mut sink = CsvCheckpoint::new(&path, projection());
        let err = sink.write_batch(&[bal("a", "kevin", "1")]).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }

    #[test]
    fn concurrent_writers_share_one_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        std::thread::scope(|s| {
            for t in 0..4 {
                let path = path.clone();
                s.spawn(move || {
                    let mut sink = CsvCheckpoint::new(&path, projection());
                    for _ in 0..25 {
                        let tick = if t % 2 == 0 { "kevin" } else { "stamp" };
                        sink.write_batch(&[bal("a", tick, "1")]).unwrap();
                    }
                });
            }
        });

        let lines = lines(&path);
        assert_eq!(lines.len(), 101);
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("Address")).count(),
            1
        );
    }
}
