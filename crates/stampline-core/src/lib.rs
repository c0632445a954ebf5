//! Stampline Core - fetch-accumulate-checkpoint pipeline
//!
//! Pulls records for many work items from paged JSON endpoints on a bounded
//! worker pool, deduplicates them on a single consumer and appends them to a
//! CSV destination in periodic checkpoints.

pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod paginator;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use accumulator::{Accumulated, Accumulator, AccumulatorStats, Record};
pub use checkpoint::{
    BatchWritten, CheckpointSink, CsvCheckpoint, DestinationLock, Projection, Shaped, destination_lock,
};
pub use config::{AllowList, PipelineConfig};
pub use dispatcher::{Completion, DispatchStats, Dispatcher};
pub use error::{ConfigError, FetchError, FetchErrorKind, PersistError, PipelineError};
pub use http::{HttpClient, HttpConfig, SHARED_RUNTIME};
pub use logging::{IndicatifLogger, init_logging};
pub use paginator::{Endpoint, Page, PageStyle, Paginator};
pub use pipeline::{PipelineOutcome, PipelineSummary, paged_fetcher, run_pipeline};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
