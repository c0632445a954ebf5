//! Stampline Stamps - stamp and SRC20 holder data
//!
//! Fetch jobs against the openstamp and stampchain indexers, their record
//! types and persisted columns, and the file transforms applied to the
//! collected CSVs.
//!
//! # Example
//!
//! ```ignore
//! use stampline_stamps::{Job, JobConfig, run};
//!
//! let mut config = JobConfig::default();
//! config.pipeline.destination = "staging-kevin_holders.csv".into();
//! let summary = run(Job::Src20Holders, &config, &["kevin".into()], &progress)?;
//! println!("{} holders", summary.records);
//! ```

pub mod endpoints;
pub mod job;
pub mod post;
pub mod projection;
pub mod records;
pub mod runner;

// Re-exports
pub use endpoints::Endpoints;
pub use job::{Job, load_items, parse_items};
pub use records::{HolderBalance, StampHolder, TickAction, TokenBalance};
pub use runner::{JobConfig, run};
