//! Pipeline configuration and validation

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::accumulator::DEFAULT_CHECKPOINT_INTERVAL;
use crate::dispatcher::DEFAULT_WORKERS;
use crate::error::ConfigError;
use crate::http::HttpConfig;

/// Default records per page for counted endpoints
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Options of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub page_size: usize,
    /// Stop each work item after this many pages
    pub max_pages: Option<usize>,
    /// Fetch worker pool size
    pub workers: usize,
    /// Pending records that trigger a checkpoint
    pub checkpoint_interval: usize,
    pub destination: PathBuf,
    pub http: HttpConfig,
    /// Quote every CSV cell
    pub quote_all: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            workers: DEFAULT_WORKERS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            destination: PathBuf::new(),
            http: HttpConfig::default(),
            quote_all: false,
        }
    }
}

impl PipelineConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Reject unusable settings and make sure the destination's parent exists.
    ///
    /// Runs before any network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Zero("page_size"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero("worker_pool_size"));
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Zero("checkpoint_interval"));
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::Zero("max_pages"));
        }
        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::Zero("request_timeout"));
        }
        validate_destination(&self.destination)
    }
}

fn validate_destination(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyDestination);
    }
    if path.is_dir() {
        return Err(ConfigError::DestinationIsDir(path.to_path_buf()));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
            log::debug!("created {}", parent.display());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Case-insensitive set of values a record field must match to be persisted.
#[derive(Debug, Clone)]
pub struct AllowList {
    field: String,
    values: FxHashSet<String>,
}

impl AllowList {
    /// `field` must be one of `known_fields`; entries are trimmed and must be non-empty.
    pub fn new<I>(field: &str, values: I, known_fields: &[&str]) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if !known_fields.contains(&field) {
            return Err(ConfigError::UnknownField {
                field: field.to_string(),
                known: known_fields.join(", "),
            });
        }
        let mut set = FxHashSet::default();
        for value in values {
            let value = value.as_ref().trim();
            if value.is_empty() {
                return Err(ConfigError::EmptyAllowEntry);
            }
            set.insert(value.to_lowercase());
        }
        Ok(Self {
            field: field.to_string(),
            values: set,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(&value.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.page_size, 500);
        assert_eq!(config.workers, 8);
        assert_eq!(config.checkpoint_interval, 200);
        assert_eq!(config.http.request_timeout.as_secs(), 30);
        assert_eq!(config.http.max_retries, 0);
        assert!(config.max_pages.is_none());
    }

    #[test]
    fn validation_table() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.csv");

        type Tweak = fn(&mut PipelineConfig);
        let cases: [(&str, Tweak, Option<&str>); 6] = [
            ("valid", |_| {}, None),
            ("page_size", |c| c.page_size = 0, Some("page_size")),
            ("workers", |c| c.workers = 0, Some("worker_pool_size")),
            (
                "interval",
                |c| c.checkpoint_interval = 0,
                Some("checkpoint_interval"),
            ),
            ("max_pages", |c| c.max_pages = Some(0), Some("max_pages")),
            (
                "timeout",
                |c| c.http.request_timeout = Duration::ZERO,
                Some("request_timeout"),
            ),
        ];
        for (name, tweak, expected) in cases {
            let mut config = PipelineConfig::new(&dest);
            tweak(&mut config);
            match (config.validate(), expected) {
                (Ok(()), None) => {}
                (Err(ConfigError::Zero(field)), Some(want)) => assert_eq!(field, want, "{name}"),
                (other, _) => panic!("{name}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn destination_rules() {
        let dir = TempDir::new().unwrap();

        let err = PipelineConfig::new("").validate().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDestination));

        let err = PipelineConfig::new(dir.path()).validate().unwrap_err();
        assert!(matches!(err, ConfigError::DestinationIsDir(_)));

        let nested = dir.path().join("a").join("b").join("out.csv");
        PipelineConfig::new(&nested).validate().unwrap();
        assert!(nested.parent().unwrap().is_dir());
    }

    #[test]
    fn uncreatable_parent_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = PipelineConfig::new(blocker.join("sub").join("out.csv"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CreateDir { .. }));
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let list = AllowList::new("tick", ["KEVIN", " stamp ", "$viva"], &["tick"]).unwrap();
        assert_eq!(list.field(), "tick");
        assert_eq!(list.len(), 3);
        assert!(list.contains("kevin"));
        assert!(list.contains("STAMP"));
        assert!(list.contains("$VIVA"));
        assert!(!list.contains("utxo"));
    }

    #[test]
    fn allow_list_validation() {
        let err = AllowList::new("ticker", ["kevin"], &["tick", "address"]).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownField { ref field, ref known } if field == "ticker" && known == "tick, address")
        );

        let err = AllowList::new("tick", ["kevin", "  "], &["tick"]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAllowEntry));
    }
}
