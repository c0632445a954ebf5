//! Error types shared by the fetch / accumulate / checkpoint pipeline

use std::fmt;
use std::path::PathBuf;

/// What went wrong with a single fetch.
///
/// Transport kinds (`Timeout`, `Connect`, `Network`) and protocol kinds
/// (`Status`, `MalformedBody`) are handled the same way by the dispatcher:
/// the work item is logged as failed and contributes no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Request exceeded the request-level timeout
    Timeout,
    /// Connection refused, DNS failure, TLS handshake
    Connect,
    /// Any other transport failure (body read, redirects, ...)
    Network,
    /// Non-success HTTP status
    Status(u16),
    /// Body is not JSON, misses an expected key, or records don't decode
    MalformedBody,
}

impl FetchErrorKind {
    /// Status and body problems: the server answered, but not usefully.
    pub const fn is_protocol(self) -> bool {
        matches!(self, Self::Status(_) | Self::MalformedBody)
    }

    /// Worth trying again after a pause.
    ///
    /// 429 and 5xx are transient; other statuses and malformed bodies are not.
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::Timeout | Self::Connect | Self::Network => true,
            Self::Status(status) => status == 429 || status >= 500,
            Self::MalformedBody => false,
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Connect => f.write_str("connect error"),
            Self::Network => f.write_str("network error"),
            Self::Status(s) => write!(f, "HTTP {s}"),
            Self::MalformedBody => f.write_str("malformed body"),
        }
    }
}

/// Failure of one page request or of a whole paginated fetch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::MalformedBody, message)
    }

    /// Classify a reqwest error.
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FetchErrorKind::Timeout
        } else if e.is_connect() {
            FetchErrorKind::Connect
        } else if let Some(status) = e.status() {
            FetchErrorKind::Status(status.as_u16())
        } else if e.is_decode() {
            FetchErrorKind::MalformedBody
        } else {
            FetchErrorKind::Network
        };
        Self::new(kind, e.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Failure to persist a checkpoint batch.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The final flush failed; these records never reached the destination
    #[error("{count} records left unflushed: {source}")]
    Unflushed {
        count: usize,
        #[source]
        source: Box<PersistError>,
    },
}

/// Invalid pipeline configuration. Raised before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("destination path is empty")]
    EmptyDestination,

    #[error("destination {} is a directory", .0.display())]
    DestinationIsDir(PathBuf),

    #[error("cannot create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown allow-list field '{field}' (expected one of: {known})")]
    UnknownField { field: String, known: String },

    #[error("allow-list contains an empty entry")]
    EmptyAllowEntry,

    #[error("invalid endpoint URL '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),

    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Fatal pipeline failure: bad configuration or a lost final flush.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use FetchErrorKind::*;

    #[test]
    fn kind_classification_table() {
        // (kind, protocol, retryable)
        let cases = [
            (Timeout, false, true),
            (Connect, false, true),
            (Network, false, true),
            (Status(400), true, false),
            (Status(403), true, false),
            (Status(404), true, false),
            (Status(429), true, true),
            (Status(500), true, true),
            (Status(503), true, true),
            (MalformedBody, true, false),
        ];
        for (kind, protocol, retryable) in cases {
            assert_eq!(kind.is_protocol(), protocol, "{kind} protocol");
            assert_eq!(kind.is_retryable(), retryable, "{kind} retryable");
        }
    }

    #[test]
    fn display_fetch_error() {
        let err = FetchError::new(Status(404), "not found");
        assert_eq!(format!("{err}"), "HTTP 404: not found");
        let err = FetchError::malformed("missing /data/list");
        assert_eq!(format!("{err}"), "malformed body: missing /data/list");
    }

    #[test]
    fn display_unflushed_counts_records() {
        let err = PersistError::Unflushed {
            count: 7,
            source: Box::new(PersistError::Io(std::io::Error::other("disk full"))),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("7 records left unflushed"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn display_config_errors() {
        assert_eq!(
            format!("{}", ConfigError::Zero("page_size")),
            "page_size must be greater than zero"
        );
        let err = ConfigError::UnknownField {
            field: "ticker".into(),
            known: "tick".into(),
        };
        assert!(format!("{err}").contains("'ticker'"));
    }
}
