//! HTTP JSON client.
//!
//! Uses async reqwest internally on a shared tokio runtime, but presents a
//! sync interface so rayon workers can call it directly.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;

use crate::error::{ConfigError, FetchError, FetchErrorKind};

/// Default whole-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for the HTTP client and fetch-level retry
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Applied to every request so one stalled peer holds at most one worker
    pub request_timeout: Duration,
    /// Retries per work item; 0 disables retry
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: 0,
        }
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// JSON-over-HTTP client with connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(config.request_timeout))
            .pool_max_idle_per_host(8)
            .user_agent(concat!("stampline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    /// GET `url` and parse the body as JSON.
    ///
    /// Non-2xx status and non-JSON bodies are errors; nothing is retried here.
    pub fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(&e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::new(
                    FetchErrorKind::Status(status.as_u16()),
                    status.canonical_reason().unwrap_or("request failed"),
                ));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::from_reqwest(&e))?;
            serde_json::from_slice(&body)
                .map_err(|e| FetchError::malformed(format!("invalid JSON: {e}")))
        })
    }
}
