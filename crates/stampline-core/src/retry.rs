//! Optional retry with exponential backoff for whole-item fetches

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::FetchError;

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// Retry a fallible fetch with exponential backoff.
///
/// Retries only errors whose kind is retryable, up to `max_retries` times,
/// and never once `stop` is set. `max_retries == 0` runs `attempt_fn`
/// exactly once.
pub fn retry_with_backoff<T>(
    label: &str,
    max_retries: u32,
    stop: &AtomicBool,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() && !stop.load(Ordering::Relaxed) => {
                attempt += 1;
                log::debug!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => return Err(e),
        }
    }
}
