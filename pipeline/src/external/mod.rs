//! Provider API clients
//!
//! One module per provider wire contract. Each module owns its typed raw
//! payload structs and a single normalization path into
//! [`shared::CanonicalObservation`]; untyped JSON/XML never crosses a module
//! boundary.

pub mod harvest;
pub mod hilltop;
pub mod metwatch;

pub use harvest::HarvestClient;
pub use hilltop::HilltopClient;
pub use metwatch::MetwatchClient;

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Half-open fetch window on the civil calendar: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FetchWindow {
    /// Empty or inverted windows are skipped as no-ops by the orchestrator
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Timestamp format providers accept in query strings
pub const WINDOW_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Shared HTTP client with a pipeline-wide request timeout
pub fn build_http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(AppError::from)
}

/// Bounded retry with exponential backoff for provider calls
///
/// Only transient transport failures are retried; logical provider errors
/// and malformed payloads surface immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "transient provider error, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
