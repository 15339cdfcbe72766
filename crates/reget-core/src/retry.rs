//! Retrying transport wrapper
//!
//! Makes every single transport call resilient to transient failure:
//! the call is repeated after a fixed backoff until it succeeds or the
//! caller's cancellation token fires. There is no attempt limit.

use crate::error::RegetError;
use crate::transport::{BodyReader, HttpTransport};
use reget_types::{ByteRange, ResourceMetadata, RetrySettings};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff between attempts of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    /// Wait before each of the first `short_retries` retries
    pub short_wait: Duration,
    pub short_retries: u32,
    /// Wait before every retry after that
    pub long_wait: Duration,
}

impl RetrySchedule {
    /// Wait before the given retry (1 is the first retry after the initial try)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry <= self.short_retries {
            self.short_wait
        } else {
            self.long_wait
        }
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetrySchedule {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            short_wait: Duration::from_secs(settings.short_wait_secs),
            short_retries: settings.short_retries,
            long_wait: Duration::from_secs(settings.long_wait_secs),
        }
    }
}

/// Sleep for `delay` unless `token` fires first
pub async fn wait_or_cancel(delay: Duration, token: &CancellationToken) -> Result<(), RegetError> {
    tokio::select! {
        _ = token.cancelled() => Err(RegetError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Wraps a raw [`HttpTransport`] and retries each call on the schedule.
///
/// Attempt counters live on the stack of each call, so one instance can be
/// shared by any number of concurrent downloads.
#[derive(Clone)]
pub struct RetryingTransport {
    inner: Arc<dyn HttpTransport>,
    schedule: RetrySchedule,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, schedule: RetrySchedule) -> Self {
        Self { inner, schedule }
    }

    pub fn schedule(&self) -> RetrySchedule {
        self.schedule
    }

    pub async fn fetch_metadata(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<ResourceMetadata, RegetError> {
        self.execute("metadata", token, || self.inner.fetch_metadata(url))
            .await
    }

    pub async fn fetch_full(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<BodyReader, RegetError> {
        self.execute("full", token, || self.inner.fetch_full(url)).await
    }

    pub async fn fetch_range(
        &self,
        url: &str,
        range: ByteRange,
        token: &CancellationToken,
    ) -> Result<BodyReader, RegetError> {
        self.execute("range", token, || self.inner.fetch_range(url, range))
            .await
    }

    async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        token: &CancellationToken,
        mut call: F,
    ) -> Result<T, RegetError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RegetError>>,
    {
        let mut retry: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Err(RegetError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(RegetError::Cancelled),
                result = call() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    retry = retry.saturating_add(1);
                    let delay = self.schedule.delay_for_retry(retry);
                    warn!(
                        operation,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, will retry"
                    );
                    wait_or_cancel(delay, token).await?;
                }
            }
        }
    }
}
