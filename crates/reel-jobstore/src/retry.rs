//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::error::{JobStoreError, JobStoreResult};
use crate::metrics::record_retry;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let env_u64 = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self {
            max_retries: env_u64("JOBSTORE_MAX_RETRIES", 3) as u32,
            base_delay_ms: env_u64("JOBSTORE_RETRY_BASE_MS", 100),
            max_delay_ms: env_u64("JOBSTORE_RETRY_MAX_MS", 5000),
        }
    }
}

/// Execute an async operation with retry.
///
/// Retries network errors, 429 (honoring the server delay) and 5xx.
/// Everything else is returned immediately.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    op: F,
) -> JobStoreResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = JobStoreResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let span = info_span!("jobstore_retry", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt, e.retry_after_ms());

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Job store operation failed, retrying: {}",
                    e
                );

                record_retry(operation);
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| JobStoreError::RequestFailed("retries exhausted".into())))
}

/// Exponential backoff with full jitter, floored at the base delay.
pub(crate) fn calculate_delay(
    config: &RetryConfig,
    attempt: u32,
    retry_after_ms: Option<u64>,
) -> Duration {
    if let Some(after) = retry_after_ms {
        return Duration::from_millis(after);
    }

    let exp_delay = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = exp_delay.min(config.max_delay_ms);

    // Sub-second clock noise is enough spread for a handful of workers
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let jittered = (capped as f64 * ((nanos % 1000) as f64 / 1000.0)) as u64;

    Duration::from_millis(jittered.max(config.base_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[test]
    fn test_delay_bounds() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
        };
        let delay = calculate_delay(&config, 10, None);
        assert!(delay.as_millis() >= 1000 && delay.as_millis() <= 2000);
        assert_eq!(
            calculate_delay(&config, 0, Some(1500)),
            Duration::from_millis(1500)
        );
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&fast(), "get", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(JobStoreError::ServerError(503, "busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let calls = &AtomicU32::new(0);
        let result: JobStoreResult<()> = with_retry(&fast(), "get", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(JobStoreError::RequestFailed("bad filter".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: JobStoreResult<()> = with_retry(&fast(), "get", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(JobStoreError::RateLimited(1))
        })
        .await;

        assert!(matches!(result, Err(JobStoreError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
