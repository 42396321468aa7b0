//! Shared HTTP plumbing: client construction, status mapping and retry.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::{record_request, record_retry};

/// Timeouts and retry budget shared by every provider client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

impl HttpSettings {
    /// Read `{PREFIX}_TIMEOUT_SECS`, `{PREFIX}_MAX_RETRIES` and
    /// `{PREFIX}_RETRY_BASE_MS`, keeping `defaults` for anything unset.
    pub fn from_env(prefix: &str, defaults: HttpSettings) -> Self {
        let num = |suffix: &str| -> Option<u64> {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .and_then(|s| s.parse().ok())
        };

        Self {
            timeout: num("TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: defaults.connect_timeout,
            max_retries: num("MAX_RETRIES")
                .map(|n| n as u32)
                .unwrap_or(defaults.max_retries),
            retry_base_delay: num("RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
        }
    }

    pub fn build_client(&self, name: &str) -> ProviderResult<Client> {
        Ok(Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("scriptreel-{}/{}", name, env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

/// Read a required, non-empty environment variable.
pub fn required_env(name: &str) -> ProviderResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ProviderError::config(format!("{} not set", name))),
    }
}

/// Pass successful responses through and turn the rest into errors.
pub async fn check_response(provider: &'static str, response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();

    Err(ProviderError::from_http_status(
        provider,
        status.as_u16(),
        truncate(&body, 400),
        retry_after_ms,
    ))
}

/// Execute a provider call with exponential backoff on retryable errors.
pub async fn with_retry<F, Fut, T>(
    provider: &'static str,
    settings: &HttpSettings,
    operation: F,
) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    with_retry_when(provider, settings, operation, ProviderError::is_retryable).await
}

/// Like [`with_retry`], but only errors accepted by `should_retry` are retried.
///
/// Calls that create something on the provider side pass
/// [`ProviderError::is_server_rejection`] so a lost response never leads to
/// a second submission.
pub async fn with_retry_when<F, Fut, T, P>(
    provider: &'static str,
    settings: &HttpSettings,
    operation: F,
    should_retry: P,
) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
    P: Fn(&ProviderError) -> bool,
{
    let mut last_error = None;

    for attempt in 0..=settings.max_retries {
        let start = Instant::now();
        let result = operation().await;
        record_request(provider, result.is_ok(), start.elapsed().as_secs_f64());

        match result {
            Ok(value) => return Ok(value),
            Err(e) if should_retry(&e) && attempt < settings.max_retries => {
                let delay = e
                    .retry_after_ms()
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| settings.retry_base_delay * 2u32.saturating_pow(attempt))
                    .min(Duration::from_secs(60));
                warn!(
                    provider,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Provider request failed, retrying: {}",
                    e
                );
                record_retry(provider);
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| ProviderError::invalid_response("retries exhausted")))
}

/// Fetch a URL produced by a provider (image or clip result).
pub async fn download(client: &Client, provider: &'static str, url: &str) -> ProviderResult<Vec<u8>> {
    let response = check_response(provider, client.get(url).send().await?).await?;
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(ProviderError::invalid_response(format!(
            "{} returned an empty file",
            provider
        )));
    }
    Ok(bytes.to_vec())
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> HttpSettings {
        HttpSettings {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let calls = &AtomicU32::new(0);
        let value = with_retry("test", &fast(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::Timeout(1))
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = &AtomicU32::new(0);
        let result: ProviderResult<()> = with_retry("test", &fast(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Timeout(1))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Timeout(1))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_predicate_limits_retries() {
        let calls = &AtomicU32::new(0);
        let result: ProviderResult<()> = with_retry_when(
            "test",
            &fast(),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Timeout(1))
            },
            ProviderError::is_server_rejection,
        )
        .await;

        assert!(matches!(result, Err(ProviderError::Timeout(1))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_predicate_still_retries_throttling() {
        let calls = &AtomicU32::new(0);
        let value = with_retry_when(
            "test",
            &fast(),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::RateLimited("test", 1))
                } else {
                    Ok(7)
                }
            },
            ProviderError::is_server_rejection,
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
