//! Bounded exponential-backoff retry loop.
//!
//! Callers decide which errors are transient; everything else is returned on
//! the first occurrence without sleeping.

use std::{future::Future, time::Duration};

use log::warn;

use crate::config::RetrySettings;

/// Error codes and message fragments that identify a transient network failure.
const TRANSIENT_MARKERS: [&str; 8] = [
    "Timeout",
    "timed out",
    "ECONNRESET",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "EPIPE",
    "connection reset",
    "connection refused",
];

/// Delay before retry number `attempt` (0-indexed):
/// `min(initial_delay * 2^attempt, max_delay)`.
pub fn backoff_delay(settings: &RetrySettings, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let ms = settings
        .initial_delay_ms
        .saturating_mul(factor)
        .min(settings.max_delay_ms);
    Duration::from_millis(ms)
}

/// True if any error in the chain is an I/O failure of a retryable kind or
/// carries one of the well-known transient markers in its message.
pub fn is_transient_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }

        if let Some(ch) = cause.downcast_ref::<clickhouse::error::Error>() {
            if matches!(
                ch,
                clickhouse::error::Error::Network(_) | clickhouse::error::Error::TimedOut
            ) {
                return true;
            }
        }

        if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
            if http.is_timeout() || http.is_connect() {
                return true;
            }
            if let Some(status) = http.status() {
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return true;
                }
            }
        }

        let message = cause.to_string();
        TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
    })
}

/// Run `op` until it succeeds, fails with a non-transient error, or the retry
/// budget is spent. The last error is returned once retries are exhausted.
pub async fn with_retry<T, F, Fut>(
    settings: &RetrySettings,
    operation_name: &str,
    is_retryable: impl Fn(&anyhow::Error) -> bool,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) || attempt >= settings.max_retries {
                    return Err(e);
                }

                let delay = backoff_delay(settings, attempt);
                warn!(
                    "{} failed (attempt {}/{}): {:#}. Retrying in {:?}...",
                    operation_name,
                    attempt + 1,
                    settings.max_retries + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RetrySettings {
        RetrySettings {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let s = settings();
        assert_eq!(backoff_delay(&s, 0), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&s, 1), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&s, 3), Duration::from_millis(8_000));
        assert_eq!(backoff_delay(&s, 4), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(&s, 80), Duration::from_millis(10_000));
    }

    #[test]
    fn test_transient_classification() {
        let reset = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer went away",
        ));
        assert!(is_transient_error(&reset));

        let wrapped = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe",
        ))
        .context("insert into dex_trades");
        assert!(is_transient_error(&wrapped));

        assert!(is_transient_error(&anyhow::anyhow!("Timeout error")));
        assert!(is_transient_error(&anyhow::anyhow!("read ECONNRESET")));
        assert!(!is_transient_error(&anyhow::anyhow!(
            "Code: 62. DB::Exception: Syntax error"
        )));
    }
}
