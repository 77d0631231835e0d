//! Retry executor for IQ Server requests
//!
//! Retryable failures are repeated up to `max_attempts` more times. The
//! delay before retry `n` is `initial_delay * backoff_multiplier^n`, capped
//! at `max_delay`, and doubled at most by jitter when enabled.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient (worth retrying) or final
pub trait IsRetryable {
    /// True if repeating the request may succeed
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Anything that went wrong on the wire, except a request we could not even build
            Error::Transport(e) => !e.is_builder(),
            Error::Http { status, .. } => *status >= 500,
            Error::Authentication { .. } => false,
            // No report yet is a normal state
            Error::NotFound(_) => false,
            Error::Serialization(_) => false,
            Error::Filesystem { .. } => false,
            Error::Config { .. } => false,
            Error::InvalidUrl(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries
///
/// `request` identifies the call in log events, usually its URL.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    request: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(request, attempts = retries + 1, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::debug!(request, error = %err, "Request failed permanently");
            return Err(err);
        }
        if retries >= config.max_attempts {
            tracing::debug!(
                request,
                error = %err,
                attempts = retries + 1,
                "Giving up on request"
            );
            return Err(err);
        }

        let delay = retry_delay(config, retries);
        retries += 1;
        tracing::warn!(
            request,
            error = %err,
            retry = retries,
            max_retries = config.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Request failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Delay before retry number `retry + 1` (zero based), jitter included
fn retry_delay(config: &RetryConfig, retry: u32) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let scaled = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    // Overflow, infinity and NaN all saturate at the cap
    let base = Duration::try_from_secs_f64(scaled)
        .unwrap_or(config.max_delay)
        .min(config.max_delay);

    if config.jitter { add_jitter(base) } else { base }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
}
