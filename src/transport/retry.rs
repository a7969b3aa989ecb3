//! Retry envelope for transport requests: exponential backoff capped at
//! 8 seconds, applied only to transient network/server failures.

use std::time::Duration;

use crate::errors::TransportError;

const MAX_ATTEMPTS: u32 = 3;

/// Whether a transport error is worth retrying, per the retriable HTTP
/// and network-transport kinds in the spec.
pub fn is_retriable(error: &TransportError) -> bool {
    matches!(error, TransportError::ServerError(_) | TransportError::NetworkError(_))
}

/// `min(1s * 2^attempt, 8s)`.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt).min(8);
    Duration::from_secs(secs)
}

/// Runs `op` up to `retry_attempts` times, sleeping with exponential
/// backoff between retriable failures. Non-retriable failures surface
/// immediately.
pub async fn with_retry<T, F, Fut>(retry_attempts: u32, mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TransportError>>,
{
    let attempts = retry_attempts.min(MAX_ATTEMPTS).max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retriable(&e) && attempt + 1 < attempts => {
                log::warn!("retriable transport error on attempt {}: {}", attempt, e);
                tokio::time::sleep(backoff_for_attempt(attempt)).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.expect("loop always executes at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_eight_seconds() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff_for_attempt(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn stops_after_non_retriable_error() {
        let mut calls = 0;
        let result: Result<(), TransportError> = with_retry(3, || {
            calls += 1;
            async { Err(TransportError::AuthFailure) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
