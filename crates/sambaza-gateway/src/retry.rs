use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// Base delay before the second attempt.
const BASE_DELAY_MS: u64 = 200;

/// Delay multiplier between attempts.
const MULTIPLIER: u64 = 2;

/// Run an outbound gateway call with a bounded retry.
///
/// `attempts` is the total number of tries (the original call included);
/// callers pass 1 or 2. Only errors [`GatewayError::is_retryable`] deems
/// transient are retried; credential and logical failures surface
/// immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    label: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = attempts.max(1);
    let mut delay = Duration::from_millis(BASE_DELAY_MS);
    let mut last_err: Option<GatewayError> = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < attempts && e.is_retryable() {
                    tracing::warn!(
                        attempt,
                        call = label,
                        error = %e,
                        "Gateway call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= MULTIPLIER as u32;
                    last_err = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    // Only reachable when attempts == 0 was clamped; keep the last error.
    Err(last_err.unwrap_or_else(|| GatewayError::ConfigError("retry exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> GatewayError {
        GatewayError::HttpError {
            service: "sms".to_string(),
            status: 500,
            body: "connection reset".to_string(),
        }
    }

    #[tokio::test]
    async fn retries_transient_failure_once() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(2, "send_sms", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(transient())
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_credential_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(2, "send_sms", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::Unauthorized {
                    service: "sms".to_string(),
                    message: "invalid api key".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_after_configured_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(2, "send_sms", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
