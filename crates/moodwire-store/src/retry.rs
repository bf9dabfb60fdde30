//! Retry with exponential back-off and jitter for store operations.
//!
//! [`retry_with_backoff`] wraps any fallible store operation and retries on
//! transient errors (I/O failures, pool exhaustion). Logical errors — not
//! found, guarded status transitions, constraint conflicts — are returned
//! immediately; retrying cannot fix them.

use std::future::Future;
use std::time::Duration;

use crate::StoreError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:** connection-level `sqlx` failures (I/O, TLS, pool timeout,
/// background worker crash).
///
/// **Not retriable (hard stop):** `NotFound`, `InvalidTransition`,
/// `IdempotencyConflict`, database-reported errors (constraint violations and
/// friends), and anything already wrapped as `Unavailable`.
pub(crate) fn is_retriable(err: &StoreError) -> bool {
    match err {
        StoreError::Sqlx(e) => matches!(
            e,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::WorkerCrashed
        ),
        _ => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Delays follow `backoff_base_ms × 2^attempt` with ±25 % jitter, capped at
/// 30 s. When a retriable error survives every attempt it is wrapped as
/// [`StoreError::Unavailable`] so callers can tell "the store is down" apart
/// from "the operation is wrong".
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) {
                    return Err(err);
                }
                if attempt >= max_retries {
                    return Err(StoreError::Unavailable {
                        attempts: attempt + 1,
                        last_error: err.to_string(),
                    });
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient store error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    fn io_err() -> StoreError {
        StoreError::Sqlx(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        )))
    }

    #[test]
    fn not_found_is_not_retriable() {
        assert!(!is_retriable(&StoreError::NotFound));
    }

    #[test]
    fn invalid_transition_is_not_retriable() {
        assert!(!is_retriable(&StoreError::InvalidTransition {
            run_id: Uuid::nil(),
            expected: "running",
        }));
    }

    #[test]
    fn io_error_is_retriable() {
        assert!(is_retriable(&io_err()));
    }

    #[test]
    fn pool_timeout_is_retriable() {
        assert!(is_retriable(&StoreError::Sqlx(sqlx::Error::PoolTimedOut)));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, StoreError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_logical_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(StoreError::NotFound)
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "NotFound must not be retried");
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(io_err())
                } else {
                    Ok(99u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99, "should succeed after retries");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_as_unavailable() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(io_err())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial try + 2 retries");
        assert!(matches!(
            result,
            Err(StoreError::Unavailable { attempts: 3, .. })
        ));
    }
}
