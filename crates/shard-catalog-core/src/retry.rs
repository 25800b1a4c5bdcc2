use std::time::Duration;

/// Bounds retrying a whole operation (not individual phases) after a
/// classified transient storage fault (§4.7). The default is a single
/// attempt -- retrying is opt-in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_cumulative: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_cumulative: Duration::ZERO,
        }
    }
}

impl BackoffPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        max_cumulative: Duration,
    ) -> Self {
        BackoffPolicy {
            max_attempts,
            base_delay,
            max_delay,
            max_cumulative,
        }
    }

    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        (self.base_delay.saturating_mul(scale)).min(self.max_delay)
    }
}

/// Runs `op` up to `policy.max_attempts` times, retrying only while `op`
/// fails with a classified transient `sqlx::Error` and the cumulative sleep
/// so far stays under `policy.max_cumulative`. Permanent errors and
/// exhausted retries are both surfaced to the caller as-is; it is the
/// caller's job (the operation engine) to translate an exhausted transient
/// failure into `Error::StorageOperationFailure`.
pub async fn retry_transient<F, Fut, T>(policy: &BackoffPolicy, mut op: F) -> sqlx::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = sqlx::Result<T>>,
{
    let mut cumulative = Duration::ZERO;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && shard_catalog_sql::is_transient(&err) => {
                let delay = policy.delay_for_attempt(attempt);
                if cumulative + delay > policy.max_cumulative {
                    return Err(err);
                }
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient storage fault"
                );
                tokio::time::sleep(delay).await;
                cumulative += delay;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn default_policy_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&BackoffPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(sqlx::Error::PoolClosed) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::new(
            5,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Duration::from_secs(1),
        );
        let result = retry_transient(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(sqlx::Error::PoolClosed)
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_never_retried() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::new(
            5,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Duration::from_secs(1),
        );
        let result = retry_transient(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(sqlx::Error::RowNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
