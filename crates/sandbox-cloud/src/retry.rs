use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Fixed-delay bounded retry policy. No backoff growth: the call sites here
/// wait on bounded-latency events, not degrading ones.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// A retry loop ran out of attempts. Carries the last error so callers can
/// tell exhaustion apart from the underlying failure.
#[derive(Debug, thiserror::Error)]
#[error("retries exhausted after {attempts} attempts: {last}")]
pub struct RetryExhausted<E: Display + Debug> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds or the attempt budget is spent.
///
/// Sleeps `policy.delay` between attempts, never after the last one. The
/// loop is always bounded; a zero-attempt policy fails on the first error.
pub async fn retry_fixed<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + Debug,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= policy.attempts => {
                return Err(RetryExhausted {
                    attempts: policy.attempts,
                    last,
                });
            }
            Err(e) => {
                debug!(attempt, attempts = policy.attempts, error = %e, "attempt failed, retrying");
            }
        }
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct NotYet(&'static str);

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = counter();
        let c = Arc::clone(&calls);
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(30),
        };

        let result = retry_fixed(policy, move || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(NotYet("later")) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_and_last_error() {
        let calls = counter();
        let c = Arc::clone(&calls);
        let policy = RetryPolicy {
            attempts: 4,
            delay: Duration::from_secs(30),
        };

        let result: Result<(), _> = retry_fixed(policy, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(NotYet("still down"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("still down"));
    }

    #[tokio::test]
    async fn first_success_needs_no_sleep() {
        let policy = RetryPolicy {
            attempts: 20,
            delay: Duration::from_secs(30),
        };
        // not paused: would hang for minutes if the loop slept
        let result: Result<u32, RetryExhausted<NotYet>> =
            retry_fixed(policy, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
