use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with doubling backoff. Wraps only calls whose transient
/// failure must not immediately become the caller's failure, such as the
/// compensating deposit after a broken two-leg transfer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    description: &str,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut sleep_for = policy.initial_backoff;
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt == attempts => return Err(err),
            Err(err) => {
                tracing::warn!(
                    attempt,
                    error = %err,
                    "{description} failed, retrying"
                );
                tokio::time::sleep(sleep_for).await;
                sleep_for = (sleep_for * 2).min(policy.max_backoff);
            }
        }
    }

    unreachable!("retry loop returns on final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = with_backoff(&quick_policy(3), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let out: Result<(), &str> = with_backoff(&quick_policy(3), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;
        assert_eq!(out, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
