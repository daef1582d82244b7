//! Exponential backoff around a fallible async operation.
//!
//! The operation is retried until it succeeds or until waiting for the next
//! attempt would push the total elapsed time past the policy's budget, in
//! which case the last error is returned. Delays are deterministic; the only
//! randomness in the refresh path is the one-off startup jitter applied by
//! the engine.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Retry policy for one guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub multiplier: u32,
    /// Upper bound for a single wait.
    pub max_interval: Duration,
    /// Total retry budget measured from the first attempt.
    pub max_elapsed: Duration,
}

impl BackoffPolicy {
    pub const INITIAL_INTERVAL: Duration = Duration::from_secs(5);
    pub const MULTIPLIER: u32 = 2;
    pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

    /// Policy shared by both workflows: 5s, doubling, budget of a quarter of
    /// the refresh interval.
    pub fn for_refresh(refresh: Duration) -> Self {
        Self {
            initial_interval: Self::INITIAL_INTERVAL,
            multiplier: Self::MULTIPLIER,
            max_interval: Self::MAX_INTERVAL,
            max_elapsed: refresh / 4,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(self.multiplier).min(self.max_interval)
    }
}

/// Run `operation` under `policy`, calling `notify` with the error and the
/// upcoming delay after every failed attempt that will be retried.
pub async fn retry_notify<T, E, F, Fut, N>(
    policy: BackoffPolicy,
    mut operation: F,
    mut notify: N,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(&E, Duration),
{
    let started = Instant::now();
    let mut delay = policy.initial_interval.min(policy.max_interval);

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if started.elapsed() + delay > policy.max_elapsed {
            return Err(err);
        }

        notify(&err, delay);
        tokio::time::sleep(delay).await;
        delay = policy.next_interval(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_policy_for_refresh() {
        let policy = BackoffPolicy::for_refresh(Duration::from_secs(3600));
        assert_eq!(policy.initial_interval, Duration::from_secs(5));
        assert_eq!(policy.multiplier, 2);
        assert_eq!(policy.max_elapsed, Duration::from_secs(900));
    }

    #[test]
    fn test_interval_is_capped() {
        let policy = BackoffPolicy::for_refresh(Duration::from_secs(86_400));
        assert_eq!(policy.next_interval(Duration::from_secs(40)), Duration::from_secs(60));
        assert_eq!(policy.next_interval(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_immediately() {
        let policy = BackoffPolicy::for_refresh(Duration::from_secs(120));
        let result: Result<i32, &str> =
            retry_notify(policy, || async { Ok(42) }, |_, _| panic!("no retry expected")).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let policy = BackoffPolicy::for_refresh(Duration::from_secs(3600));

        let result: Result<i32, &str> = retry_notify(
            policy,
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("provider unavailable")
                    } else {
                        Ok(7)
                    }
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_until_budget_is_spent() {
        // refresh 240s => budget 60s: waits 5, 10, 20 then 40 would end at 75s.
        let policy = BackoffPolicy::for_refresh(Duration::from_secs(240));
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let mut delays = Vec::new();
        let start = Instant::now();

        let result: Result<(), String> = retry_notify(
            policy,
            || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Err(format!("attempt {}", n))
                }
            },
            |_, delay| delays.push(delay),
        )
        .await;

        assert_eq!(
            delays,
            vec![Duration::from_secs(5), Duration::from_secs(10), Duration::from_secs(20)]
        );
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(result, Err("attempt 3".to_string()));
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_smaller_than_first_delay_means_single_attempt() {
        let policy = BackoffPolicy::for_refresh(Duration::from_secs(8));
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<(), &str> = retry_notify(
            policy,
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
