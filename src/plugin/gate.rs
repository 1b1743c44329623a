//! Call gate around the external-source boundary
//!
//! Every plugin instance owns one gate. The gate spaces calls at least
//! `60 / rate_limit` seconds apart and retries failed calls with capped
//! exponential backoff.

use crate::Result;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Minimum-interval limiter; the clock is per instance, never shared
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    /// `rate_limit` is calls per minute; 0 disables spacing
    pub fn new(rate_limit: u32) -> Self {
        let min_interval = if rate_limit == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / f64::from(rate_limit))
        };
        Self {
            min_interval,
            last_call: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the interval since the previous call has elapsed, then stamp
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limit wait");
                sleep(wait).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Bounded retry with exponential backoff between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            multiplier: min_wait,
            min_wait,
            max_wait: max_wait.max(min_wait),
        }
    }

    /// Backoff after `attempts_made` failed attempts: multiplier · 2^(n-1), clamped
    pub fn wait_before_retry(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(31);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }
}

/// Result of a gated call plus how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Rate limiter and retry policy for one plugin instance
#[derive(Debug)]
pub struct CallGate {
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl CallGate {
    pub fn new(rate_limit: u32, policy: RetryPolicy) -> Self {
        Self {
            limiter: RateLimiter::new(rate_limit),
            policy,
        }
    }

    /// Run `attempt` through the limiter, retrying until success or exhaustion.
    /// The error of the final attempt is the one returned.
    pub async fn call<'a, T>(
        &mut self,
        label: &str,
        mut attempt: impl FnMut() -> BoxFuture<'a, Result<T>>,
    ) -> Attempted<T> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.limiter.acquire().await;

            match attempt().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(e) if attempts >= max_attempts => {
                    warn!(
                        target_call = %label,
                        attempts,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Attempted {
                        result: Err(e),
                        attempts,
                    };
                }
                Err(e) => {
                    let wait = self.policy.wait_before_retry(attempts);
                    warn!(
                        target_call = %label,
                        attempt = attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying"
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_min_interval_from_rate_limit() {
        assert_eq!(RateLimiter::new(60).min_interval(), Duration::from_secs(1));
        assert_eq!(RateLimiter::new(120).min_interval(), Duration::from_millis(500));
        assert_eq!(RateLimiter::new(0).min_interval(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_is_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_before_retry(1), Duration::from_secs(4));
        assert_eq!(policy.wait_before_retry(3), Duration::from_secs(4));
        assert_eq!(policy.wait_before_retry(4), Duration::from_secs(8));
        assert_eq!(policy.wait_before_retry(5), Duration::from_secs(10));
        assert_eq!(policy.wait_before_retry(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_consecutive_acquires_are_spaced() {
        // 1200 calls/minute -> 50ms apart
        let mut limiter = RateLimiter::new(1200);
        let start = std::time::Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(145));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let mut gate = CallGate::new(0, fast_policy(3));

        let outcome = gate
            .call("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(HubError::Provider(format!("attempt {} failed", n)))
                    } else {
                        Ok(n)
                    }
                }
                .boxed()
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let mut gate = CallGate::new(0, fast_policy(3));

        let outcome: Attempted<()> = gate
            .call("down", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(HubError::Provider(format!("failure {}", n))) }.boxed()
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.result.unwrap_err().to_string(),
            "Data provider error: failure 3"
        );
    }
}
