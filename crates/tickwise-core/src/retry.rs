//! Bounded retry with exponential backoff and jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^retry`, capped at `max`, optionally jittered by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scaled = base.as_secs_f64() * factor.powi(retry as i32);
                let mut delay = Duration::from_secs_f64(scaled.min(max.as_secs_f64()));

                if jitter {
                    let spread_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let offset = fastrand::u64(0..=(spread_ms * 2));
                    let total_ms = delay.as_millis() as i64 + offset as i64 - spread_ms as i64;
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// How many times a transient failure is retried, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
        }
    }
}

/// Final result of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryConfig {
    pub fn exponential(base: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential {
                base,
                factor: 2.0,
                max: Duration::from_secs(10),
                jitter: true,
            },
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Build from a total attempt budget, as notification settings express it.
    pub fn with_total_attempts(total: u32, backoff: Backoff) -> Self {
        Self {
            max_retries: total.saturating_sub(1),
            backoff,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }

    /// Run `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget is spent.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, E, Op, Fut, R>(&self, mut operation: Op, is_retryable: R) -> Attempted<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let total = self.total_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(error) if attempt < total && is_retryable(&error) => {
                    let delay = self.delay_for_retry(attempt - 1);
                    debug!(
                        attempt,
                        total,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Attempted {
                        result: Err(error),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_half_of_the_delay() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..10 {
            for retry in 0..5 {
                let expected = (100.0 * 2_f64.powi(retry as i32)).min(1000.0);
                let actual = backoff.delay(retry).as_millis() as f64;
                assert!(actual >= expected * 0.49, "retry={retry}, delay={actual}");
                assert!(actual <= expected * 1.51, "retry={retry}, delay={actual}");
            }
        }
    }

    #[test]
    fn total_attempts_budget_never_drops_below_one() {
        let config = RetryConfig::with_total_attempts(0, Backoff::Fixed { delay: Duration::ZERO });
        assert_eq!(config.total_attempts(), 1);
        assert_eq!(
            RetryConfig::with_total_attempts(3, Backoff::default()).max_retries,
            2
        );
    }

    #[tokio::test]
    async fn run_stops_after_budget_is_spent() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::fixed(Duration::ZERO, 2);

        let outcome: Attempted<(), String> = config
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down".to_owned()) }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.result.is_err());
    }

    #[tokio::test]
    async fn run_does_not_retry_permanent_errors() {
        let config = RetryConfig::fixed(Duration::ZERO, 5);

        let outcome: Attempted<(), String> = config
            .run(|_| async { Err("gone".to_owned()) }, |error| error != "gone")
            .await;

        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn run_returns_first_success() {
        let config = RetryConfig::fixed(Duration::ZERO, 5);

        let outcome: Attempted<u32, String> = config
            .run(
                |attempt| async move {
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(attempt)
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.ok(), Some(3));
    }
}
