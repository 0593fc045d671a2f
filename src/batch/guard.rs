//! Bounded timeout and retry around a forecaster.
//!
//! [`GuardedForecaster`] is meant to be called from a blocking worker
//! (`spawn_blocking`). Every attempt runs the inner forecaster on its own
//! blocking task and waits for it with `tokio::time::timeout`; an attempt
//! that times out is abandoned (the detached task is not cancelled).

use crate::error::InferenceError;
use crate::model::Forecaster;
use ndarray::{Array1, Array2};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Exponential backoff, capped, with a fixed attempt budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No retries
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

pub struct GuardedForecaster {
    inner: Arc<dyn Forecaster>,
    handle: Handle,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GuardedForecaster {
    pub fn new(
        inner: Arc<dyn Forecaster>,
        handle: Handle,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            handle,
            timeout,
            retry,
        }
    }

    fn attempt(&self, window: &Array2<f64>) -> Result<Array1<f64>, InferenceError> {
        let inner = Arc::clone(&self.inner);
        let window = window.clone();
        let task = self.handle.spawn_blocking(move || inner.predict(&window));

        match self
            .handle
            .block_on(async { tokio::time::timeout(self.timeout, task).await })
        {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(InferenceError::Failed(format!(
                "forecaster worker aborted: {}",
                join
            ))),
            Err(_) => Err(InferenceError::Timeout(self.timeout)),
        }
    }
}

impl Forecaster for GuardedForecaster {
    fn predict(&self, window: &Array2<f64>) -> Result<Array1<f64>, InferenceError> {
        let mut attempt = 1;
        loop {
            match self.attempt(window) {
                Ok(returns) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", self.inner.name(), attempt);
                    }
                    return Ok(returns);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}, retrying in {:?}",
                        self.inner.name(),
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockForecaster;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then returns zeros
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        error: InferenceError,
    }

    impl Forecaster for Flaky {
        fn predict(&self, _window: &Array2<f64>) -> Result<Array1<f64>, InferenceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(Array1::zeros(2))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// Sleeps longer than any test timeout
    struct Slow;

    impl Forecaster for Slow {
        fn predict(&self, _window: &Array2<f64>) -> Result<Array1<f64>, InferenceError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Array1::zeros(2))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    async fn call(guard: GuardedForecaster) -> Result<Array1<f64>, InferenceError> {
        tokio::task::spawn_blocking(move || guard.predict(&Array2::zeros((3, 1))))
            .await
            .unwrap()
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retries_until_success() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 2,
            error: InferenceError::Failed("transient".into()),
        });
        let guard = GuardedForecaster::new(
            flaky.clone(),
            Handle::current(),
            Duration::from_secs(5),
            fast_retry(3),
        );
        let out = call(guard).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_gives_up_after_max_attempts() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 10,
            error: InferenceError::Failed("down".into()),
        });
        let guard = GuardedForecaster::new(
            flaky.clone(),
            Handle::current(),
            Duration::from_secs(5),
            fast_retry(3),
        );
        let err = call(guard).await.unwrap_err();
        assert_eq!(err, InferenceError::Failed("down".into()));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shape_errors_are_not_retried() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 10,
            error: InferenceError::Shape {
                expected: 2,
                actual: 0,
            },
        });
        let guard = GuardedForecaster::new(
            flaky.clone(),
            Handle::current(),
            Duration::from_secs(5),
            fast_retry(5),
        );
        assert!(call(guard).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_is_reported() {
        let guard = GuardedForecaster::new(
            Arc::new(Slow),
            Handle::current(),
            Duration::from_millis(20),
            fast_retry(2),
        );
        let err = call(guard).await.unwrap_err();
        assert_eq!(err, InferenceError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_passes_through_name_and_output() {
        let mut mock = MockForecaster::new();
        mock.expect_predict()
            .times(1)
            .returning(|_| Ok(Array1::from_elem(2, 0.01)));
        mock.expect_name().return_const("mock".to_string());
        let guard = GuardedForecaster::new(
            Arc::new(mock),
            Handle::current(),
            Duration::from_secs(1),
            RetryPolicy::once(),
        );
        assert_eq!(guard.name(), "mock");
        let out = call(guard).await.unwrap();
        assert_eq!(out[0], 0.01);
    }
}
