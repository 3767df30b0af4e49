//! Retry with exponential backoff
//!
//! One retry loop for every external call. The error type decides what is
//! worth retrying through [`RetryClassify`]; everything else fails fast.
//!
//! **Backoff Strategy:**
//! - Attempt 1 runs immediately
//! - Delay before attempt k (k >= 2): `base_delay * 2^(k-2)`, capped at `max_delay`
//! - The final attempt's error propagates unchanged
//!
//! A cancellation token aborts the loop: an in-flight attempt is dropped, a
//! pending backoff sleep is cut short, and no further attempt starts.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Transient-vs-fatal classifier for errors passed through the retry loop
pub trait RetryClassify: std::fmt::Display {
    /// Retrying may change the outcome
    fn is_transient(&self) -> bool;

    /// Error reported when the caller's token is cancelled
    fn cancelled() -> Self;
}

/// Attempt count and backoff timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay slept before `attempt` (1-based); zero for the first attempt
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails fatally, runs out of attempts,
/// or `cancel` fires
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "fetch call metadata")
/// * `policy` - Attempt count and backoff timing
/// * `cancel` - Caller's cancellation token
/// * `operation` - Closure producing one attempt
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify,
{
    let max_attempts = policy.max_attempts.max(1);
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(E::cancelled());
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(E::cancelled()),
            outcome = operation() => outcome,
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if !err.is_transient() {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Non-transient failure, not retrying"
                    );
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Operation failed: retry attempts exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_before_attempt(attempt + 1);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, will retry after backoff"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(E::cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Timeout,
        NotFound,
        Cancelled,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl RetryClassify for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Timeout)
        }

        fn cancelled() -> Self {
            TestError::Cancelled
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(100))
    }

    #[test]
    fn test_delay_schedule_doubles() {
        let policy = policy(4);
        assert_eq!(policy.delay_before_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_before_attempt(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before_attempt(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before_attempt(4), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_before_attempt(9), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let token = CancellationToken::new();
        let result = retry_with_backoff("test_op", &policy(3), &token, || async {
            Ok::<i32, TestError>(42)
        })
        .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_then_success_uses_increasing_delays() {
        let token = CancellationToken::new();
        let attempt_times = Arc::new(Mutex::new(Vec::new()));
        let times = attempt_times.clone();

        let result = retry_with_backoff("test_op", &policy(3), &token, || {
            let times = times.clone();
            async move {
                let mut times = times.lock().unwrap();
                times.push(tokio::time::Instant::now());
                if times.len() < 3 {
                    Err(TestError::Timeout)
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));

        let times = attempt_times.lock().unwrap();
        assert_eq!(times.len(), 3);
        let delays: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(delays.len(), 2, "exactly N-1 delays");
        assert!(delays[0] >= Duration::from_millis(100));
        assert!(delays[1] >= Duration::from_millis(200));
        assert!(delays[1] > delays[0], "delays strictly increase");
    }

    #[tokio::test]
    async fn test_not_found_never_retries() {
        let token = CancellationToken::new();
        let mut attempts = 0;

        let result = retry_with_backoff("test_op", &policy(5), &token, || {
            attempts += 1;
            async { Err::<i32, TestError>(TestError::NotFound) }
        })
        .await;

        assert_eq!(result, Err(TestError::NotFound));
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_error_propagates_unchanged() {
        let token = CancellationToken::new();
        let mut attempts = 0;

        let result = retry_with_backoff("test_op", &policy(2), &token, || {
            attempts += 1;
            async { Err::<i32, TestError>(TestError::Timeout) }
        })
        .await;

        assert_eq!(result, Err(TestError::Timeout));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let mut attempts = 0;

        let result = retry_with_backoff("test_op", &policy(3), &token, || {
            attempts += 1;
            async { Ok::<i32, TestError>(1) }
        })
        .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let token = CancellationToken::new();
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();
        let canceller = token.clone();

        let slow_policy = RetryPolicy::new(5, Duration::from_secs(60));
        let handle = tokio::spawn(async move {
            retry_with_backoff("test_op", &slow_policy, &canceller, || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<i32, TestError>(TestError::Timeout)
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }
}
