//! Timeout and retry wrapper for upstream calls
//!
//! Every network call to a catalog source goes through [`retry_with_timeout`]:
//! each attempt gets a hard deadline, and only failures that may succeed on a
//! second try (transport errors, timeouts, 5xx) are retried. A response that
//! arrives but carries nothing useful is the caller's business, not ours.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Upper bound for any computed backoff delay (in milliseconds)
const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Delay policy between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    ExponentialBackoff {
        base_delay: Duration,
        max_delay: Duration,
    },
    /// Retry with fixed delay
    FixedDelay { delay: Duration },
    /// Retry immediately
    Immediate,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::FixedDelay {
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryStrategy {
    /// Calculate delay before the attempt following `attempt` (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::ExponentialBackoff {
                base_delay,
                max_delay,
            } => {
                let exponent = attempt.saturating_sub(1).min(16);
                let exponential_delay = (base_delay.as_millis() as u64).saturating_mul(1 << exponent);
                let capped_delay = exponential_delay
                    .min(max_delay.as_millis() as u64)
                    .min(MAX_RETRY_DELAY_MS);
                Duration::from_millis(capped_delay)
            }
            Self::FixedDelay { delay } => *delay,
            Self::Immediate => Duration::ZERO,
        }
    }
}

/// Bounds for one wrapped call: per-attempt timeout plus retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Hard deadline for each attempt
    pub attempt_timeout: Duration,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay between attempts
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(8),
            max_retries: 1,
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt with the given timeout.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            max_retries: 0,
            strategy: RetryStrategy::Immediate,
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Longest time a wrapped call can take before it settles.
    pub fn worst_case_duration(&self) -> Duration {
        let mut total = self.attempt_timeout * self.max_attempts();
        for attempt in 1..=self.max_retries {
            total += self.strategy.calculate_delay(attempt);
        }
        total
    }
}

/// Classifies errors into ones worth another attempt and ones that are not.
pub trait Retryable {
    /// Returns true if repeating the call may succeed.
    fn is_retryable(&self) -> bool;
}

/// Why a single attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E> {
    /// The attempt was abandoned at its deadline
    #[error("attempt timed out after {}ms", after.as_millis())]
    TimedOut { after: Duration },
    /// The wrapped operation returned an error
    #[error("{0}")]
    Failed(E),
}

impl<E: Retryable> Retryable for AttemptError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::TimedOut { .. } => true,
            AttemptError::Failed(e) => e.is_retryable(),
        }
    }
}

impl<E> AttemptError<E> {
    /// Returns the operation error, if the attempt did not time out.
    pub fn failure(&self) -> Option<&E> {
        match self {
            AttemptError::Failed(e) => Some(e),
            AttemptError::TimedOut { .. } => None,
        }
    }
}

/// Successful result with the bookkeeping of how it was obtained.
#[derive(Debug, Clone)]
pub struct Settled<T> {
    /// Value returned by the successful attempt
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Wall-clock latency of the successful attempt
    pub latency: Duration,
}

/// Terminal failure: the retry budget is spent or the error was not retryable.
///
/// Callers must not retry this again; the budget has been applied.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts made before giving up
    pub attempts: u32,
    /// Wall-clock latency of the final attempt
    pub latency: Duration,
    /// Error of the final attempt
    pub last: AttemptError<E>,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempt(s): {}", self.attempts, self.last)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Runs `operation` under `policy`.
///
/// The closure receives the 1-based attempt number. Each attempt is raced
/// against `policy.attempt_timeout`; a timed-out attempt is dropped. Retries
/// happen only when [`Retryable::is_retryable`] says so and the budget
/// allows it.
///
/// # Errors
///
/// - `RetryExhausted` - The last attempt failed or timed out and no retry
///   remains, or the failure was not retryable
pub async fn retry_with_timeout<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<Settled<T>, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        let started = Instant::now();

        let error = match tokio::time::timeout(policy.attempt_timeout, operation(attempt)).await {
            Ok(Ok(value)) => {
                return Ok(Settled {
                    value,
                    attempts: attempt,
                    latency: started.elapsed(),
                });
            }
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut {
                after: policy.attempt_timeout,
            },
        };
        let latency = started.elapsed();

        if !error.is_retryable() || attempt > policy.max_retries {
            tracing::debug!(
                label,
                attempt,
                latency_ms = latency.as_millis() as u64,
                error = %error,
                "Giving up on call"
            );
            return Err(RetryExhausted {
                attempts: attempt,
                latency,
                last: error,
            });
        }

        let delay = policy.strategy.calculate_delay(attempt);
        tracing::debug!(
            label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
