//! Bounded retry with exponential backoff
//!
//! [`retry`] wraps any fallible async operation: it re-runs the operation
//! after a growing delay until it succeeds, the policy's retry budget is
//! spent, or the policy's `should_retry` predicate rejects the error. The
//! connection manager uses it around `start()` and the invocation facade
//! around every remote call.
//!
//! Retrying suspends only the calling task; other tasks keep running while
//! it sleeps. There is no jitter, so with a fixed clock the schedule is
//! deterministic: the delay before the k-th retry is
//! `initial_delay * backoff_multiplier^(k-1)`.
//!
//! [`is_retryable`] is the transient-failure classifier both callers pass as
//! `should_retry`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::retry::{is_retryable, retry, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example(hub: std::sync::Arc<dyn tablehub_client::Hub>) -> tablehub_core::Result<()> {
//! let policy = RetryPolicy::new(3, Duration::from_millis(500), 2.0).with_should_retry(is_retryable);
//! retry(|| hub.start(), &policy).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tablehub_core::Error;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Lower-case markers of transient failures
pub const RETRYABLE_MARKERS: [&str; 10] = [
    "network",
    "timeout",
    "connection",
    "transport",
    "server",
    "temporary",
    "503",
    "502",
    "504",
    "failed to start",
];

/// Whether an error looks transient and is worth retrying
///
/// Matches the lower-cased display message against [`RETRYABLE_MARKERS`].
pub fn is_retryable<E: fmt::Display + ?Sized>(error: &E) -> bool {
    is_retryable_message(&error.to_string())
}

/// [`is_retryable`] on a bare message
pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Predicate deciding whether a failure should be retried
pub type ShouldRetry<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry configuration
///
/// A plain value: each retried operation reads its own copy and nothing is
/// shared between runs.
pub struct RetryPolicy<E = Error> {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the delay after every retry (must be > 1)
    pub backoff_multiplier: f64,
    should_retry: ShouldRetry<E>,
}

impl<E> RetryPolicy<E> {
    /// Create a policy that retries every failure
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier,
            should_retry: Arc::new(|_: &E| true),
        }
    }

    /// Only retry failures accepted by `predicate`
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Evaluate the retry predicate
    pub fn should_retry(&self, error: &E) -> bool {
        (self.should_retry)(error)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        scaled(self.initial_delay, self.backoff_multiplier.powi(exponent))
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            DEFAULT_INITIAL_DELAY,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            backoff_multiplier: self.backoff_multiplier,
            should_retry: Arc::clone(&self.should_retry),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish_non_exhaustive()
    }
}

/// `delay * factor`, saturating at `Duration::MAX` instead of panicking
fn scaled(delay: Duration, factor: f64) -> Duration {
    let secs = delay.as_secs_f64() * factor;
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// Run `operation` under `policy`, sleeping on the tokio timer
///
/// # Errors
///
/// Returns the last error once the budget is spent, or the first error the
/// policy refuses to retry.
pub async fn retry<T, E, F, Fut>(operation: F, policy: &RetryPolicy<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_with_sleep(operation, policy, tokio::time::sleep).await
}

/// [`retry`] with an injected sleep function
///
/// Tests pass a recording sleep to observe the backoff schedule without
/// waiting on a clock.
pub async fn retry_with_sleep<T, E, F, Fut, S, SleepFut>(
    mut operation: F,
    policy: &RetryPolicy<E>,
    mut sleep: S,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    S: FnMut(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
    E: fmt::Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_retries || !policy.should_retry(&error) {
                    return Err(error);
                }

                attempt += 1;
                tracing::debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                delay = scaled(delay, policy.backoff_multiplier);
            }
        }
    }
}
