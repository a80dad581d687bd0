//! Reconnect policies for the hub's automatic reconnection
//!
//! When an established connection drops, the hub consults its policy to
//! decide how long to wait before the next reconnect attempt, or whether to
//! give up and close. This is separate from the retry executor in
//! [`crate::retry`], which governs the initial `start()` and each `invoke()`.
//!
//! # Built-in Policies
//!
//! - **DefaultReconnectPolicy**: 0 s, 2 s, 10 s, 30 s, then give up
//! - **ExponentialBackoff**: Exponentially increasing delays
//! - **FixedDelay**: Constant delay between attempts
//! - **NoReconnect**: Never reconnect
//!
//! # Examples
//!
//! ```rust
//! use tablehub_client::{DefaultReconnectPolicy, ExponentialBackoff};
//! use std::time::Duration;
//!
//! let default = DefaultReconnectPolicy::default();
//!
//! // 1s to 60s, at most 20 attempts, with jitter
//! let custom = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60))
//!     .with_max_attempts(20)
//!     .with_jitter();
//! ```

use std::time::Duration;
use tablehub_core::Error;

/// What the policy knows about the reconnect in progress
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempts already made since the connection was lost (0 before the first)
    pub previous_retry_count: u32,
    /// Time since the connection was lost
    pub elapsed: Duration,
    /// The error that caused the loss, or the last failed attempt
    pub reason: Option<Error>,
}

/// Trait for reconnect policies
///
/// # State Management
///
/// A policy may keep state across attempts. `reset()` is called after a
/// successful reconnect so the next loss starts from scratch.
pub trait ReconnectPolicy: Send + Sync {
    /// Returns the delay before the next reconnect attempt
    ///
    /// - `Some(duration)`: Wait this long, then attempt to reconnect
    /// - `None`: Give up; the connection closes
    fn next_delay(&mut self, context: &RetryContext) -> Option<Duration>;

    /// Reset the policy state after a successful reconnect
    fn reset(&mut self) {}
}

/// Fixed schedule of delays, giving up once it is exhausted
#[derive(Debug, Clone)]
pub struct DefaultReconnectPolicy {
    delays: Vec<Duration>,
}

impl DefaultReconnectPolicy {
    /// Create a policy from an explicit schedule
    pub fn with_delays(delays: Vec<Duration>) -> Self {
        Self { delays }
    }
}

impl Default for DefaultReconnectPolicy {
    fn default() -> Self {
        Self::with_delays(vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ])
    }
}

impl ReconnectPolicy for DefaultReconnectPolicy {
    fn next_delay(&mut self, context: &RetryContext) -> Option<Duration> {
        self.delays.get(context.previous_retry_count as usize).copied()
    }
}

/// Exponential backoff reconnect policy with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
            current_attempt: 0,
        }
    }

    /// Set the maximum number of attempts before giving up
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Enable jitter to prevent thundering herd
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
            .with_max_attempts(10)
            .with_jitter()
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&mut self, context: &RetryContext) -> Option<Duration> {
        let attempt = context.previous_retry_count;
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        // min_delay * 2^attempt, capped at max_delay
        let base_delay = (self.min_delay.as_millis() as u64)
            .saturating_mul(2u64.saturating_pow(attempt));
        let delay = std::cmp::min(base_delay, self.max_delay.as_millis() as u64);

        let mut final_delay = Duration::from_millis(delay);

        // Random 0-25% of delay
        if self.jitter {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            final_delay = Duration::from_millis(delay + jitter_ms);
        }

        Some(final_delay)
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Fixed delay reconnect policy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a new fixed delay policy
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Set the maximum number of attempts before giving up
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&mut self, context: &RetryContext) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if context.previous_retry_count >= max {
                return None;
            }
        }
        Some(self.delay)
    }
}

/// Policy that never reconnects
#[derive(Debug, Clone, Copy)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&mut self, _context: &RetryContext) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(previous_retry_count: u32) -> RetryContext {
        RetryContext {
            previous_retry_count,
            elapsed: Duration::ZERO,
            reason: None,
        }
    }

    #[test]
    fn test_default_policy_schedule() {
        let mut policy = DefaultReconnectPolicy::default();

        assert_eq!(policy.next_delay(&attempt(0)), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(&attempt(1)), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(&attempt(2)), Some(Duration::from_secs(10)));
        assert_eq!(policy.next_delay(&attempt(3)), Some(Duration::from_secs(30)));
        assert_eq!(policy.next_delay(&attempt(4)), None);
    }

    #[test]
    fn test_exponential_backoff_basic() {
        let mut policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_attempts(5);

        assert_eq!(policy.next_delay(&attempt(0)), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(&attempt(1)), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(&attempt(2)), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_exponential_backoff_max_delay() {
        let mut policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(policy.next_delay(&attempt(10)), Some(Duration::from_millis(1000)));
        // Large attempt counts saturate instead of overflowing
        assert_eq!(policy.next_delay(&attempt(200)), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_exponential_backoff_max_attempts() {
        let mut policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_attempts(3);

        assert!(policy.next_delay(&attempt(0)).is_some());
        assert!(policy.next_delay(&attempt(1)).is_some());
        assert!(policy.next_delay(&attempt(2)).is_some());
        assert!(policy.next_delay(&attempt(3)).is_none());
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        policy.next_delay(&attempt(5));
        assert_eq!(policy.current_attempt, 5);

        policy.reset();
        assert_eq!(policy.current_attempt, 0);
    }

    #[test]
    fn test_exponential_backoff_jitter() {
        let mut policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter();

        let delay = policy.next_delay(&attempt(0)).unwrap();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }

    #[test]
    fn test_fixed_delay() {
        let mut policy = FixedDelay::new(Duration::from_secs(1)).with_max_attempts(3);

        assert_eq!(policy.next_delay(&attempt(0)), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(&attempt(2)), Some(Duration::from_secs(1)));
        assert!(policy.next_delay(&attempt(3)).is_none());
    }

    #[test]
    fn test_no_reconnect() {
        let mut policy = NoReconnect;
        assert!(policy.next_delay(&attempt(0)).is_none());
    }
}
