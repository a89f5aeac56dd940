//! Reconnect policies for the supervisor
//!
//! After every disconnect the supervisor asks its strategy how long to wait
//! before opening the next session. Returning `None` ends the monitoring task.
//!
//! - **FixedDelay** (default): the same delay every time, forever unless capped
//! - **ExponentialBackoff**: doubling delays between a floor and a ceiling
//! - **NoReconnect**: run one session only
//!
//! The attempt counter passed to `next_delay` restarts from zero once a
//! session reaches the Live state, and `reset()` is called at that point.
//!
//! # Examples
//!
//! ```rust
//! use hassmon_client::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let mut fixed = FixedDelay::default();
//! assert_eq!(fixed.next_delay(1_000), Some(Duration::from_secs(5)));
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60))
//!     .with_jitter();
//! assert!(backoff.next_delay(0).is_some());
//! ```

use std::time::Duration;

/// Delay the supervisor waits between sessions unless configured otherwise
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Decides whether and when to open the next session
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before attempt number `attempt` (0-based), or `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Forget accumulated state after a session reached Live
    fn reset(&mut self);
}

/// Constant delay between sessions
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` consecutive failed sessions
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    /// Five seconds, unbounded
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }

    fn reset(&mut self) {}
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random delay so many monitors do not reconnect in lockstep
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    /// 1 s doubling up to 60 s, jittered, unbounded
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60)).with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let base_ms = (self.min_delay.as_millis() as u64).saturating_mul(factor);
        let delay_ms = base_ms.min(self.max_delay.as_millis() as u64);

        if self.jitter && delay_ms >= 4 {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay_ms / 4));
            return Some(Duration::from_millis(delay_ms + jitter_ms));
        }

        Some(Duration::from_millis(delay_ms))
    }

    fn reset(&mut self) {}
}

/// Never reconnect: the monitoring task ends with the first session
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}
