//! Reconnection strategies
//!
//! When a supervised connection degrades, the supervisor asks its strategy
//! how long to wait before the next attempt, or whether to give up.
//!
//! # Built-in Strategies
//!
//! - **FixedDelay**: the same delay every time. The default is 5 seconds
//!   with no attempt cap.
//! - **ExponentialBackoff**: doubling delays with an upper bound and optional
//!   jitter
//! - **NoReconnect**: never reconnect
//!
//! Each supervised handle gets its own copy of the configured strategy, so
//! one flapping feed does not push back the retries of another.
//!
//! # Examples
//!
//! ```rust
//! use livefeed_client::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let mut flat = FixedDelay::default();
//! assert_eq!(flat.next_delay(0), Some(Duration::from_secs(5)));
//! assert_eq!(flat.next_delay(40), Some(Duration::from_secs(5)));
//!
//! let capped = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60))
//!     .with_max_attempts(8)
//!     .with_jitter();
//! ```

use std::time::Duration;

/// Delay used between attempts when nothing else is configured
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Decides the delay before each reconnection attempt
///
/// `next_delay` is called with a 0-based attempt number that counts degraded
/// episodes since the connection was last live. `reset` is called when the
/// connection reaches live again.
pub trait ReconnectionStrategy: Send + Sync {
    /// `Some(delay)` to retry after `delay`, `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    fn reset(&mut self);
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
            current_attempt: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random extra delay
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
            .with_max_attempts(10)
            .with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        // min_delay * 2^attempt, saturating well before the cap matters
        let factor = 2u64.saturating_pow(attempt.min(32));
        let base = (self.min_delay.as_millis() as u64).saturating_mul(factor);
        let delay = base.min(self.max_delay.as_millis() as u64);

        if self.jitter && delay >= 4 {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Some(Duration::from_millis(delay + jitter_ms));
        }

        Some(Duration::from_millis(delay))
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Fixed delay between attempts
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

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
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

/// Never reconnect; a degraded feed stays degraded
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}
