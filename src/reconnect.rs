//! Reconnection policy and exponential backoff.
//!
//! This module provides the [`ReconnectPolicy`] type and the [`Backoff`]
//! schedule used by connection-oriented transports to recover from a failed
//! connection attempt or a lost connection.
//!
//! # Strategy
//!
//! - Uses exponential backoff with randomized jitter to prevent thundering herd
//! - Caps delay at `max_delay` to prevent excessive wait times
//! - A successful connection resets the schedule

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::time::Duration;

/// Reconnection settings with exponential backoff.
///
/// # Example
///
/// ```
/// use protoo_peer::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy {
///     max_attempts: 5,
///     multiplier: 2.0,
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(10),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of consecutive reconnection attempts
    /// (0 = give up after the first failure).
    pub max_attempts: u32,

    /// Backoff multiplier applied to the delay after each attempt.
    ///
    /// Example: 2.0 doubles the delay each time (exponential backoff).
    pub multiplier: f32,

    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,

    /// Maximum delay between attempts (caps exponential growth).
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    /// Reasonable default reconnection policy.
    ///
    /// - `max_attempts`: 10
    /// - `multiplier`: 2.0 (exponential backoff)
    /// - `initial_delay`: 500ms
    /// - `max_delay`: 10s
    ///
    /// The default is bounded: after 10 consecutive failures the transport
    /// gives up and closes. Set `max_attempts` to `u32::MAX` to keep retrying
    /// for as long as the process runs.
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 10,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Backoff schedule derived from an optional [`ReconnectPolicy`].
///
/// # Backoff Algorithm
///
/// - First attempt: `initial_delay` (with jitter)
/// - Subsequent attempts: `min(current_delay * multiplier, max_delay)` (with jitter)
/// - Jitter: ±25% randomization to prevent synchronized reconnects
///
/// Without a policy the schedule is empty: the first failure is final.
#[derive(Debug, Clone)]
pub struct Backoff {
    // ---
    policy: Option<ReconnectPolicy>,
    attempt: u32,
    current_delay: Duration,
}

impl Backoff {
    /// Create a fresh schedule.
    pub fn new(policy: Option<ReconnectPolicy>) -> Self {
        // ---
        let current_delay = policy
            .as_ref()
            .map(|p| p.initial_delay)
            .unwrap_or_default();
        Self {
            policy,
            attempt: 0,
            current_delay,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        // ---
        let policy = self.policy.as_ref()?;

        if self.attempt >= policy.max_attempts {
            return None;
        }
        self.attempt += 1;

        let delay = apply_jitter(self.current_delay);

        let next =
            Duration::from_secs_f64(self.current_delay.as_secs_f64() * policy.multiplier as f64);
        self.current_delay = next.min(policy.max_delay);

        Some(delay)
    }

    /// Number of attempts handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        // ---
        self.attempt = 0;
        self.current_delay = self
            .policy
            .as_ref()
            .map(|p| p.initial_delay)
            .unwrap_or_default();
    }
}

/// Apply ±25% jitter to a duration to prevent thundering herd.
///
/// Uses a simple multiplicative jitter: `delay * (0.75 + random(0.0..0.5))`
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    let random_state = RandomState::new();
    let hash = random_state.hash_one(std::time::SystemTime::now());

    // Convert to 0.0..1.0 range
    let random_factor = (hash % 1000) as f64 / 1000.0;

    let jitter_multiplier = 0.75 + (random_factor * 0.5);

    Duration::from_secs_f64(delay.as_secs_f64() * jitter_multiplier)
}
