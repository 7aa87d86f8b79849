//! Peer configuration.
//!
//! This type intentionally contains no transport-specific concepts.
//! Transport settings live in [`TransportBuilder`](crate::TransportBuilder).

use std::time::Duration;

/// Request timeout policy.
///
/// The deadline of each request grows with the size of its encoded form:
///
/// ```text
/// timeout_ms = factor_ms * (base + per_byte * encoded_len)
/// ```
///
/// The default reproduces the protocol's fixed formula,
/// `1500 * (15 + 0.1 * encoded_len)` milliseconds.
///
/// # Example
///
/// ```
/// use protoo_peer::TimeoutPolicy;
/// use std::time::Duration;
///
/// let policy = TimeoutPolicy::default();
/// assert_eq!(policy.timeout_for(0), Duration::from_millis(22_500));
/// assert_eq!(policy.timeout_for(50), Duration::from_millis(30_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    /// Milliseconds per unit.
    pub factor_ms: f64,

    /// Units granted to every request regardless of size.
    pub base: f64,

    /// Units added per encoded byte.
    pub per_byte: f64,
}

impl TimeoutPolicy {
    /// Deadline for a request whose encoded form is `encoded_len` bytes.
    ///
    /// Non-decreasing in `encoded_len` for non-negative parameters.
    pub fn timeout_for(&self, encoded_len: usize) -> Duration {
        // ---
        let units = self.base + self.per_byte * encoded_len as f64;
        let millis = (self.factor_ms * units).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

impl Default for TimeoutPolicy {
    /// The protocol's fixed formula.
    ///
    /// - `factor_ms`: 1500
    /// - `base`: 15
    /// - `per_byte`: 0.1
    fn default() -> Self {
        Self {
            factor_ms: 1500.0,
            base: 15.0,
            per_byte: 0.1,
        }
    }
}

/// Peer configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    // ---
    /// Label used to prefix every log line of this peer.
    pub label: String,

    /// How request deadlines are computed.
    pub timeout: TimeoutPolicy,
}

impl PeerConfig {
    /// Create a config with the given log label and the default timeout policy.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timeout: TimeoutPolicy::default(),
        }
    }

    /// Replace the timeout policy.
    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::new("peer")
    }
}
