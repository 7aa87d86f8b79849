use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier correlating a request with its response.
///
/// Ids are carried in-band in the `id` field of request and response
/// payloads. Ids generated locally are unique among one peer's outstanding
/// requests; ids received from the remote are echoed back untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    // ---

    /// Wrap a raw id. Returns `None` for zero, which the protocol reserves
    /// as "missing".
    pub fn new(raw: u64) -> Option<Self> {
        // ---
        (raw != 0).then_some(Self(raw))
    }

    /// The numeric value carried on the wire.
    pub fn get(self) -> u64 {
        // ---
        self.0
    }
}

impl fmt::Display for RequestId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        write!(f, "{}", self.0)
    }
}

/// Per-peer source of fresh request ids.
///
/// A monotonically increasing counter starting at 1. Uniqueness holds for
/// the lifetime of the generator without any randomness.
#[derive(Debug)]
pub struct IdGenerator {
    // ---
    next: AtomicU64,
}

impl IdGenerator {
    // ---

    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        // ---
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next id.
    pub fn next_id(&self) -> RequestId {
        // ---
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        // Zero is only reachable after wrapping 2^64 ids.
        RequestId(raw.max(1))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
