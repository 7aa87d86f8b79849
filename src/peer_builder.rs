//! Peer builder.
//!
//! Provides a fluent builder API for configuring a [`Peer`] over a transport.

use crate::{Peer, PeerConfig, PeerEvents, TimeoutPolicy, TransportPtr};

/// Builder for creating peers.
///
/// # Examples
///
/// ```no_run
/// use protoo_peer::{PeerBuilder, TransportBuilder};
///
/// # async fn example() -> protoo_peer::Result<()> {
/// let transport = TransportBuilder::new()
///     .url("wss://media.example.com:4443/?roomId=lobby&peerId=alice")
///     .build()?;
///
/// let (peer, mut events) = PeerBuilder::new(transport)
///     .label("alice")
///     .timeout_factor_ms(500.0)
///     .build();
/// # Ok(())
/// # }
/// ```
pub struct PeerBuilder {
    // ---
    transport: TransportPtr,
    label: Option<String>,

    // Timeout formula parts (all optional)
    timeout_factor_ms: Option<f64>,
    timeout_base: Option<f64>,
    timeout_per_byte: Option<f64>,
}

impl PeerBuilder {
    /// Create a new peer builder over `transport`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            label: None,
            timeout_factor_ms: None,
            timeout_base: None,
            timeout_per_byte: None,
        }
    }

    /// Label prefixed to every log line of this peer.
    ///
    /// Default: `"peer"`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Milliseconds per timeout unit.
    ///
    /// Default: 1500.
    pub fn timeout_factor_ms(mut self, factor_ms: f64) -> Self {
        self.timeout_factor_ms = Some(factor_ms);
        self
    }

    /// Timeout units granted regardless of request size.
    ///
    /// Default: 15.
    pub fn timeout_base(mut self, base: f64) -> Self {
        self.timeout_base = Some(base);
        self
    }

    /// Timeout units added per encoded byte.
    ///
    /// Default: 0.1.
    pub fn timeout_per_byte(mut self, per_byte: f64) -> Self {
        self.timeout_per_byte = Some(per_byte);
        self
    }

    fn config(&self) -> PeerConfig {
        // ---
        let defaults = TimeoutPolicy::default();
        let timeout = TimeoutPolicy {
            factor_ms: self.timeout_factor_ms.unwrap_or(defaults.factor_ms),
            base: self.timeout_base.unwrap_or(defaults.base),
            per_byte: self.timeout_per_byte.unwrap_or(defaults.per_byte),
        };

        match &self.label {
            Some(label) => PeerConfig::new(label.clone()),
            None => PeerConfig::default(),
        }
        .with_timeout(timeout)
    }

    /// Build the peer (consumes self) and start connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> (Peer, PeerEvents) {
        // ---
        let config = self.config();
        Peer::new(self.transport, config)
    }
}
