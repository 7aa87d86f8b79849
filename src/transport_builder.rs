//! Transport builder for creating WebSocket transports.
//!
//! Provides a fluent builder API for constructing transports with clear separation
//! between required and optional configuration.

use crate::{ReconnectPolicy, Result, RpcError, TransportPtr, PROTOO_SUBPROTOCOL};

/// Builder for creating WebSocket transport instances.
///
/// # Examples
///
/// ## Defaults (protoo subprotocol, default reconnect policy)
/// ```no_run
/// use protoo_peer::TransportBuilder;
///
/// # fn example() -> protoo_peer::Result<()> {
/// let transport = TransportBuilder::new()
///     .url("wss://media.example.com:4443/?roomId=lobby&peerId=alice")
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Custom reconnection
/// ```no_run
/// use protoo_peer::{ReconnectPolicy, TransportBuilder};
/// use std::time::Duration;
///
/// # fn example() -> protoo_peer::Result<()> {
/// let transport = TransportBuilder::new()
///     .url("ws://127.0.0.1:4443")
///     .reconnect(ReconnectPolicy {
///         max_attempts: 3,
///         multiplier: 1.5,
///         initial_delay: Duration::from_millis(200),
///         max_delay: Duration::from_secs(2),
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransportBuilder {
    url: Option<String>,
    subprotocol: Option<String>,
    reconnect: Option<ReconnectPolicy>,
    no_reconnect: bool,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self {
            url: None,
            subprotocol: None,
            reconnect: None,
            no_reconnect: false,
        }
    }

    /// Set the server URL (required). Must use the `ws` or `wss` scheme.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Override the negotiated subprotocol.
    ///
    /// Default: `"protoo"`.
    pub fn subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }

    /// Set the reconnection policy.
    ///
    /// Default: [`ReconnectPolicy::default()`].
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Never reconnect: the first failure or lost connection closes the
    /// transport.
    pub fn no_reconnect(mut self) -> Self {
        self.no_reconnect = true;
        self
    }

    /// Validate the configuration without building anything.
    fn validate(&self) -> Result<(String, String, Option<ReconnectPolicy>)> {
        // ---
        let url = self
            .url
            .clone()
            .ok_or_else(|| RpcError::InvalidConfig("url is required".into()))?;

        let scheme = url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("ws") | Some("wss")) {
            return Err(RpcError::InvalidConfig(format!(
                "unsupported url: {url}, expected ws:// or wss://"
            )));
        }

        let subprotocol = self
            .subprotocol
            .clone()
            .unwrap_or_else(|| PROTOO_SUBPROTOCOL.to_string());
        if subprotocol.is_empty() {
            return Err(RpcError::InvalidConfig("subprotocol must not be empty".into()));
        }

        if self.no_reconnect && self.reconnect.is_some() {
            return Err(RpcError::InvalidConfig(
                "cannot use both reconnect() and no_reconnect()".into(),
            ));
        }

        let reconnect = if self.no_reconnect {
            None
        } else {
            Some(self.reconnect.clone().unwrap_or_default())
        };

        Ok((url, subprotocol, reconnect))
    }

    /// Build the transport (consumes self). Nothing connects until the peer
    /// calls `connect()`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if:
    /// - `url` is missing or not a `ws`/`wss` URL
    /// - the subprotocol is empty
    /// - both `reconnect()` and `no_reconnect()` were called
    #[cfg(feature = "transport_websocket")]
    pub fn build(self) -> Result<TransportPtr> {
        // ---
        let (url, subprotocol, reconnect) = self.validate()?;
        Ok(crate::transport::create_websocket_transport(
            crate::transport::WebSocketConfig {
                url,
                subprotocol,
                reconnect,
            },
        ))
    }

    /// Build the transport (consumes self).
    ///
    /// Without the `transport_websocket` feature there is nothing to build.
    #[cfg(not(feature = "transport_websocket"))]
    pub fn build(self) -> Result<TransportPtr> {
        // ---
        self.validate()?;
        Err(RpcError::InvalidConfig(
            "websocket transport not enabled (feature `transport_websocket`)".into(),
        ))
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_url_is_required() {
        // ---
        let err = TransportBuilder::new().validate().unwrap_err();
        assert!(matches!(err, RpcError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_non_websocket_scheme() {
        // ---
        for url in ["http://localhost", "mqtt://localhost:1883", "localhost:80"] {
            let err = TransportBuilder::new().url(url).validate().unwrap_err();
            assert!(matches!(err, RpcError::InvalidConfig(_)), "{url}");
        }
    }

    #[test]
    fn test_defaults() {
        // ---
        let (url, subprotocol, reconnect) = TransportBuilder::new()
            .url("wss://example.com/?peerId=a")
            .validate()
            .unwrap();
        assert_eq!(url, "wss://example.com/?peerId=a");
        assert_eq!(subprotocol, "protoo");
        assert_eq!(reconnect.unwrap().max_attempts, 10);
    }

    #[test]
    fn test_no_reconnect() {
        // ---
        let (_, _, reconnect) = TransportBuilder::new()
            .url("ws://127.0.0.1:1")
            .no_reconnect()
            .validate()
            .unwrap();
        assert!(reconnect.is_none());
    }

    #[test]
    fn test_conflicting_reconnect_settings() {
        // ---
        let err = TransportBuilder::new()
            .url("ws://127.0.0.1:1")
            .no_reconnect()
            .reconnect(ReconnectPolicy::default())
            .validate()
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidConfig(_)));
    }
}
