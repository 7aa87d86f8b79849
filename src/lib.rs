//! Client-side protoo peer.
//!
//! protoo is a minimalist signaling protocol: peers exchange JSON requests,
//! responses and notifications over a message transport, usually a WebSocket
//! negotiated with the `protoo` subprotocol. This crate provides:
//!
//! - the message codec ([`encode_request`], [`decode`], ...),
//! - a [`Peer`] that correlates responses with outstanding requests and
//!   fails them on timeout or close,
//! - the [`Transport`] capability the peer consumes, with an in-memory
//!   implementation and a WebSocket one (feature `transport_websocket`).
//!
//! ```no_run
//! use protoo_peer::{PeerBuilder, PeerEvent, TransportBuilder};
//! use serde_json::json;
//!
//! # async fn example() -> protoo_peer::Result<()> {
//! let transport = TransportBuilder::new()
//!     .url("wss://media.example.com:4443/?roomId=lobby&peerId=alice")
//!     .build()?;
//! let (peer, mut events) = PeerBuilder::new(transport).label("alice").build();
//!
//! while let Some(event) = events.recv().await {
//!     if let PeerEvent::Open = event {
//!         let caps = peer.request("getRouterRtpCapabilities", json!({}))?.await?;
//!         println!("{caps}");
//!         break;
//!     }
//! }
//! peer.close().await;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod config;
mod domain;
mod error;
mod peer;
mod peer_builder;
mod protocol;
mod reconnect;
mod transport;
mod transport_builder;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use peer::{Peer, PeerEvent, PeerEvents, PeerState, Responder, ResponseFuture};
pub use peer_builder::PeerBuilder;

pub use config::{PeerConfig, TimeoutPolicy};
pub use reconnect::{Backoff, ReconnectPolicy};

pub use error::{ParseError, Result, RpcError, TIMEOUT_CODE, TIMEOUT_REASON};

pub use protocol::{
    //
    decode,
    encode_error,
    encode_notification,
    encode_request,
    encode_success,
    IdGenerator,
    Message,
    Notification,
    Request,
    RequestId,
    Response,
    ResponseOutcome,
};

pub use transport::{create_memory_pair, create_memory_transport, MemoryRemote};
pub use transport_builder::TransportBuilder;

// --- public re-exports
pub use domain::{
    //
    Transport,
    TransportEvent,
    TransportListener,
    TransportPtr,
    PROTOO_SUBPROTOCOL,
};
