// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! The peer consumes a transport as a capability: it can connect, hand over
//! encoded messages, close, and ask whether the transport is closed. In the
//! other direction the transport reports lifecycle changes and inbound
//! payloads through a [`TransportListener`].
//!
//! Raw framing, reconnection and socket-level concerns belong to the
//! concrete implementations under `src/transport/`; nothing here refers to a
//! specific protocol or library.

use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Subprotocol token negotiated when connecting.
pub const PROTOO_SUBPROTOCOL: &str = "protoo";

/// An event raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established (or re-established).
    Open,

    /// A connection attempt failed while not connected. Not terminal; the
    /// transport may still retry.
    Fail,

    /// One inbound payload, undecoded.
    Message(String),

    /// A previously established connection was lost unexpectedly.
    /// The transport may recover and signal [`Open`](Self::Open) again.
    Disconnected,

    /// The transport is closed for good.
    Close,
}

/// Sink through which a transport reports [`TransportEvent`]s.
///
/// Cheap to clone. Delivery never blocks the transport; events raised after
/// the receiving side went away are discarded.
#[derive(Debug, Clone)]
pub struct TransportListener {
    // ---
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportListener {
    // ---

    /// Create a listener and the receiving end its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report an event. Returns `false` if nobody is listening any more.
    pub fn emit(&self, event: TransportEvent) -> bool {
        // ---
        self.tx.send(event).is_ok()
    }

    pub fn on_open(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    pub fn on_fail(&self) -> bool {
        self.emit(TransportEvent::Fail)
    }

    pub fn on_message(&self, raw: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(raw.into()))
    }

    pub fn on_disconnected(&self) -> bool {
        self.emit(TransportEvent::Disconnected)
    }

    pub fn on_close(&self) -> bool {
        self.emit(TransportEvent::Close)
    }

    /// True once the receiving side has been dropped.
    pub fn is_detached(&self) -> bool {
        // ---
        self.tx.is_closed()
    }
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - `send()` never waits on the network; it queues the payload and
///   returns the number of bytes accepted.
/// - events are delivered to the listener given to `connect()` in the order
///   they happened.
/// - after `close()`, `is_closed()` returns true, `send()` fails with
///   [`RpcError::TransportClosed`](crate::RpcError::TransportClosed) and at
///   most one final [`TransportEvent::Close`] is delivered.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat `connect` and
/// `close` as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Start connecting and register the single listener for this transport.
    ///
    /// Returns once the attempt is under way; the outcome is reported
    /// through the listener (`Open` or `Fail`).
    async fn connect(&self, listener: TransportListener) -> Result<()>;

    /// Hand one encoded message to the transport.
    fn send(&self, message: &str) -> Result<usize>;

    /// Close the transport. Idempotent.
    async fn close(&self) -> Result<()>;

    /// True once the transport is closed for good.
    fn is_closed(&self) -> bool;
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - used to erase concrete transport types behind a stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
