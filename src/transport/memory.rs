//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, local execution,
//! and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. All other transport implementations are expected to approximate this
//! behavior as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! In particular, the in-memory transport establishes the following expectations:
//!
//! - `connect()` reports `Open` immediately.
//! - `send()` never waits; payloads reach the other side in send order.
//! - After `close()`, `send()` fails with `TransportClosed` and exactly one
//!   `Close` event has been delivered.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate socket framing, latency or
//! partial writes. Failure modes are raised explicitly through
//! [`MemoryRemote`], never spontaneously.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use tokio::sync::mpsc;

use crate::{
    // ---
    log_debug,
    Result,
    RpcError,
    Transport,
    TransportEvent,
    TransportListener,
    TransportPtr,
};

/// Where a memory transport delivers what it sends.
enum Outbound {
    /// Frames are queued for a [`MemoryRemote`].
    Remote(mpsc::UnboundedSender<String>),

    /// Frames are delivered to the other half of a pair.
    Linked(OnceLock<Weak<MemoryInner>>),
}

#[derive(Default)]
struct MemoryState {
    // ---
    listener: Option<TransportListener>,
    closed: bool,
}

struct MemoryInner {
    // ---
    name: String,
    outbound: Outbound,
    state: Mutex<MemoryState>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryInner {
    // ---

    fn new(name: impl Into<String>, outbound: Outbound) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            outbound,
            state: Mutex::new(MemoryState::default()),
        })
    }

    /// Deliver an event to the registered listener.
    ///
    /// Returns `false` when the transport is closed or nobody connected yet.
    fn deliver(&self, event: TransportEvent) -> bool {
        // ---
        let state = lock(&self.state);
        if state.closed {
            return false;
        }
        match &state.listener {
            Some(listener) => listener.emit(event),
            None => false,
        }
    }

    /// Close once, delivering the single final `Close` event.
    fn shut(&self) -> bool {
        // ---
        let listener = {
            let mut state = lock(&self.state);
            if state.closed {
                return false;
            }
            state.closed = true;
            state.listener.take()
        };

        log_debug!("{}: memory transport closed", self.name);

        if let Some(listener) = listener {
            listener.on_close();
        }
        true
    }

    fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

/// In-memory transport.
///
/// Either paired with a [`MemoryRemote`] that plays the server, or linked back
/// to back with another memory transport (see [`create_memory_pair`]).
struct MemoryTransport {
    // ---
    inner: Arc<MemoryInner>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---

    async fn connect(&self, listener: TransportListener) -> Result<()> {
        // ---
        {
            let mut state = lock(&self.inner.state);
            if state.closed {
                return Err(RpcError::TransportClosed);
            }
            state.listener = Some(listener.clone());
        }

        log_debug!("{}: memory transport open", self.inner.name);
        listener.on_open();
        Ok(())
    }

    fn send(&self, message: &str) -> Result<usize> {
        // ---
        if self.inner.is_closed() {
            return Err(RpcError::TransportClosed);
        }

        match &self.inner.outbound {
            Outbound::Remote(tx) => tx
                .send(message.to_owned())
                .map_err(|_| RpcError::Transport("memory remote dropped".into()))?,
            Outbound::Linked(link) => {
                let delivered = link
                    .get()
                    .and_then(Weak::upgrade)
                    .map(|other| other.deliver(TransportEvent::Message(message.to_owned())))
                    .unwrap_or(false);
                if !delivered {
                    return Err(RpcError::Transport("memory link is down".into()));
                }
            }
        }

        Ok(message.len())
    }

    async fn close(&self) -> Result<()> {
        // ---
        if self.inner.shut() {
            // Closing one half of a pair closes the other, like a socket.
            if let Outbound::Linked(link) = &self.inner.outbound {
                if let Some(other) = link.get().and_then(Weak::upgrade) {
                    other.shut();
                }
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// The far end of a transport created by [`create_memory_transport`].
///
/// Reads what the local side sent and drives everything the local side can
/// observe: inbound messages and lifecycle events.
///
/// # ⚠️  Testing Only
///
/// Intended for tests and local experimentation.
pub struct MemoryRemote {
    // ---
    inner: Arc<MemoryInner>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl MemoryRemote {
    // ---

    /// Wait for the next frame sent by the local side.
    ///
    /// Returns `None` once the transport is gone and every frame was read.
    pub async fn recv(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Take the next sent frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Deliver a raw inbound payload. Returns `false` if it was not delivered.
    pub fn inject(&self, raw: impl Into<String>) -> bool {
        self.inner.deliver(TransportEvent::Message(raw.into()))
    }

    /// Report the connection as (re-)established.
    pub fn open(&self) -> bool {
        self.inner.deliver(TransportEvent::Open)
    }

    /// Report a failed connection attempt.
    pub fn fail(&self) -> bool {
        self.inner.deliver(TransportEvent::Fail)
    }

    /// Report a lost connection.
    pub fn disconnect(&self) -> bool {
        self.inner.deliver(TransportEvent::Disconnected)
    }

    /// Close from the remote side.
    pub fn close(&self) -> bool {
        self.inner.shut()
    }

    /// True once either side closed the transport.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Create an in-memory transport and the remote end that drives it.
///
/// This transport is always available and requires no external resources.
pub fn create_memory_transport() -> (TransportPtr, MemoryRemote) {
    // ---
    let (tx, rx) = mpsc::unbounded_channel();
    let inner = MemoryInner::new("memory", Outbound::Remote(tx));

    let transport = MemoryTransport {
        inner: inner.clone(),
    };
    let remote = MemoryRemote { inner, sent: rx };

    (Arc::new(transport), remote)
}

/// Create two in-memory transports wired back to back.
///
/// What one sends arrives as a message on the other; closing either closes
/// both.
pub fn create_memory_pair() -> (TransportPtr, TransportPtr) {
    // ---
    let left = MemoryInner::new("memory-left", Outbound::Linked(OnceLock::new()));
    let right = MemoryInner::new("memory-right", Outbound::Linked(OnceLock::new()));

    if let Outbound::Linked(link) = &left.outbound {
        let _ = link.set(Arc::downgrade(&right));
    }
    if let Outbound::Linked(link) = &right.outbound {
        let _ = link.set(Arc::downgrade(&left));
    }

    (
        Arc::new(MemoryTransport { inner: left }),
        Arc::new(MemoryTransport { inner: right }),
    )
}
