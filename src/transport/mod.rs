//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait. Network transports are hidden behind feature flags
//! and exposed only through constructor functions or the
//! [`TransportBuilder`](crate::TransportBuilder).
//!
//! Domain code must not depend on transport-specific types.

mod memory;

#[cfg(feature = "transport_websocket")]
mod websocket;

pub use memory::{create_memory_pair, create_memory_transport, MemoryRemote};

#[cfg(feature = "transport_websocket")]
pub(crate) use websocket::{create_transport as create_websocket_transport, WebSocketConfig};
