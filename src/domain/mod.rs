//! Domain layer public interface.
//!
//! This module defines the transport capability the peer consumes,
//! independent of any concrete socket library.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    Transport,
    TransportEvent,
    TransportListener,
    TransportPtr,
    PROTOO_SUBPROTOCOL,
};
