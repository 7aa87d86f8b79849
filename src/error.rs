use thiserror::Error;

/// Status code reported to a request's handler when no response arrived in time.
pub const TIMEOUT_CODE: i64 = 408;

/// Reason reported alongside [`TIMEOUT_CODE`].
pub const TIMEOUT_REASON: &str = "request timeout";

/// Reasons an inbound payload could not be decoded into a [`Message`](crate::Message).
///
/// Decode failures never leave the dispatcher; the offending payload is
/// logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Payload is not well-formed JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Payload is JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// None of `request`, `response` or `notification` is true.
    #[error("missing request/response/notification field")]
    UnknownKind,

    /// `method` is absent, empty or not a string.
    #[error("missing/invalid method field")]
    InvalidMethod,

    /// `id` is absent, zero or not a positive integer.
    #[error("missing/invalid id field")]
    InvalidId,
}

/// Errors that can occur during peer operations
#[derive(Error, Debug)]
pub enum RpcError {
    /// No response arrived before the request's deadline
    #[error("request timeout")]
    Timeout,

    /// The peer was closed while the request was outstanding, or an
    /// operation was attempted on a closed peer
    #[error("peer closed")]
    PeerClosed,

    /// The remote peer answered with an error response
    #[error("remote error {code}: {reason}")]
    Remote { code: i64, reason: String },

    /// The transport has been closed and refuses further frames
    #[error("transport closed")]
    TransportClosed,

    /// Any other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound payload could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// JSON serialization or deserialization of a payload failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A builder was given an unusable configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// Protocol-level error code, when the error carries one.
    ///
    /// Timeouts report [`TIMEOUT_CODE`]; remote rejections report the code
    /// the remote sent.
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Timeout => Some(TIMEOUT_CODE),
            RpcError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Protocol-level error reason, paired with [`code`](Self::code).
    pub fn reason(&self) -> Option<&str> {
        match self {
            RpcError::Timeout => Some(TIMEOUT_REASON),
            RpcError::Remote { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Result type alias for peer operations
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_timeout_code_and_reason() {
        // ---
        let err = RpcError::Timeout;
        assert_eq!(err.code(), Some(408));
        assert_eq!(err.reason(), Some("request timeout"));
    }

    #[test]
    fn test_remote_passes_through_verbatim() {
        // ---
        let err = RpcError::Remote {
            code: 1,
            reason: "test error code".into(),
        };
        assert_eq!(err.code(), Some(1));
        assert_eq!(err.reason(), Some("test error code"));
    }

    #[test]
    fn test_closed_has_no_code() {
        // ---
        assert_eq!(RpcError::PeerClosed.code(), None);
        assert_eq!(RpcError::PeerClosed.reason(), None);
    }
}
