use super::RequestId;
use crate::{Result, RpcError};
use serde_json::Value;

/// A request, either received from the remote or about to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub data: Value,
}

/// A fire-and-forget message. Carries no id; no reply is possible.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub data: Value,
}

/// Result carried by a [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// `ok: true`, with the response data.
    Success(Value),

    /// `ok: false`, with the remote's error code and reason.
    Error { code: i64, reason: String },
}

/// A response to a previously sent request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: ResponseOutcome,
}

impl Response {
    // ---

    /// True for a success response.
    pub fn is_ok(&self) -> bool {
        // ---
        matches!(self.outcome, ResponseOutcome::Success(_))
    }

    /// Convert into the value a request's handler receives.
    ///
    /// Error responses become [`RpcError::Remote`] with code and reason
    /// passed through verbatim.
    pub fn into_result(self) -> Result<Value> {
        // ---
        match self.outcome {
            ResponseOutcome::Success(data) => Ok(data),
            ResponseOutcome::Error { code, reason } => Err(RpcError::Remote { code, reason }),
        }
    }
}

/// One protocol message: the closed set of variants exchanged between peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    // ---

    /// Short variant name, for logging.
    pub fn kind(&self) -> &'static str {
        // ---
        match self {
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Notification(_) => "notification",
        }
    }
}
