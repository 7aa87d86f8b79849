/// Protocol types for protoo messages
///
/// This module defines the three message variants, the request id used to
/// correlate requests with responses, and the JSON codec for the wire form.
mod codec;
mod message;
mod request_id;

pub use codec::{decode, encode_error, encode_notification, encode_request, encode_success};
pub use message::{Message, Notification, Request, Response, ResponseOutcome};
pub use request_id::{IdGenerator, RequestId};
