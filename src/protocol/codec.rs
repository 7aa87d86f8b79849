//! Message codec.
//!
//! Encoders produce the JSON text sent over the transport, one object per
//! message. The decoder is deliberately lenient about field types (booleans
//! may arrive as `"true"`, ids as numeric strings) and strict about the
//! fields each variant requires. Decode failures are reported as
//! [`ParseError`] and are never fatal to the caller.

use super::{IdGenerator, Message, Notification, Request, RequestId, Response, ResponseOutcome};
use crate::{log_warn, ParseError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Discriminator emitted for notifications by older clients.
const LEGACY_NOTIFICATION_KEY: &str = "onNotification";

#[derive(Serialize)]
struct RequestFrame<'a> {
    request: bool,
    method: &'a str,
    id: RequestId,
    data: &'a Value,
}

#[derive(Serialize)]
struct SuccessFrame<'a> {
    response: bool,
    id: RequestId,
    ok: bool,
    data: &'a Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorFrame<'a> {
    response: bool,
    id: RequestId,
    ok: bool,
    error_code: i64,
    error_reason: &'a str,
}

#[derive(Serialize)]
struct NotificationFrame<'a> {
    notification: bool,
    method: &'a str,
    data: &'a Value,
}

fn data_or_empty(data: Option<Value>) -> Value {
    // ---
    match data {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(data) => data,
    }
}

/// Encode a request with a fresh id taken from `ids`.
///
/// Returns the encoded text together with the id so the caller can register
/// the request before handing the text to the transport.
pub fn encode_request(
    ids: &IdGenerator,
    method: &str,
    data: Option<Value>,
) -> Result<(String, RequestId)> {
    // ---
    let id = ids.next_id();
    let data = data_or_empty(data);
    let encoded = serde_json::to_string(&RequestFrame {
        request: true,
        method,
        id,
        data: &data,
    })?;
    Ok((encoded, id))
}

/// Encode a success response to the request `request_id`.
pub fn encode_success(request_id: RequestId, data: Option<Value>) -> Result<String> {
    // ---
    let data = data_or_empty(data);
    let encoded = serde_json::to_string(&SuccessFrame {
        response: true,
        id: request_id,
        ok: true,
        data: &data,
    })?;
    Ok(encoded)
}

/// Encode an error response to the request `request_id`.
pub fn encode_error(request_id: RequestId, code: i64, reason: &str) -> Result<String> {
    // ---
    let encoded = serde_json::to_string(&ErrorFrame {
        response: true,
        id: request_id,
        ok: false,
        error_code: code,
        error_reason: reason,
    })?;
    Ok(encoded)
}

/// Encode a notification.
pub fn encode_notification(method: &str, data: Option<Value>) -> Result<String> {
    // ---
    let data = data_or_empty(data);
    let encoded = serde_json::to_string(&NotificationFrame {
        notification: true,
        method,
        data: &data,
    })?;
    Ok(encoded)
}

/// Decode one raw payload.
///
/// Discriminators are inspected in the order `request`, `response`,
/// `notification`; the first one that is true selects the variant.
pub fn decode(raw: &str) -> std::result::Result<Message, ParseError> {
    // ---
    let value: Value =
        serde_json::from_str(raw).map_err(|err| ParseError::InvalidJson(err.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(ParseError::NotAnObject);
    };

    if flag(&object, "request") {
        let method = method(&object)?;
        let id = id(&object).ok_or(ParseError::InvalidId)?;
        let data = take_data(&mut object);
        return Ok(Message::Request(Request { id, method, data }));
    }

    if flag(&object, "response") {
        let id = id(&object).ok_or(ParseError::InvalidId)?;
        let outcome = if flag(&object, "ok") {
            ResponseOutcome::Success(take_data(&mut object))
        } else {
            ResponseOutcome::Error {
                code: integer(&object, "errorCode").unwrap_or(0),
                reason: string(&object, "errorReason").unwrap_or_default(),
            }
        };
        return Ok(Message::Response(Response { id, outcome }));
    }

    let legacy = !flag(&object, "notification") && flag(&object, LEGACY_NOTIFICATION_KEY);
    if legacy || flag(&object, "notification") {
        let method = method(&object)?;
        if legacy {
            log_warn!("decode: notification uses legacy `{LEGACY_NOTIFICATION_KEY}` key [method:{method}]");
        }
        let data = take_data(&mut object);
        return Ok(Message::Notification(Notification { method, data }));
    }

    Err(ParseError::UnknownKind)
}

fn flag(object: &Map<String, Value>, key: &str) -> bool {
    // ---
    match object.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn string(object: &Map<String, Value>, key: &str) -> Option<String> {
    // ---
    match object.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn method(object: &Map<String, Value>) -> std::result::Result<String, ParseError> {
    // ---
    string(object, "method")
        .filter(|m| !m.is_empty())
        .ok_or(ParseError::InvalidMethod)
}

fn integer(object: &Map<String, Value>, key: &str) -> Option<i64> {
    // ---
    match object.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn id(object: &Map<String, Value>) -> Option<RequestId> {
    // ---
    let raw = match object.get("id")? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 1.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    RequestId::new(raw)
}

fn take_data(object: &mut Map<String, Value>) -> Value {
    // ---
    data_or_empty(object.remove("data"))
}
