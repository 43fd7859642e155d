//! Envelope types exchanged between endpoints.
//!
//! Every message is a JSON-RPC-flavored envelope carried on a topic string:
//!
//! ```text
//! request  (syn:<method>)  { "protocolVersion": "2.0", "method", "params", "id"? }
//! response (ack:<method>)  { "protocolVersion": "2.0", "result"? | "error"?, "id" }
//! ```
//!
//! A request without an `id` is a notification: the receiver runs the handler
//! for its side effect and never answers. Failures travel as a structured
//! `{ code, message, data }` triple ([`WireError`]); the reserved codes live
//! in [`codes`], everything else passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol version stamped on every envelope.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Reserved wire error codes.
///
/// Reserved codes are negative by convention; application handlers may pick
/// any other code and it reaches the caller unchanged.
pub mod codes {
    /// Handshake or call deadline expired before an answer arrived.
    pub const CONNECT_TIMEOUT: i64 = -32300;
    /// Fallback for handler failures that carry no code of their own.
    pub const APPLICATION_ERROR: i64 = -32500;
    /// No handler is registered for the requested method.
    pub const METHOD_NOT_FOUND: i64 = -32601;

    /// Check whether a code is one of the reserved protocol codes.
    ///
    /// # Example
    ///
    /// ```
    /// use tandem_rpc::protocol::codes;
    ///
    /// assert!(codes::is_reserved(codes::METHOD_NOT_FOUND));
    /// assert!(!codes::is_reserved(-40000));
    /// ```
    #[inline]
    pub fn is_reserved(code: i64) -> bool {
        matches!(code, CONNECT_TIMEOUT | APPLICATION_ERROR | METHOD_NOT_FOUND)
    }
}

/// Correlation id linking a request envelope to its response.
///
/// Freshly generated per call from a v4 UUID and treated as an opaque token
/// on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh globally-unique id.
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured error carried in a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("rpc error {code}: {message}")]
pub struct WireError {
    /// Numeric error code; reserved codes are negative (see [`codes`]).
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Arbitrary extra context; `null` when there is nothing to attach.
    #[serde(default)]
    pub data: Value,
}

impl WireError {
    /// Error with an application-defined code and no extra context.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Attach extra context to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Application error (`-32500`) with the given message.
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(codes::APPLICATION_ERROR, message)
    }

    /// Method-not-found (`-32601`) for an undeliverable topic.
    pub fn method_not_found(topic: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("no handler registered for topic `{topic}`"),
        )
    }

    /// Whether this error uses one of the reserved protocol codes.
    #[inline]
    pub fn is_reserved(&self) -> bool {
        codes::is_reserved(self.code)
    }
}

/// Request envelope emitted on a method's `syn:` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Always [`PROTOCOL_VERSION`].
    pub protocol_version: String,
    /// Target method name.
    pub method: String,
    /// Caller-defined parameter value; `null` when the caller sent none.
    #[serde(default)]
    pub params: Value,
    /// Correlation id; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CallId>,
}

impl RequestEnvelope {
    /// Correlatable request expecting a response under `id`.
    pub fn call(method: impl Into<String>, params: Value, id: CallId) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Fire-and-forget notification: no id, no response expected.
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Whether this request expects no response.
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Response envelope emitted on a method's `ack:` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Always [`PROTOCOL_VERSION`].
    pub protocol_version: String,
    /// Success value; mutually exclusive with `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure value; mutually exclusive with `result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    /// Correlation id echoed from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CallId>,
}

impl ResponseEnvelope {
    /// Successful response carrying `result`.
    pub fn success(id: CallId, result: Value) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    /// Failed response carrying `error`.
    pub fn failure(id: CallId, error: WireError) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        }
    }

    /// Whether this response reports a failure.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Collapse into the caller-facing outcome.
    ///
    /// An error wins when both fields are somehow present; a response with
    /// neither yields `null`, matching a handler that returned nothing.
    pub fn into_outcome(self) -> std::result::Result<Value, WireError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let envelope = RequestEnvelope::call("add", json!([2, 3]), CallId::fresh());
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["protocolVersion"], "2.0");
        assert_eq!(wire["method"], "add");
        assert_eq!(wire["params"], json!([2, 3]));
        assert!(wire["id"].is_string());
    }

    #[test]
    fn test_notification_omits_id() {
        let envelope = RequestEnvelope::notification("ping", Value::Null);
        assert!(envelope.is_notification());

        let wire = serde_json::to_value(&envelope).unwrap();
        assert!(wire.get("id").is_none());
        // Null params still travel; "missing" and "null" are the same thing.
        assert!(wire.get("params").is_some());
    }

    #[test]
    fn test_request_roundtrip() {
        let original = RequestEnvelope::call("echo", json!({"text": "hi"}), CallId::fresh());
        let wire = serde_json::to_value(&original).unwrap();
        let decoded: RequestEnvelope = serde_json::from_value(wire).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_request_tolerates_absent_params() {
        let decoded: RequestEnvelope = serde_json::from_value(json!({
            "protocolVersion": "2.0",
            "method": "ping",
        }))
        .unwrap();
        assert_eq!(decoded.params, Value::Null);
        assert!(decoded.is_notification());
    }

    #[test]
    fn test_success_response_has_no_error_key() {
        let envelope = ResponseEnvelope::success(CallId::fresh(), json!(5));
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["result"], json!(5));
        assert!(wire.get("error").is_none());
        assert!(!envelope.is_error());
    }

    #[test]
    fn test_failure_response_has_no_result_key() {
        let envelope = ResponseEnvelope::failure(CallId::fresh(), WireError::application("boom"));
        let wire = serde_json::to_value(&envelope).unwrap();

        assert!(wire.get("result").is_none());
        assert_eq!(wire["error"]["code"], json!(codes::APPLICATION_ERROR));
        assert!(envelope.is_error());
    }

    #[test]
    fn test_into_outcome() {
        let id = CallId::fresh();
        let ok = ResponseEnvelope::success(id.clone(), json!("fine")).into_outcome();
        assert_eq!(ok.unwrap(), json!("fine"));

        let err = ResponseEnvelope::failure(id.clone(), WireError::new(-40000, "custom"))
            .into_outcome()
            .unwrap_err();
        assert_eq!(err.code, -40000);

        // Neither result nor error collapses to null.
        let empty = ResponseEnvelope {
            protocol_version: PROTOCOL_VERSION.to_string(),
            result: None,
            error: None,
            id: Some(id),
        };
        assert_eq!(empty.into_outcome().unwrap(), Value::Null);
    }

    #[test]
    fn test_wire_error_data_default() {
        let decoded: WireError = serde_json::from_value(json!({
            "code": -32601,
            "message": "nope",
        }))
        .unwrap();
        assert_eq!(decoded.data, Value::Null);
        assert!(decoded.is_reserved());
    }

    #[test]
    fn test_wire_error_display() {
        let error = WireError::method_not_found("syn:missing");
        assert!(error.to_string().contains("-32601"));
        assert!(error.to_string().contains("syn:missing"));
    }

    #[test]
    fn test_call_ids_are_unique() {
        let a = CallId::fresh();
        let b = CallId::fresh();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_reserved_codes() {
        assert_eq!(codes::CONNECT_TIMEOUT, -32300);
        assert_eq!(codes::APPLICATION_ERROR, -32500);
        assert_eq!(codes::METHOD_NOT_FOUND, -32601);
        assert!(codes::is_reserved(codes::CONNECT_TIMEOUT));
        assert!(!codes::is_reserved(0));
    }
}
