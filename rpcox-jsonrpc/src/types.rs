//! Rust struct definitions that ser/de to/from the messages exchanged over the wire.
//!
//! The protocol borrows the JSON-RPC 2.0 request and success shapes, but deviates where the
//! browser-side clients it interoperates with do: error responses carry no `jsonrpc` or `id`
//! field, and may be a bare message string rather than a `{code, message}` object.  Requests and
//! successes also carry an optional `meta` field that holds the codec metadata describing how to
//! rebuild rich values from the plain JSON in `params` and `result`.
//!
//! Every payload received from the wire must match exactly one of [`is_request`],
//! [`is_success`] or [`is_error`].  [`Envelope::parse`] enforces that.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Re-export the basic JSON-RPC types that are exactly what we would declare ourselves.
pub use jsonrpsee_types::{error::ErrorCode, params::TwoPointZero};
pub use serde_json::Value as JsonValue;

/// The only protocol version this implementation speaks
pub const PROTOCOL_VERSION: &str = "2.0";

/// Failure to make sense of a payload received from the wire.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Payload is not valid JSON")]
    Json { source: serde_json::Error },

    #[error("Payload does not have the shape of any known message")]
    Unrecognized,

    #[error("Payload has the shape of more than one kind of message")]
    Ambiguous,

    #[error("Payload looks like a {kind} message but could not be decoded")]
    Shape {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Correlation id of a request, echoed back in the success response.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric id
    Number(serde_json::Number),
    /// String id
    Str(String),
}

impl Id {
    /// Interpret an arbitrary JSON value as an id.  Only strings and numbers are usable; anything
    /// else is treated as if no id was provided.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(number) => Some(Id::Number(number.clone())),
            JsonValue::String(s) => Some(Id::Str(s.clone())),
            _ => None,
        }
    }

    /// Make a fresh unique id, for requests that arrived without a usable one and for calls
    /// initiated by the client.
    pub fn mint() -> Self {
        Id::Str(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(number) => write!(f, "{number}"),
            Id::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Id::Number(value.into())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Str(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Str(value.to_string())
    }
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<Id>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Id::from_json))
}

/// A method call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// Request ID
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    /// Name of the method to be invoked.
    pub method: String,
    /// Positional parameters, codec-encoded.
    pub params: Vec<JsonValue>,
    /// Codec metadata for `params`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<JsonValue>,
}

impl Request {
    pub fn new(
        id: impl Into<Option<Id>>,
        method: impl Into<String>,
        params: Vec<JsonValue>,
        meta: impl Into<Option<JsonValue>>,
    ) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            id: id.into(),
            method: method.into(),
            params,
            meta: meta.into(),
        }
    }
}

/// The result of a successful method call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Success {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// Echo of the request's id.  Clients tolerate a `null` here.
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<Id>,
    /// Codec-encoded return value
    pub result: JsonValue,
    /// Codec metadata for `result`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<JsonValue>,
    /// Side-channel for transport-level extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<serde_json::Map<String, JsonValue>>,
}

impl Success {
    pub fn new(id: Id, result: JsonValue, meta: impl Into<Option<JsonValue>>) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            id: Some(id),
            result,
            meta: meta.into(),
            ext: None,
        }
    }
}

/// A failed call, or a request that could not be processed at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody::Message(message.into()),
        }
    }

    pub fn structured(code: i64, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody::Structured(ErrorDetails {
                code,
                message: message.into(),
            }),
        }
    }

    /// Structured error using one of the JSON-RPC reserved codes
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::structured(i64::from(code.code()), message)
    }
}

/// Either form an error can take on the wire.
///
/// This is an `untagged` enum so a bare string lands in `Message` and an object in
/// `Structured`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorBody {
    Message(String),
    Structured(ErrorDetails),
}

impl ErrorBody {
    pub fn message(&self) -> &str {
        match self {
            ErrorBody::Message(message) => message,
            ErrorBody::Structured(details) => &details.message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub code: i64,
    pub message: String,
}

/// Every valid message that can be received over the wire
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Envelope {
    Request(Request),
    Success(Success),
    Error(ErrorResponse),
}

impl Envelope {
    /// Attempt to interpret raw bytes as exactly one kind of message.
    ///
    /// Never panics; invalid JSON and payloads of the wrong shape are reported as a
    /// [`ParseError`].
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, ParseError> {
        let value: JsonValue = serde_json::from_slice(bytes).map_err(|source| ParseError::Json { source })?;
        Self::from_value(value)
    }

    /// Same as [`Self::parse`] but starting from an already-parsed JSON value.
    pub fn from_value(value: JsonValue) -> std::result::Result<Self, ParseError> {
        match (is_request(&value), is_success(&value), is_error(&value)) {
            (true, false, false) => serde_json::from_value(value)
                .map(Envelope::Request)
                .map_err(|source| ParseError::Shape {
                    kind: "request",
                    source,
                }),
            (false, true, false) => serde_json::from_value(value)
                .map(Envelope::Success)
                .map_err(|source| ParseError::Shape {
                    kind: "success",
                    source,
                }),
            (false, false, true) => serde_json::from_value(value)
                .map(Envelope::Error)
                .map_err(|source| ParseError::Shape { kind: "error", source }),
            (false, false, false) => Err(ParseError::Unrecognized),
            _ => Err(ParseError::Ambiguous),
        }
    }

    /// Serialize this message into raw bytes.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::JsonRpcError::SerResponse {
            source: e,
            type_name: std::any::type_name::<Self>(),
        })
    }
}

fn has_protocol_version(object: &serde_json::Map<String, JsonValue>) -> bool {
    object.get("jsonrpc").and_then(JsonValue::as_str) == Some(PROTOCOL_VERSION)
}

/// Does this value have the shape of a method call?
pub fn is_request(value: &JsonValue) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    has_protocol_version(object)
        && object.get("method").is_some_and(JsonValue::is_string)
        && object.get("params").is_some_and(JsonValue::is_array)
}

/// Does this value have the shape of a successful response?
pub fn is_success(value: &JsonValue) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    has_protocol_version(object) && object.contains_key("id") && object.contains_key("result")
}

/// Does this value have the shape of an error response?
pub fn is_error(value: &JsonValue) -> bool {
    match value.as_object().and_then(|object| object.get("error")) {
        Some(JsonValue::String(_)) => true,
        Some(JsonValue::Object(error)) => error.contains_key("code") && error.contains_key("message"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    #[test]
    fn test_request_serialization() {
        // Known-good request as a browser client would send it
        let known_good_json =
            r#"{"jsonrpc":"2.0","id":1,"method":"hello","params":["Ann"],"meta":{"values":{}}}"#;
        let known_good_value: Value = serde_json::from_str(known_good_json).unwrap();

        let our_request = Request::new(Id::from(1), "hello", vec![json!("Ann")], json!({"values": {}}));
        let our_value = serde_json::to_value(&our_request).unwrap();
        assert_eq!(known_good_value, our_value);

        let envelope = Envelope::parse(known_good_json.as_bytes()).unwrap();
        assert_matches!(envelope, Envelope::Request(request) if request == our_request);
    }

    #[test]
    fn test_request_without_meta_or_id() {
        let json = r#"{"jsonrpc":"2.0","method":"hello","params":[]}"#;
        let request = assert_matches!(Envelope::parse(json.as_bytes()).unwrap(), Envelope::Request(r) => r);
        assert_eq!(request.id, None);
        assert_eq!(request.meta, None);
        assert!(request.params.is_empty());

        // Omitted optional fields are not serialized back
        assert_eq!(serde_json::to_string(&request).unwrap(), json);
    }

    #[test]
    fn test_unusable_ids_are_treated_as_absent() {
        for id in [json!(null), json!(true), json!({"a": 1}), json!([1])] {
            let value = json!({"jsonrpc": "2.0", "id": id, "method": "m", "params": []});
            let request = assert_matches!(Envelope::from_value(value).unwrap(), Envelope::Request(r) => r);
            assert_eq!(request.id, None);
        }

        let value = json!({"jsonrpc": "2.0", "id": "abc", "method": "m", "params": []});
        let request = assert_matches!(Envelope::from_value(value).unwrap(), Envelope::Request(r) => r);
        assert_eq!(request.id, Some(Id::from("abc")));

        let value = json!({"jsonrpc": "2.0", "id": -2.5, "method": "m", "params": []});
        let request = assert_matches!(Envelope::from_value(value).unwrap(), Envelope::Request(r) => r);
        assert_eq!(request.id.unwrap().to_string(), "-2.5");
    }

    #[test]
    fn test_success_response_serialization() {
        let known_good_json = r#"{"jsonrpc":"2.0","id":"abc","result":[1,2,3],"meta":{"values":["set"]}}"#;
        let known_good_value: Value = serde_json::from_str(known_good_json).unwrap();

        let our_response = Success::new(Id::from("abc"), json!([1, 2, 3]), json!({"values": ["set"]}));
        assert_eq!(known_good_value, serde_json::to_value(&our_response).unwrap());

        let envelope = Envelope::parse(known_good_json.as_bytes()).unwrap();
        assert_matches!(envelope, Envelope::Success(success) if success == our_response);
    }

    #[test]
    fn test_success_with_null_id() {
        let json = r#"{"jsonrpc":"2.0","id":null,"result":"ok"}"#;
        let success = assert_matches!(Envelope::parse(json.as_bytes()).unwrap(), Envelope::Success(s) => s);
        assert_eq!(success.id, None);
        assert_eq!(success.result, json!("ok"));
    }

    #[test]
    fn test_error_response_serialization() {
        let bare = r#"{"error":"Invalid JSON-RPC request."}"#;
        let envelope = Envelope::parse(bare.as_bytes()).unwrap();
        assert_matches!(envelope, Envelope::Error(e) if e == ErrorResponse::message("Invalid JSON-RPC request."));
        assert_eq!(
            serde_json::to_string(&ErrorResponse::message("Invalid JSON-RPC request.")).unwrap(),
            bare
        );

        let structured = r#"{"error":{"code":-32603,"message":"Internal Server Error."}}"#;
        let envelope = Envelope::parse(structured.as_bytes()).unwrap();
        let error = assert_matches!(envelope, Envelope::Error(e) => e);
        assert_eq!(
            error,
            ErrorResponse::with_code(ErrorCode::InternalError, "Internal Server Error.")
        );
        assert_eq!(error.error.message(), "Internal Server Error.");
        assert_eq!(serde_json::to_string(&error).unwrap(), structured);
    }

    #[test]
    fn test_predicates() {
        assert!(is_request(&json!({"jsonrpc": "2.0", "method": "m", "params": []})));
        assert!(!is_request(&json!({"jsonrpc": "2.0", "method": "m"})));
        assert!(!is_request(&json!({"jsonrpc": "2.0", "method": 1, "params": []})));
        assert!(!is_request(&json!({"jsonrpc": "1.0", "method": "m", "params": []})));
        assert!(!is_request(&json!({"jsonrpc": "2.0", "method": "m", "params": {"a": 1}})));

        assert!(is_success(&json!({"jsonrpc": "2.0", "id": 1, "result": null})));
        assert!(!is_success(&json!({"jsonrpc": "2.0", "result": null})));
        assert!(!is_success(&json!({"id": 1, "result": null})));

        assert!(is_error(&json!({"error": "nope"})));
        assert!(is_error(&json!({"error": {"code": 1, "message": "nope"}})));
        assert!(!is_error(&json!({"error": {"message": "nope"}})));
        assert!(!is_error(&json!({"error": 5})));

        assert!(!is_request(&json!([])));
        assert!(!is_success(&json!("x")));
        assert!(!is_error(&json!(null)));
    }

    #[test]
    fn test_parse_failures() {
        assert_matches!(Envelope::parse(b"{not json"), Err(ParseError::Json { .. }));
        assert_matches!(Envelope::parse(b"[1,2,3]"), Err(ParseError::Unrecognized));
        assert_matches!(
            Envelope::parse(br#"{"jsonrpc":"2.0","method":"m"}"#),
            Err(ParseError::Unrecognized)
        );
        assert_matches!(
            Envelope::parse(br#"{"jsonrpc":"2.0","id":1,"result":1,"error":"also"}"#),
            Err(ParseError::Ambiguous)
        );
        assert_matches!(
            Envelope::parse(br#"{"error":{"code":"x","message":"m"}}"#),
            Err(ParseError::Shape { kind: "error", .. })
        );
    }
}
