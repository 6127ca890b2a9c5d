//! JSON-RPC 2.0 Envelopes
//!
//! Message types carried inside frame payloads, plus the classification
//! rules that turn a raw payload into one of them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::EnvelopeError;

pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Identifiers and Error Codes
// ============================================================================

/// Request ID - can be integer or string, echoed back verbatim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    /// Integers above `i64::MAX`
    Unsigned(u64),
    String(String),
}

impl RequestId {
    /// Accepts only JSON strings and integers; anything else is not an id.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .or_else(|| n.as_u64().map(Self::Unsigned)),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Unsigned(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// JSON-RPC and LSP error codes. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ErrorCode {
    // JSON-RPC
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // JSON-RPC reserved range, backward compatible
    ServerNotInitialized = -32002,
    UnknownErrorCode = -32001,

    // LSP
    ServerCancelled = -32802,
    ContentModified = -32801,
    RequestCancelled = -32800,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// ============================================================================
// Envelope Shapes
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 successful Response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

impl Response {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }
}

/// JSON-RPC 2.0 Error response. `id` is null when the request id could not
/// be determined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: ResponseError,
}

impl ErrorResponse {
    pub fn new(id: Option<RequestId>, error: ResponseError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound, "method not found")
    }

    pub fn internal_error(description: impl Into<String>) -> Self {
        Self::with_data(
            ErrorCode::InternalError,
            "internal error",
            Value::String(description.into()),
        )
    }

    pub fn from_envelope_error(err: &EnvelopeError) -> Self {
        let message = match err.error_code() {
            ErrorCode::ParseError => "parse error",
            _ => "invalid request",
        };
        Self::with_data(err.error_code(), message, Value::String(err.to_string()))
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for ResponseError {}

/// Any JSON-RPC message travelling in a frame
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Envelope {
    Request(Request),
    Notification(Notification),
    Response(Response),
    Error(ErrorResponse),
}

impl Envelope {
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) | Self::Error(_) => None,
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Error(e) => e.id.as_ref(),
            Self::Notification(_) => None,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl From<Request> for Envelope {
    fn from(r: Request) -> Self {
        Envelope::Request(r)
    }
}

impl From<Notification> for Envelope {
    fn from(n: Notification) -> Self {
        Envelope::Notification(n)
    }
}

impl From<Response> for Envelope {
    fn from(r: Response) -> Self {
        Envelope::Response(r)
    }
}

impl From<ErrorResponse> for Envelope {
    fn from(e: ErrorResponse) -> Self {
        Envelope::Error(e)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a frame payload in the given charset and classify it.
pub fn decode(content: &[u8], charset: &str) -> Result<Envelope, EnvelopeError> {
    let text = decode_text(content, charset)?;
    let value: Value = serde_json::from_str(&text)?;
    classify(value)
}

fn decode_text(content: &[u8], charset: &str) -> Result<String, EnvelopeError> {
    let invalid = |message: String| EnvelopeError::Decode {
        charset: charset.to_string(),
        message,
    };

    match charset {
        "utf-8" => String::from_utf8(content.to_vec()).map_err(|e| invalid(e.to_string())),
        "ascii" | "us-ascii" => {
            if !content.is_ascii() {
                return Err(invalid("non-ASCII byte in content".to_string()));
            }
            String::from_utf8(content.to_vec()).map_err(|e| invalid(e.to_string()))
        }
        "iso-8859-1" | "latin1" | "latin-1" => Ok(content.iter().map(|&b| b as char).collect()),
        other => Err(EnvelopeError::UnsupportedCharset(other.to_string())),
    }
}

/// Classify a parsed JSON value into an envelope.
///
/// `method` with no `id` is a notification, `method` with a string or
/// integer `id` is a request, and an `id` with `result`/`error` but no
/// `method` is a response from the peer. A `jsonrpc` version other than
/// "2.0" is tolerated.
pub fn classify(value: Value) -> Result<Envelope, EnvelopeError> {
    let Value::Object(mut obj) = value else {
        return Err(EnvelopeError::NotAnObject);
    };

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        other => tracing::warn!("Unsupported JSON-RPC version: {:?}", other),
    }

    let id = obj.remove("id").filter(|v| !v.is_null());
    let params = obj.remove("params");

    match obj.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => match id {
            None => Ok(Envelope::Notification(Notification::new(method, params))),
            Some(raw) => match RequestId::from_value(&raw) {
                Some(id) => Ok(Envelope::Request(Request::new(id, method, params))),
                None => Err(EnvelopeError::InvalidId(raw)),
            },
        },
        None | Some(Value::Null) => classify_reply(id, obj),
        Some(Value::String(_)) => Err(EnvelopeError::MissingMethod { id }),
        Some(_) => Err(EnvelopeError::InvalidMethod { id }),
    }
}

fn classify_reply(id: Option<Value>, mut obj: Map<String, Value>) -> Result<Envelope, EnvelopeError> {
    if !obj.contains_key("result") && !obj.contains_key("error") {
        return Err(EnvelopeError::MissingMethod { id });
    }
    let Some(raw) = id else {
        return Err(EnvelopeError::MissingMethod { id: None });
    };
    let Some(id) = RequestId::from_value(&raw) else {
        return Err(EnvelopeError::InvalidId(raw));
    };

    match obj.remove("error") {
        Some(error) => {
            // Codes outside the closed set collapse to UnknownErrorCode
            let error = match serde_json::from_value::<ResponseError>(error.clone()) {
                Ok(error) => error,
                Err(_) => ResponseError {
                    code: ErrorCode::UnknownErrorCode,
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    data: error.get("data").cloned(),
                },
            };
            Ok(Envelope::Error(ErrorResponse::new(Some(id), error)))
        }
        None => {
            let result = obj.remove("result").unwrap_or(Value::Null);
            Ok(Envelope::Response(Response::new(id, result)))
        }
    }
}
