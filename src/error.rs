//! Error types for lsp-lm

use serde_json::Value;
use thiserror::Error;

use crate::rpc::envelope::{ErrorCode, ResponseError};

pub type LspLmResult<T> = std::result::Result<T, LspLmError>;

#[derive(Debug, Error)]
pub enum LspLmError {
    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the base protocol layer. Always fatal to the session.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Connection closed in the middle of a frame header")]
    TruncatedHeader,

    #[error("Header line is not terminated by CRLF")]
    MissingCarriageReturn,

    #[error("Header line is not ASCII")]
    NonAsciiHeader,

    #[error("There is no colon in header: {0}")]
    MissingColon(String),

    #[error("Missing Content-Length header")]
    MissingContentLength,

    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("Frame of {length} bytes exceeds the {limit} byte limit")]
    ContentTooLarge { length: usize, limit: usize },

    #[error("Failed to read frame content: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A frame payload that is not a well-formed JSON-RPC message.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("Content is not valid {charset}: {message}")]
    Decode { charset: String, message: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("No method to call")]
    MissingMethod { id: Option<Value> },

    #[error("Field method is not a string")]
    InvalidMethod { id: Option<Value> },

    #[error("Wrong type of request identifier: {0}")]
    InvalidId(Value),
}

impl EnvelopeError {
    /// JSON-RPC error code a client should see for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedCharset(_) | Self::Decode { .. } | Self::Json(_) => {
                ErrorCode::ParseError
            }
            Self::NotAnObject
            | Self::MissingMethod { .. }
            | Self::InvalidMethod { .. }
            | Self::InvalidId(_) => ErrorCode::InvalidRequest,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{kind} address requires a host")]
    MissingHost { kind: String },

    #[error("{kind} address requires a port")]
    MissingPort { kind: String },

    #[error("Unix socket address requires a path")]
    MissingPath,

    #[error("Invalid address '{input}': {message}")]
    InvalidAddress { input: String, message: String },

    #[error("No {family} address found for {host}")]
    NoAddress { host: String, family: String },

    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure raised by a route handler.
///
/// Handlers never build error envelopes themselves; the router translates
/// this into a [`ResponseError`] for requests and only logs it for
/// notifications.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{message}")]
    Rpc {
        code: ErrorCode,
        message: String,
        data: Option<Value>,
    },

    #[error("Capability is declared but not implemented")]
    NotImplemented,

    #[error("Invalid params: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn not_initialized() -> Self {
        Self::new(ErrorCode::ServerNotInitialized, "server not initialized")
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::NotImplemented => ErrorCode::MethodNotFound,
            Self::InvalidParams(_) => ErrorCode::InvalidParams,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<HandlerError> for ResponseError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Rpc {
                code,
                message,
                data,
            } => ResponseError {
                code,
                message,
                data,
            },
            HandlerError::NotImplemented => ResponseError::method_not_found(),
            HandlerError::InvalidParams(e) => ResponseError::with_data(
                ErrorCode::InvalidParams,
                "invalid params",
                Value::String(e.to_string()),
            ),
            HandlerError::Internal(e) => ResponseError::internal_error(format!("{:#}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_error_codes() {
        assert_eq!(
            EnvelopeError::UnsupportedCharset("koi8-r".into()).error_code(),
            ErrorCode::ParseError
        );
        assert_eq!(
            EnvelopeError::MissingMethod { id: None }.error_code(),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            EnvelopeError::InvalidId(serde_json::json!(1.5)).error_code(),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_not_implemented_maps_to_method_not_found() {
        let err: ResponseError = HandlerError::NotImplemented.into();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert_eq!(err.message, "method not found");
        assert!(err.data.is_none());
    }

    #[test]
    fn test_internal_error_carries_description() {
        let err: ResponseError = HandlerError::from(anyhow::anyhow!("boom")).into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "internal error");
        assert_eq!(err.data, Some(Value::String("boom".to_string())));
    }

    #[test]
    fn test_rpc_error_keeps_code() {
        let err = HandlerError::not_initialized();
        assert_eq!(err.error_code(), ErrorCode::ServerNotInitialized);
        let resp: ResponseError = err.into();
        assert_eq!(resp.code, ErrorCode::ServerNotInitialized);
    }
}
