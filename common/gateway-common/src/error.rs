//! Gateway error type
//!
//! [`GatewayError`] is the single error currency inside the daemon. Every
//! failure that needs to cross the protocol boundary converts to an
//! [`ErrorObject`] via [`GatewayError::to_object`], so handlers can use `?`
//! freely and the dispatcher stays total.

use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{ErrorCode, ErrorObject};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed frame or unsupported protocol version
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Parameter failed schema validation
    #[error("invalid params: {field}: {message}")]
    InvalidParams { field: String, message: String },

    #[error("unknown method: {0}")]
    MethodNotFound(String),

    /// Backing store rejected credentials
    #[error("auth rejected by {adapter}: {message}")]
    Auth { adapter: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Client-side end-to-end timeout; never produced by the daemon itself
    #[error("timed out after {0:.1}s")]
    Timeout(f64),

    /// Unexpected adapter failure
    #[error("backend '{adapter}' failed: {message}")]
    Backend { adapter: String, message: String },

    #[error("daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("daemon not running")]
    NotRunning,
}

impl GatewayError {
    /// Shorthand for a backend failure from a named adapter.
    pub fn backend(adapter: impl Into<String>, message: impl std::fmt::Display) -> Self {
        GatewayError::Backend {
            adapter: adapter.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a parameter violation naming the offending field.
    pub fn invalid_params(field: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::InvalidParams {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::Protocol(_) => ErrorCode::ProtocolError,
            GatewayError::InvalidParams { .. } => ErrorCode::InvalidParams,
            GatewayError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            GatewayError::Auth { .. } => ErrorCode::AuthError,
            GatewayError::NotFound(_) => ErrorCode::NotFound,
            GatewayError::Timeout(_) => ErrorCode::Timeout,
            GatewayError::Backend { .. } => ErrorCode::BackendError,
            GatewayError::AlreadyRunning { .. } => ErrorCode::AlreadyRunning,
            GatewayError::NotRunning => ErrorCode::NotRunning,
        }
    }

    /// Machine-matchable details for the error object, where the taxonomy
    /// promises them (offending field, adapter name, pid).
    fn details(&self) -> Option<Value> {
        match self {
            GatewayError::InvalidParams { field, .. } => Some(json!({ "field": field })),
            GatewayError::Backend { adapter, .. } | GatewayError::Auth { adapter, .. } => {
                Some(json!({ "adapter": adapter }))
            }
            GatewayError::AlreadyRunning { pid } => Some(json!({ "pid": pid })),
            _ => None,
        }
    }

    pub fn to_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Protocol(e.to_string())
    }
}
