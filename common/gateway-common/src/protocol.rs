//! Wire protocol for the gateway daemon
//!
//! Requests and responses are exchanged over a Unix domain socket using
//! newline-delimited JSON. Each connection performs exactly one
//! write-then-read round trip; there is no stateful session protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version spoken by this build. Carried in every request and
/// response; the daemon rejects requests from a newer protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// A request to the daemon.
///
/// ```json
/// {"id": "uuid", "version": 1, "method": "recent", "params": {"limit": 10}}
/// ```
///
/// `id` is client-generated, unique per in-flight call, echoed back verbatim,
/// and never interpreted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub version: u32,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Request {
    /// Create a request with a fresh id for the given method and parameters.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: new_request_id(),
            version: PROTOCOL_VERSION,
            method: method.into(),
            params,
        }
    }

    /// Create a request with no parameters.
    pub fn no_params(method: impl Into<String>) -> Self {
        Self::new(method, empty_params())
    }
}

/// Generate an opaque request id. Clients may supply their own instead.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A response from the daemon.
///
/// Exactly one of `result`/`error` is non-null, determined by `ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the request id. Null when the request was unparseable.
    pub id: Option<String>,
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<ErrorObject>,
    pub meta: Meta,
}

impl Response {
    pub fn success(id: Option<String>, result: Value, server_ms: f64) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
            meta: Meta::new(server_ms),
        }
    }

    pub fn failure(id: Option<String>, error: ErrorObject, server_ms: f64) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
            meta: Meta::new(server_ms),
        }
    }
}

/// Response metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Time spent inside the daemon handling this request, in milliseconds.
    pub server_ms: f64,
    pub protocol_version: u32,
}

impl Meta {
    pub fn new(server_ms: f64) -> Self {
        Self {
            server_ms,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Structured, machine-matchable failure description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

/// Closed set of error codes crossing the protocol boundary.
///
/// Adapter-level failures are always converted to one of these before a
/// response is written; nothing else ever escapes the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed frame or unsupported protocol version
    ProtocolError,
    /// Schema violation; `details.field` names the offender
    InvalidParams,
    MethodNotFound,
    /// Backing store rejected credentials; never retried automatically
    AuthError,
    /// Requested entity absent in the backing store
    NotFound,
    /// Client-side only; the daemon does not time out handler calls
    Timeout,
    /// Unexpected adapter failure; `details.adapter` names the resource
    BackendError,
    AlreadyRunning,
    NotRunning,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::BackendError => "BACKEND_ERROR",
            ErrorCode::AlreadyRunning => "ALREADY_RUNNING",
            ErrorCode::NotRunning => "NOT_RUNNING",
        };
        write!(f, "{}", s)
    }
}
