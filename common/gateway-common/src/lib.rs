//! Gateway Common - shared types for the toolgate daemon and clients
//!
//! This crate defines everything both sides of the socket must agree on:
//!
//! - **Protocol**: request/response envelopes and the error taxonomy
//! - **Codec**: newline-delimited JSON framing
//! - **Shaping**: size-bounded output controls for token-sensitive consumers
//! - **Init**: standardized tracing setup for the daemon and tools
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_common::{Request, Response, codec};
//!
//! let req = Request::new("unread_count", serde_json::json!({}));
//! let frame = codec::encode_frame(&req)?;
//! // write frame to the socket, read one line back...
//! let resp: Response = codec::decode_frame(&line)?;
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod init;
pub mod protocol;
pub mod shape;

// Re-export commonly used items at crate root
pub use client::DaemonClient;
pub use error::GatewayError;
pub use init::init_tracing;
pub use protocol::{ErrorCode, ErrorObject, Meta, Request, Response, PROTOCOL_VERSION};
pub use shape::{ShapeProfile, ShapingOptions};
