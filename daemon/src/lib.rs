//! Warm tool-call gateway daemon
//!
//! Long-lived process that holds expensive resources (the message store)
//! open and serves single-shot NDJSON requests over a Unix domain socket.
//! Callers pay connect + dispatch + query instead of cold process startup
//! on every tool call.

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod lifecycle;
pub mod registry;
pub mod resources;
pub mod server;
pub mod store;
