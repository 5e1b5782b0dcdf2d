//! Warm resource pool
//!
//! Everything expensive the daemon keeps hot between requests lives here.
//! The pool is constructed once at startup, owned by the server, and passed
//! by mutable reference into the dispatcher on every call, so single-owner
//! access is visible in the type signature rather than hidden in a global.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use gateway_common::GatewayError;

use crate::config::DaemonConfig;
use crate::store::MessageStore;

pub struct WarmResources {
    pub store: MessageStore,
    pub started_at: DateTime<Utc>,
    pub socket_path: PathBuf,
}

impl WarmResources {
    /// Open all warm resources. Any failure here is startup-fatal; the
    /// daemon does not start partially ready.
    pub fn open(cfg: &DaemonConfig) -> Result<Self, GatewayError> {
        let store = MessageStore::open(&cfg.db_path)?;
        Ok(Self {
            store,
            started_at: Utc::now(),
            socket_path: cfg.socket_path.clone(),
        })
    }

    /// In-memory pool for tests.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            store: MessageStore::open_in_memory().unwrap(),
            started_at: Utc::now(),
            socket_path: PathBuf::from("/tmp/toolgate-test.sock"),
        }
    }

    /// One lightweight probe per resource, keyed by adapter name.
    pub fn probe_all(&mut self) -> Value {
        let store_probe = match self.store.probe() {
            Ok(v) => v,
            Err(e) => json!({ "reachable": false, "error": e.to_string() }),
        };
        json!({ crate::store::ADAPTER_NAME: store_probe })
    }
}
