//! Daemon configuration and per-user state paths
//!
//! All local state lives under one dotfile directory: the listening socket,
//! the pidfile, and background-mode log files. Paths can be overridden per
//! flag or environment variable; everything else is derived from the state
//! directory.

use std::path::PathBuf;

/// Per-user state directory for the gateway.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".toolgate")
}

pub fn default_socket_path() -> PathBuf {
    default_state_dir().join("daemon.sock")
}

pub fn default_pid_path() -> PathBuf {
    default_state_dir().join("daemon.pid")
}

pub fn default_db_path() -> PathBuf {
    default_state_dir().join("messages.db")
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub db_path: PathBuf,
}

impl DaemonConfig {
    pub fn new(socket_path: PathBuf, pid_path: PathBuf, db_path: PathBuf) -> Self {
        Self {
            socket_path,
            pid_path,
            db_path,
        }
    }

    /// Directory for background-mode daemon logs.
    pub fn log_dir(&self) -> PathBuf {
        self.socket_path
            .parent()
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| default_state_dir().join("logs"))
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new(default_socket_path(), default_pid_path(), default_db_path())
    }
}
