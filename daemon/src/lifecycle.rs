//! Daemon lifecycle: start, stop, status
//!
//! Liveness detection uses three escalating checks, each cheaper than the
//! next: socket file exists, pidfile's process is alive, socket accepts a
//! connection. The common "is it running" case costs roughly one syscall.
//! Stale files from a crashed process are detected (pid no longer alive)
//! and treated as "not running", then cleaned up.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use gateway_common::{DaemonClient, GatewayError};

use crate::config::DaemonConfig;
use crate::dispatch::Dispatcher;
use crate::handlers::build_registry;
use crate::resources::WarmResources;
use crate::server::GatewayServer;

/// How long `stop` waits for the daemon to exit after SIGTERM.
const STOP_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, PartialEq, Eq)]
pub enum Liveness {
    Running { pid: Option<u32> },
    NotRunning,
}

pub fn read_pidfile(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub fn pid_alive(pid: u32) -> bool {
    // Signal 0 probes existence without delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Escalating liveness checks. Cleans up stale socket/pid files on the way.
pub async fn detect_running(cfg: &DaemonConfig) -> Liveness {
    if !cfg.socket_path.exists() {
        return Liveness::NotRunning;
    }

    let pid = read_pidfile(&cfg.pid_path);
    if let Some(pid) = pid {
        if !pid_alive(pid) {
            tracing::debug!(pid, "stale pidfile, cleaning up");
            remove_state_files(cfg);
            return Liveness::NotRunning;
        }
    }

    let client = DaemonClient::new(cfg.socket_path.clone());
    if client.is_listening().await {
        Liveness::Running { pid }
    } else {
        remove_state_files(cfg);
        Liveness::NotRunning
    }
}

/// Fail with `ALREADY_RUNNING` when a live daemon owns the socket.
pub async fn ensure_not_running(cfg: &DaemonConfig) -> Result<(), GatewayError> {
    match detect_running(cfg).await {
        Liveness::Running { pid } => Err(GatewayError::AlreadyRunning {
            pid: pid.unwrap_or(0),
        }),
        Liveness::NotRunning => Ok(()),
    }
}

fn remove_state_files(cfg: &DaemonConfig) {
    let _ = std::fs::remove_file(&cfg.socket_path);
    let _ = std::fs::remove_file(&cfg.pid_path);
}

/// Handle `toolgated start`. Returns the process exit code.
pub async fn run_start(cfg: &DaemonConfig, foreground: bool) -> Result<i32> {
    if let Err(e) = ensure_not_running(cfg).await {
        eprintln!("{} [{}]", e, e.code());
        return Ok(1);
    }

    if foreground {
        return run_foreground(cfg).await;
    }

    // Background mode: re-execute ourselves detached, logs to the state dir.
    let log_dir = cfg.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("daemon.log");
    let err_file = log_dir.join("daemon.err");

    let current_exe = std::env::current_exe()?;
    let child = std::process::Command::new(&current_exe)
        .arg("--socket")
        .arg(&cfg.socket_path)
        .arg("--pidfile")
        .arg(&cfg.pid_path)
        .arg("--db")
        .arg(&cfg.db_path)
        .arg("start")
        .arg("--foreground")
        .stdin(std::process::Stdio::null())
        .stdout(std::fs::File::create(&log_file)?)
        .stderr(std::fs::File::create(&err_file)?)
        .spawn()?;

    // Give the child a moment to open warm resources and bind.
    tokio::time::sleep(Duration::from_millis(500)).await;

    match detect_running(cfg).await {
        Liveness::Running { .. } => {
            println!("started daemon pid={} socket={}", child.id(), cfg.socket_path.display());
            Ok(0)
        }
        Liveness::NotRunning => {
            eprintln!(
                "daemon did not come up; check logs: {}",
                err_file.display()
            );
            Ok(1)
        }
    }
}

async fn run_foreground(cfg: &DaemonConfig) -> Result<i32> {
    // Warm resource failures are startup-fatal: no partially ready daemon.
    let resources = match WarmResources::open(cfg) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} [{}]", e, e.code());
            return Ok(1);
        }
    };
    let dispatcher = Dispatcher::new(build_registry());
    let server = GatewayServer::new(cfg.clone(), dispatcher, resources);
    server.run().await?;
    Ok(0)
}

/// Handle `toolgated stop`.
pub async fn run_stop(cfg: &DaemonConfig) -> Result<i32> {
    let pid = match detect_running(cfg).await {
        Liveness::NotRunning => {
            eprintln!("{} [{}]", GatewayError::NotRunning, GatewayError::NotRunning.code());
            return Ok(1);
        }
        Liveness::Running { pid } => pid,
    };

    let Some(pid) = pid else {
        // Listener alive but pid unknown: we cannot signal it safely.
        eprintln!("daemon is listening but the pidfile is missing; stop it manually");
        return Ok(2);
    };

    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }

    // The daemon finishes any in-flight request, then removes its own files.
    let deadline = std::time::Instant::now() + STOP_WAIT;
    while std::time::Instant::now() < deadline {
        if !pid_alive(pid) || !cfg.socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    remove_state_files(cfg);
    println!("stopped");
    Ok(0)
}

/// Handle `toolgated status`. Never hangs: the liveness probe is bounded
/// and the health call uses the client timeout.
pub async fn run_status(cfg: &DaemonConfig) -> Result<i32> {
    let pid = match detect_running(cfg).await {
        Liveness::NotRunning => {
            println!("not running (socket={})", cfg.socket_path.display());
            return Ok(1);
        }
        Liveness::Running { pid } => pid,
    };

    let client = DaemonClient::new(cfg.socket_path.clone());
    match client.call("health", json!({})).await {
        Ok(resp) if resp.ok => {
            let health = resp.result.unwrap_or_default();
            println!(
                "running pid={} started_at={} resources={}",
                pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into()),
                health["started_at"].as_str().unwrap_or("unknown"),
                health["resources"],
            );
            Ok(0)
        }
        Ok(resp) => {
            let message = resp
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown error".into());
            eprintln!("running but unhealthy: {}", message);
            Ok(1)
        }
        Err(e) => {
            eprintln!("running but unreachable: {}", e);
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config(dir: &Path) -> DaemonConfig {
        DaemonConfig::new(
            dir.join("daemon.sock"),
            dir.join("daemon.pid"),
            dir.join("messages.db"),
        )
    }

    #[tokio::test]
    async fn test_detect_not_running_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        assert_eq!(detect_running(&cfg).await, Liveness::NotRunning);
    }

    #[tokio::test]
    async fn test_stale_files_from_dead_pid_are_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        // A socket file that nothing listens on, plus a pidfile for a pid
        // that is almost certainly not alive.
        std::fs::write(&cfg.socket_path, b"").unwrap();
        std::fs::write(&cfg.pid_path, "999999").unwrap();

        assert_eq!(detect_running(&cfg).await, Liveness::NotRunning);
        assert!(!cfg.socket_path.exists());
        assert!(!cfg.pid_path.exists());
    }

    #[tokio::test]
    async fn test_socket_without_listener_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        std::fs::write(&cfg.socket_path, b"").unwrap();
        std::fs::write(&cfg.pid_path, std::process::id().to_string()).unwrap();

        // Pid is alive (ours) but nothing accepts on the socket.
        assert_eq!(detect_running(&cfg).await, Liveness::NotRunning);
    }

    #[tokio::test]
    async fn test_live_listener_yields_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let _listener = tokio::net::UnixListener::bind(&cfg.socket_path).unwrap();
        std::fs::write(&cfg.pid_path, std::process::id().to_string()).unwrap();

        let err = ensure_not_running(&cfg).await.unwrap_err();
        assert_eq!(err.code(), gateway_common::ErrorCode::AlreadyRunning);
        // The original listener's files are left untouched.
        assert!(cfg.socket_path.exists());
        assert!(cfg.pid_path.exists());
    }

    #[test]
    fn test_read_pidfile_handles_garbage() {
        assert_eq!(read_pidfile(&PathBuf::from("/nonexistent/pid")), None);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid");
        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_pidfile(&path), None);
        std::fs::write(&path, " 4242\n").unwrap();
        assert_eq!(read_pidfile(&path), Some(4242));
    }
}
