//! Gateway server
//!
//! Owns the listening socket and the warm resources. v1 serves strictly
//! sequentially: each accepted connection is handled to completion before
//! the next accept, so warm resources need no internal synchronization and
//! p95 latency stays predictable. Shutdown signals are observed between
//! requests; an in-flight request always finishes before exit.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};

use gateway_common::{codec, GatewayError, Request, Response};

use crate::config::DaemonConfig;
use crate::dispatch::Dispatcher;
use crate::resources::WarmResources;

pub struct GatewayServer {
    config: DaemonConfig,
    dispatcher: Dispatcher,
    resources: WarmResources,
}

impl GatewayServer {
    pub fn new(config: DaemonConfig, dispatcher: Dispatcher, resources: WarmResources) -> Self {
        Self {
            config,
            dispatcher,
            resources,
        }
    }

    /// Bind and serve until SIGTERM/SIGINT. Removes the socket and pidfile
    /// on the way out.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let listener = bind_socket(&self.config.socket_path)?;
        write_pidfile(&self.config.pid_path)?;

        tracing::info!(
            socket = %self.config.socket_path.display(),
            pid = std::process::id(),
            methods = ?self.dispatcher.registry().method_names(),
            "gateway daemon ready"
        );

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| GatewayError::Protocol(format!("signal handler: {}", e)))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| GatewayError::Protocol(format!("signal handler: {}", e)))?;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            // Handled inline: the next accept waits until this
                            // request completes.
                            if let Err(e) = self.handle_connection(stream).await {
                                tracing::warn!("connection error: {}", e);
                            }
                        }
                        Err(e) => tracing::error!("accept error: {}", e),
                    }
                }
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, shutting down");
                    break;
                }
            }
        }

        drop(listener);
        cleanup_state_files(&self.config);
        tracing::info!("gateway daemon stopped");
        Ok(())
    }

    /// One request/response exchange. A malformed frame yields an error
    /// response; it never terminates the daemon.
    async fn handle_connection(&mut self, stream: UnixStream) -> Result<(), GatewayError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| GatewayError::Protocol(format!("read failed: {}", e)))?;
        // EOF before any frame: the peer hung up, nothing to answer. A blank
        // line is a frame, and an invalid one.
        if n == 0 {
            return Ok(());
        }

        let response = match codec::decode_frame::<Request>(&line) {
            Ok(request) => self.dispatcher.dispatch(&request, &mut self.resources).await,
            Err(e) => Response::failure(None, e.to_object(), 0.0),
        };

        let frame = codec::encode_frame(&response)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| GatewayError::Protocol(format!("write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| GatewayError::Protocol(format!("flush failed: {}", e)))?;
        Ok(())
    }
}

/// Bind the listening socket with owner-only permissions, replacing any
/// stale socket file left by a crashed process.
fn bind_socket(socket_path: &Path) -> Result<UnixListener, GatewayError> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| GatewayError::Protocol(format!("state dir: {}", e)))?;
    }
    if socket_path.exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    let listener = UnixListener::bind(socket_path)
        .map_err(|e| GatewayError::Protocol(format!("bind {}: {}", socket_path.display(), e)))?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| GatewayError::Protocol(format!("chmod socket: {}", e)))?;
    Ok(listener)
}

fn write_pidfile(pid_path: &Path) -> Result<(), GatewayError> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| GatewayError::Protocol(format!("state dir: {}", e)))?;
    }
    std::fs::write(pid_path, std::process::id().to_string())
        .map_err(|e| GatewayError::Protocol(format!("pidfile: {}", e)))
}

fn cleanup_state_files(config: &DaemonConfig) {
    let _ = std::fs::remove_file(&config.socket_path);
    let _ = std::fs::remove_file(&config.pid_path);
}
