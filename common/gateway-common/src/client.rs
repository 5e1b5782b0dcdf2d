//! Client for communicating with the gateway daemon
//!
//! One connection per call: connect, write one request frame, read one
//! response frame, done. The client never retries and never starts the
//! daemon; an absent or refusing socket fails fast as "not running".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::codec;
use crate::error::GatewayError;
use crate::protocol::{Request, Response};

/// Default end-to-end timeout for one call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check whether a daemon currently accepts connections on the socket.
    pub async fn is_listening(&self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_millis(150), UnixStream::connect(&self.socket_path))
                .await,
            Ok(Ok(_))
        )
    }

    /// Perform one request/response round trip.
    ///
    /// The timeout covers the whole exchange; expiry maps to
    /// [`GatewayError::Timeout`], a strictly client-side condition.
    pub async fn call(&self, method: &str, params: Value) -> Result<Response, GatewayError> {
        let request = Request::new(method, params);
        tokio::time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout.as_secs_f64()))?
    }

    async fn exchange(&self, request: &Request) -> Result<Response, GatewayError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| GatewayError::NotRunning)?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let frame = codec::encode_frame(request)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| GatewayError::Protocol(format!("write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| GatewayError::Protocol(format!("flush failed: {}", e)))?;

        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| GatewayError::Protocol(format!("read failed: {}", e)))?;

        codec::decode_frame(&line)
    }
}
