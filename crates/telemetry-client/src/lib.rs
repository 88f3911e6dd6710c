//! TCP client library for communicating with the telemetry daemon.
//!
//! Each request opens a connection, sends one command line and reads one JSON
//! response line.

use std::time::Duration;

pub use telemetry_core::{Command, MetricsResponse, Response, StatusCode};
use telemetry_core::DEFAULT_PORT;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Result type alias using the client error.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the daemon.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon could not be reached.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response line exceeded the configured limit.
    #[error("response too large (more than {0} bytes)")]
    ResponseTooLarge(usize),

    /// The daemon closed the connection without answering.
    #[error("connection closed before a response was received")]
    ConnectionClosed,

    /// The response was not valid JSON.
    #[error("invalid JSON from daemon: {source}: {line:?}")]
    InvalidJson {
        line: String,
        source: serde_json::Error,
    },

    /// A well-formed response of the wrong shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Bound on connect, send and receive together
    pub timeout: Duration,
    /// Longest accepted response line
    pub max_line_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(1),
            max_line_bytes: 8192,
        }
    }
}

/// Client for the daemon's line protocol.
pub struct TelemetryClient {
    config: ClientConfig,
}

impl TelemetryClient {
    /// Creates a client; no connection is made until the first request.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Returns the daemon address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Fetches the current metrics.
    pub async fn get_metrics(&self) -> Result<MetricsResponse> {
        match self.request(Command::Get).await? {
            Response::Metrics(metrics) => Ok(metrics),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Checks that the daemon is alive.
    pub async fn ping(&self) -> Result<Response> {
        self.request(Command::Ping).await
    }

    /// Asks for a service restart. The daemon only acknowledges it.
    pub async fn restart(&self) -> Result<Response> {
        self.request(Command::Restart).await
    }

    /// Sets the daemon's throttle interval.
    pub async fn throttle(&self, ms: u32) -> Result<Response> {
        self.request(Command::Throttle(ms)).await
    }

    /// Sends a command and decodes the typed response.
    pub async fn request(&self, command: Command) -> Result<Response> {
        let line = self.exchange(&command.to_string()).await?;
        Response::decode(&line).map_err(|source| ClientError::InvalidJson { line, source })
    }

    /// Sends a raw line and returns the response as untyped JSON.
    pub async fn request_raw(&self, line: &str) -> Result<serde_json::Value> {
        let response = self.exchange(line).await?;
        serde_json::from_str(&response).map_err(|source| ClientError::InvalidJson {
            line: response,
            source,
        })
    }

    async fn exchange(&self, line: &str) -> Result<String> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, self.exchange_inner(line))
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }

    async fn exchange_inner(&self, line: &str) -> Result<String> {
        let addr = self.addr();
        debug!("Connecting to {}", addr);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let mut request = line.trim_end_matches(['\r', '\n']).to_string();
        request.push('\n');
        stream.write_all(request.as_bytes()).await?;

        let response = self.read_line(&mut stream).await?;
        debug!("Received {} bytes from {}", response.len(), addr);
        Ok(response)
    }

    async fn read_line(&self, stream: &mut TcpStream) -> Result<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                buf.truncate(pos);
                break;
            }
            if buf.len() > self.config.max_line_bytes {
                return Err(ClientError::ResponseTooLarge(self.config.max_line_bytes));
            }

            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                if buf.is_empty() {
                    return Err(ClientError::ConnectionClosed);
                }
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
