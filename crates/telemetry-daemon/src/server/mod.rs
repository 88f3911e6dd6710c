//! TCP command server.
//!
//! One accept loop plus one task per connection, all cooperatively scheduled
//! on the daemon's single-threaded runtime. Each connection reads into a
//! bounded [`LineBuffer`], answers every complete line in arrival order and
//! is closed on peer shutdown, I/O error or an oversized request.

mod buffer;
mod cache;

pub use buffer::LineBuffer;
pub use cache::MetricsCache;

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use telemetry_core::response::messages;
use telemetry_core::{parse_command, Command, Error, Response, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::collector::Collector;

/// Maximum number of simultaneously served connections.
pub const MAX_CLIENTS: usize = 64;

/// Per-connection buffer size; a longer line is rejected.
pub const LINE_BUFFER_CAPACITY: usize = 1024;

/// Server parameters produced by the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP literal to bind
    pub host: String,
    pub port: u16,
    /// Initial minimum interval between two real collections
    pub throttle_ms: u32,
    /// Stop after this many milliseconds (0 = run until shut down)
    pub run_for_ms: u64,
}

/// Unbound server.
pub struct Server {
    config: ServerConfig,
    collector: Collector,
}

impl Server {
    /// Creates a server that will serve snapshots from `collector`.
    pub fn new(collector: Collector, config: ServerConfig) -> Self {
        Self { config, collector }
    }

    /// Validates the host and binds the listening socket.
    pub async fn bind(self) -> Result<BoundServer> {
        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid host: {}", self.config.host)))?;
        let addr = SocketAddr::new(ip, self.config.port);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(format!("bind {} failed: {}", addr, e)))?;

        Ok(BoundServer {
            listener,
            cache: Arc::new(MetricsCache::new(self.collector, self.config.throttle_ms)),
            slots: Arc::new(Semaphore::new(MAX_CLIENTS)),
            run_for: (self.config.run_for_ms != 0)
                .then(|| Duration::from_millis(self.config.run_for_ms)),
        })
    }
}

/// Server with a bound listening socket, ready to serve.
pub struct BoundServer {
    listener: TcpListener,
    cache: Arc<MetricsCache>,
    slots: Arc<Semaphore>,
    run_for: Option<Duration>,
}

impl BoundServer {
    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves clients until the run duration elapses or `shutdown` resolves.
    ///
    /// On return the listener and every connection have been closed.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let BoundServer {
            listener,
            cache,
            slots,
            run_for,
        } = self;

        let deadline = run_for.map(|d| Instant::now() + d);
        let run_out = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(run_out);
        tokio::pin!(shutdown);

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut run_out => {
                    info!("Run duration elapsed, stopping");
                    break;
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping");
                    break;
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Connection task failed: {}", e);
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => match slots.clone().try_acquire_owned() {
                        Ok(permit) => {
                            debug!("Accepted connection from {}", peer);
                            let cache = cache.clone();
                            connections.spawn(async move {
                                handle_connection(stream, peer, &cache).await;
                                drop(permit);
                            });
                        }
                        Err(_) => {
                            debug!("Client pool full, closing connection from {}", peer);
                            drop(stream);
                        }
                    },
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
        }

        drop(listener);
        connections.shutdown().await;
        Ok(())
    }
}

/// Why a connection ended without an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    PeerClosed,
    RequestTooLarge,
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, cache: &MetricsCache) {
    match serve_connection(&mut stream, peer, cache).await {
        Ok(Disconnect::PeerClosed) => debug!("{} disconnected", peer),
        Ok(Disconnect::RequestTooLarge) => debug!("{} closed after oversized request", peer),
        Err(e) => debug!("{} closed: {}", peer, e),
    }
}

async fn serve_connection(
    stream: &mut TcpStream,
    peer: SocketAddr,
    cache: &MetricsCache,
) -> std::io::Result<Disconnect> {
    let mut buffer = LineBuffer::with_capacity(LINE_BUFFER_CAPACITY);
    let mut chunk = [0u8; LINE_BUFFER_CAPACITY];

    loop {
        if buffer.is_full() {
            warn!(
                "{} sent {} bytes without a line terminator",
                peer,
                buffer.len()
            );
            write_response(stream, &Response::error(messages::REQUEST_TOO_LARGE)).await?;
            return Ok(Disconnect::RequestTooLarge);
        }

        let n = stream.read(&mut chunk[..buffer.remaining()]).await?;
        if n == 0 {
            if !buffer.is_empty() {
                debug!("{} closed with {} unterminated bytes", peer, buffer.len());
            }
            return Ok(Disconnect::PeerClosed);
        }
        buffer.extend(&chunk[..n]);

        while let Some(line) = buffer.next_line() {
            let response = dispatch(&line, cache).await;
            write_response(stream, &response).await?;
        }
    }
}

/// Executes one command line and returns its response.
pub async fn dispatch(line: &str, cache: &MetricsCache) -> Response {
    match parse_command(line) {
        Ok(Command::Ping) => Response::ack(messages::PONG),
        Ok(Command::Get) => Response::Metrics(cache.snapshot().await.to_response()),
        Ok(Command::Restart) => {
            // Process control belongs to the external supervisor.
            info!("Restart requested");
            Response::ack(messages::RESTART_REQUESTED)
        }
        Ok(Command::Throttle(ms)) => {
            let previous = cache.set_throttle(ms).await;
            info!("Throttle changed from {} ms to {} ms", previous, ms);
            Response::ack(messages::THROTTLE_SET)
        }
        Ok(Command::Unknown) => Response::error(messages::UNKNOWN_COMMAND),
        Err(e) => Response::error(e.to_string()),
    }
}

async fn write_response(stream: &mut TcpStream, response: &Response) -> std::io::Result<()> {
    match response.encode() {
        Ok(line) => stream.write_all(&line).await,
        Err(e) => {
            error!("Skipping response: {}", e);
            Ok(())
        }
    }
}
