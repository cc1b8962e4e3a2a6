//! TCP ingestion server
//!
//! Workers read exactly one 64-byte frame at a time and push the decoded
//! payload onto the evidence queue. Evidence is fire-and-forget: nothing
//! is written back to sensors, and workers never block on belief-state
//! locks, only on socket I/O and the brief queue append.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use vigil_core::{decode_frame, SharedQueue, WireError, DEFAULT_IDLE_TIMEOUT_SECS, FRAME_LEN};

/// Ingestion server configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// TCP port to listen on (0 for random)
    pub port: u16,
    /// Idle read timeout per connection
    pub idle_timeout: Duration,
    /// Maximum concurrent sensor connections
    pub max_connections: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            port: 9100,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_connections: 64,
        }
    }
}

/// Fatal ingestion server errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to bind listen port: {0}")]
    Bind(std::io::Error),
}

/// Why a connection worker terminated
#[derive(Debug, Error)]
pub enum ConnectionClose {
    #[error("peer disconnected")]
    Disconnected,

    #[error("idle for {0:?}")]
    IdleTimeout(Duration),

    #[error("protocol violation: {0}")]
    Protocol(#[from] WireError),

    #[error("socket error: {0}")]
    Socket(std::io::Error),
}

/// Start the ingestion server.
///
/// Returns the bound address and a shutdown handle; dropping or firing
/// the handle stops the accept loop. Established workers run until their
/// own connection closes.
pub async fn run(
    config: IngestConfig,
    queue: SharedQueue,
) -> Result<(SocketAddr, oneshot::Sender<()>), IngestError> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(IngestError::Bind)?;
    let addr = listener.local_addr().map_err(IngestError::Bind)?;

    info!("evidence ingestion listening on {addr}");

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let limits = Arc::new(Semaphore::new(config.max_connections));
    let idle_timeout = config.idle_timeout;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("ingestion server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    };

                    let Ok(permit) = limits.clone().try_acquire_owned() else {
                        warn!("connection cap reached, refusing {peer}");
                        continue;
                    };

                    let queue = queue.clone();
                    tokio::spawn(async move {
                        let worker_id = short_id();
                        debug!("worker {worker_id}: accepted {peer}");

                        let close = serve_connection(stream, queue, idle_timeout).await;
                        match close {
                            ConnectionClose::Disconnected => {
                                debug!("worker {worker_id}: {peer} disconnected");
                            }
                            other => warn!("worker {worker_id}: closing {peer}: {other}"),
                        }
                        drop(permit);
                    });
                }
            }
        }
    });

    Ok((addr, shutdown_tx))
}

/// Read frames from one sensor until the connection ends.
async fn serve_connection(
    mut stream: TcpStream,
    queue: SharedQueue,
    idle_timeout: Duration,
) -> ConnectionClose {
    let mut frame = [0u8; FRAME_LEN];

    loop {
        match timeout(idle_timeout, stream.read_exact(&mut frame)).await {
            Err(_) => return ConnectionClose::IdleTimeout(idle_timeout),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return ConnectionClose::Disconnected;
            }
            Ok(Err(e)) => return ConnectionClose::Socket(e),
            Ok(Ok(_)) => match decode_frame(&frame) {
                Ok(payload) => {
                    trace!("frame: {payload}");
                    queue.push(payload);
                }
                Err(e) => return ConnectionClose::Protocol(e),
            },
        }
    }
}

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}
