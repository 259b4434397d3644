use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::ProxyError;

/// Poll interval while waiting for the identity socket.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wait until `path` exists, or fail with `StartupTimeout`.
pub async fn wait_for_socket(path: &Path, timeout: Duration) -> Result<(), ProxyError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ProxyError::StartupTimeout {
                socket: path.to_path_buf(),
                waited: timeout,
            });
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
}

/// Counters shared with the runtime for status reporting.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub active: AtomicUsize,
    pub total: AtomicU64,
}

/// Accepts TCP connections and bridges each to its own Unix-socket session.
pub struct GatewayListener {
    listener: TcpListener,
    socket: PathBuf,
    stats: Arc<SessionStats>,
}

impl GatewayListener {
    pub async fn bind(
        addr: SocketAddr,
        socket: PathBuf,
        stats: Arc<SessionStats>,
    ) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;
        Ok(Self {
            listener,
            socket,
            stats,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        self.listener
            .local_addr()
            .map_err(|e| ProxyError::Io(e.to_string()))
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let socket = self.socket.clone();
                            let stats = Arc::clone(&self.stats);
                            let session_cancel = cancel.child_token();
                            tokio::spawn(async move {
                                stats.active.fetch_add(1, Ordering::Relaxed);
                                stats.total.fetch_add(1, Ordering::Relaxed);
                                tokio::select! {
                                    _ = session_cancel.cancelled() => {}
                                    result = forward(stream, &socket) => {
                                        if let Err(e) = result {
                                            tracing::debug!(peer = %peer, error = %e, "Gateway session ended with error");
                                        }
                                    }
                                }
                                stats.active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            // Transient (e.g. EMFILE); keep accepting.
                            tracing::warn!(error = %e, "Gateway accept failed");
                        }
                    }
                }
            }
        }
        tracing::debug!("Gateway listener stopped");
    }
}

/// Copy bytes both ways until either side closes.
async fn forward(mut tcp: TcpStream, socket: &Path) -> std::io::Result<(u64, u64)> {
    let mut unix = UnixStream::connect(socket).await?;
    tokio::io::copy_bidirectional(&mut tcp, &mut unix).await
}
