//! Credential proxy gateway.
//!
//! Bridges a TCP listener to the identity daemon's local socket so peers
//! on isolated networks can run lookups through it. The gateway forwards
//! bytes and nothing else: access control is the identity daemon's
//! `hosts allow` directive, which is written from the topology allow-list
//! before the listener starts.

mod listener;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use adjoin_common::capability::{Capability, CapabilityStatus};
use adjoin_config::render::apply_access_directive;
use adjoin_config::settings::ProxySettings;

pub use listener::{wait_for_socket, GatewayListener, SessionStats};

/// How long to wait for the identity socket before giving up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("identity socket {} did not appear within {}s", .socket.display(), .waited.as_secs())]
    StartupTimeout { socket: PathBuf, waited: Duration },

    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("could not apply access directive: {0}")]
    Access(#[from] adjoin_config::RenderError),

    #[error("proxy io error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub socket: PathBuf,
    pub startup_timeout: Duration,
}

impl GatewayConfig {
    /// Listen on every interface at the configured port.
    pub fn from_settings(proxy: &ProxySettings) -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, proxy.port)),
            socket: proxy.socket.clone(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub listen: SocketAddr,
    pub socket: PathBuf,
    pub active_sessions: usize,
    pub total_sessions: u64,
    pub running: bool,
}

impl Capability for ProxyStatus {
    fn name(&self) -> &str {
        "proxy"
    }

    fn status(&self) -> CapabilityStatus {
        let summary = format!(
            "{} -> {} ({} active, {} total)",
            self.listen,
            self.socket.display(),
            self.active_sessions,
            self.total_sessions
        );
        CapabilityStatus::new(self.name(), summary, self.running)
    }
}

/// A running gateway.
pub struct ProxyRuntime {
    config: GatewayConfig,
    local_addr: SocketAddr,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProxyRuntime {
    /// Apply the allow-list to the domain-join configuration, wait for the
    /// identity socket, then start accepting connections.
    pub async fn start(
        config: GatewayConfig,
        samba_config: &Path,
        allow_list: &[String],
        cancel: CancellationToken,
    ) -> Result<Self, ProxyError> {
        apply_access_directive(samba_config, allow_list)?;

        tracing::info!(socket = %config.socket.display(), "Waiting for identity socket");
        wait_for_socket(&config.socket, config.startup_timeout).await?;

        let stats = Arc::new(SessionStats::default());
        let listener =
            GatewayListener::bind(config.listen, config.socket.clone(), Arc::clone(&stats)).await?;
        let local_addr = listener.local_addr()?;
        let cancel = cancel.child_token();
        let handle = tokio::spawn(listener.run(cancel.clone()));

        tracing::info!(listen = %local_addr, socket = %config.socket.display(), "Credential gateway running");
        Ok(Self {
            config,
            local_addr,
            stats,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn status(&self) -> ProxyStatus {
        ProxyStatus {
            listen: self.local_addr,
            socket: self.config.socket.clone(),
            active_sessions: self.stats.active.load(Ordering::Relaxed),
            total_sessions: self.stats.total.load(Ordering::Relaxed),
            running: !self.cancel.is_cancelled(),
        }
    }

    /// Stop accepting and end open sessions.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_listens_on_all_interfaces() {
        let config = GatewayConfig::from_settings(&ProxySettings {
            port: 1390,
            socket: PathBuf::from("/run/samba/winbindd/pipe"),
        });
        assert_eq!(config.listen.to_string(), "0.0.0.0:1390");
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
    }

    #[test]
    fn timeout_message_names_socket() {
        let err = ProxyError::StartupTimeout {
            socket: PathBuf::from("/run/samba/winbindd/pipe"),
            waited: Duration::from_secs(60),
        };
        assert_eq!(
            err.to_string(),
            "identity socket /run/samba/winbindd/pipe did not appear within 60s"
        );
    }
}
