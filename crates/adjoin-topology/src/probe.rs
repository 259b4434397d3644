//! External reachability probe, one interface at a time.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Serialize;

use crate::interface::Interface;

/// Well-known public resolver used as the external target.
pub const DEFAULT_PROBE_TARGET: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum Reachability {
    Reachable,
    Unreachable,
    /// The probe could not run; the interface is not trusted as isolated.
    Unavailable(String),
}

pub trait ReachabilityProbe: Send + Sync {
    fn probe(&self, interface: &Interface) -> Reachability;
}

/// TCP connect to the target with the socket pinned to the interface.
///
/// Pinning uses `SO_BINDTODEVICE`, which needs `CAP_NET_RAW`. Without it
/// the probe reports `Unavailable` rather than falling back to an
/// unpinned connect that could leave through another interface.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: SocketAddr,
    timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            target: DEFAULT_PROBE_TARGET,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl TcpProbe {
    pub fn new(target: SocketAddr, timeout: Duration) -> Self {
        Self { target, timeout }
    }
}

impl ReachabilityProbe for TcpProbe {
    fn probe(&self, interface: &Interface) -> Reachability {
        use socket2::{Domain, Protocol, SockAddr, Socket, Type};

        let socket = match Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)) {
            Ok(socket) => socket,
            Err(e) => return Reachability::Unavailable(format!("socket create: {e}")),
        };
        if let Err(e) = pin_to_device(&socket, &interface.name) {
            return Reachability::Unavailable(format!("bind to {}: {e}", interface.name));
        }

        let target: SockAddr = self.target.into();
        match socket.connect_timeout(&target, self.timeout) {
            Ok(()) => Reachability::Reachable,
            // A reset still came back from outside.
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Reachability::Reachable,
            Err(e) => {
                tracing::debug!(interface = %interface.name, error = %e, "Probe target unreachable");
                Reachability::Unreachable
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn pin_to_device(socket: &socket2::Socket, name: &str) -> std::io::Result<()> {
    socket.bind_device(Some(name.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn pin_to_device(_socket: &socket2::Socket, _name: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "per-interface binding is not supported on this platform",
    ))
}
