//! Network topology classification.
//!
//! Each non-loopback interface is probed for external reachability.
//! Interfaces that cannot reach the probe target are isolated; their
//! networks, plus loopback, form the allow-list the identity daemon
//! enforces for the credential gateway. Nothing is cached: container
//! networks can change between restarts.

pub mod interface;
pub mod probe;

use serde::Serialize;

pub use interface::{network_address, Interface, InterfaceSource, IpCommand};
pub use probe::{Reachability, ReachabilityProbe, TcpProbe};

/// Always present in the allow-list.
pub const LOOPBACK_ENTRY: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("invalid prefix length /{0}")]
    InvalidPrefix(u8),

    #[error("interface enumeration failed: {0}")]
    Command(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Isolated,
    External,
    /// Probe could not run. Treated as external.
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedInterface {
    #[serde(flatten)]
    pub interface: Interface,
    pub network: String,
    pub verdict: Verdict,
    pub reachability: Reachability,
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub interfaces: Vec<ClassifiedInterface>,
    pub allow_list: Vec<String>,
}

impl Classification {
    pub fn isolated(&self) -> impl Iterator<Item = &ClassifiedInterface> {
        self.interfaces
            .iter()
            .filter(|c| c.verdict == Verdict::Isolated)
    }
}

/// Classify every interface and build the allow-list.
pub fn classify(
    source: &dyn InterfaceSource,
    probe: &dyn ReachabilityProbe,
) -> Result<Classification, TopologyError> {
    let mut interfaces = Vec::new();
    let mut allow_list = vec![LOOPBACK_ENTRY.to_string()];

    for interface in source.interfaces()? {
        let network = interface.cidr()?;
        let reachability = probe.probe(&interface);
        let verdict = match &reachability {
            Reachability::Reachable => Verdict::External,
            Reachability::Unreachable => Verdict::Isolated,
            Reachability::Unavailable(reason) => {
                tracing::warn!(
                    interface = %interface.name,
                    reason = %reason,
                    "Reachability probe unavailable; not treating network as isolated"
                );
                Verdict::Unknown
            }
        };
        tracing::debug!(interface = %interface.name, network = %network, verdict = ?verdict, "Interface classified");

        if verdict == Verdict::Isolated && !allow_list.contains(&network) {
            allow_list.push(network.clone());
        }
        interfaces.push(ClassifiedInterface {
            interface,
            network,
            verdict,
            reachability,
        });
    }

    Ok(Classification {
        interfaces,
        allow_list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    struct Fixed(Vec<Interface>);

    impl InterfaceSource for Fixed {
        fn interfaces(&self) -> Result<Vec<Interface>, TopologyError> {
            Ok(self.0.clone())
        }
    }

    struct Scripted(HashMap<&'static str, Reachability>);

    impl ReachabilityProbe for Scripted {
        fn probe(&self, interface: &Interface) -> Reachability {
            self.0
                .get(interface.name.as_str())
                .cloned()
                .unwrap_or(Reachability::Unreachable)
        }
    }

    fn two_interfaces() -> Fixed {
        Fixed(vec![
            Interface::new("eth0", Ipv4Addr::new(172, 18, 0, 5), 16),
            Interface::new("eth1", Ipv4Addr::new(10, 44, 7, 3), 20),
        ])
    }

    #[test]
    fn isolated_network_is_allowed_and_external_is_not() {
        let probe = Scripted(HashMap::from([
            ("eth0", Reachability::Reachable),
            ("eth1", Reachability::Unreachable),
        ]));
        let result = classify(&two_interfaces(), &probe).unwrap();

        assert_eq!(result.allow_list, vec!["127.0.0.1", "10.44.0.0/20"]);
        assert!(!result.allow_list.iter().any(|e| e.starts_with("172.18.")));
        assert_eq!(result.isolated().count(), 1);
    }

    #[test]
    fn unavailable_probe_fails_closed() {
        let probe = Scripted(HashMap::from([
            ("eth0", Reachability::Unavailable("EPERM".into())),
            ("eth1", Reachability::Unavailable("EPERM".into())),
        ]));
        let result = classify(&two_interfaces(), &probe).unwrap();

        assert_eq!(result.allow_list, vec![LOOPBACK_ENTRY]);
        assert!(result.interfaces.iter().all(|c| c.verdict == Verdict::Unknown));
    }

    #[test]
    fn shared_network_is_listed_once() {
        let source = Fixed(vec![
            Interface::new("eth0", Ipv4Addr::new(10, 1, 0, 2), 24),
            Interface::new("eth0", Ipv4Addr::new(10, 1, 0, 3), 24),
        ]);
        let result = classify(&source, &Scripted(HashMap::new())).unwrap();
        assert_eq!(result.allow_list, vec!["127.0.0.1", "10.1.0.0/24"]);
    }

    #[test]
    fn no_interfaces_leaves_loopback_only() {
        let result = classify(&Fixed(Vec::new()), &Scripted(HashMap::new())).unwrap();
        assert_eq!(result.allow_list, vec![LOOPBACK_ENTRY]);
    }

    #[test]
    fn classification_serializes_flat() {
        let probe = Scripted(HashMap::from([("eth0", Reachability::Reachable)]));
        let result = classify(&two_interfaces(), &probe).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["interfaces"][0]["name"], "eth0");
        assert_eq!(json["interfaces"][0]["verdict"], "external");
        assert_eq!(json["interfaces"][1]["network"], "10.44.0.0/20");
    }
}
