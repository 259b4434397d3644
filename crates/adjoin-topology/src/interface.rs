//! Local IPv4 interfaces and prefix arithmetic.

use std::net::Ipv4Addr;
use std::process::Command;

use serde::Serialize;

use crate::TopologyError;

/// One IPv4 address assigned to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub name: String,
    pub address: Ipv4Addr,
    pub prefix: u8,
}

impl Interface {
    pub fn new(name: &str, address: Ipv4Addr, prefix: u8) -> Self {
        Self {
            name: name.to_string(),
            address,
            prefix,
        }
    }

    pub fn network(&self) -> Result<Ipv4Addr, TopologyError> {
        network_address(self.address, self.prefix)
    }

    /// `<network>/<prefix>`, the form used in access directives.
    pub fn cidr(&self) -> Result<String, TopologyError> {
        Ok(format!("{}/{}", self.network()?, self.prefix))
    }
}

/// Mask `address` down to its network address. Any prefix 0..=32 works.
pub fn network_address(address: Ipv4Addr, prefix: u8) -> Result<Ipv4Addr, TopologyError> {
    if prefix > 32 {
        return Err(TopologyError::InvalidPrefix(prefix));
    }
    // A 32-bit shift overflows, so /0 is handled by checked_shl.
    let mask = u32::MAX
        .checked_shl(32 - u32::from(prefix))
        .unwrap_or(0);
    Ok(Ipv4Addr::from(u32::from(address) & mask))
}

/// Source of the interfaces to classify.
pub trait InterfaceSource: Send + Sync {
    /// Non-loopback interfaces with an IPv4 address.
    fn interfaces(&self) -> Result<Vec<Interface>, TopologyError>;
}

/// Reads interfaces from `ip -o -4 addr show`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpCommand;

impl InterfaceSource for IpCommand {
    fn interfaces(&self) -> Result<Vec<Interface>, TopologyError> {
        let output = Command::new("ip")
            .args(["-o", "-4", "addr", "show"])
            .output()
            .map_err(|e| TopologyError::Command(format!("ip: {e}")))?;
        if !output.status.success() {
            return Err(TopologyError::Command(format!(
                "ip exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_ip_addr(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `ip -o -4 addr show` output, skipping loopback and malformed lines.
///
/// ```text
/// 2: eth0    inet 172.18.0.5/16 brd 172.18.255.255 scope global eth0\       valid_lft forever
/// ```
pub fn parse_ip_addr(output: &str) -> Vec<Interface> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let inet = fields.iter().position(|f| *f == "inet")?;
            let name = fields.get(1)?.split('@').next()?.trim_end_matches(':');
            let (addr, prefix) = fields.get(inet + 1)?.split_once('/')?;
            let address: Ipv4Addr = addr.parse().ok()?;
            let prefix: u8 = prefix.parse().ok()?;
            if address.is_loopback() || name == "lo" || prefix > 32 {
                return None;
            }
            Some(Interface::new(name, address, prefix))
        })
        .collect()
}
