use std::net::IpAddr;

use adjoin_config::DnsIdentity;

use crate::DirectoryError;

/// Outcome of a realm or domain join.
///
/// "Already joined" is a success for the lifecycle. It is decided once,
/// inside the client, from the tool's response content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResult {
    Success,
    AlreadyJoined,
    Failure(String),
}

impl JoinResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyJoined)
    }
}

/// Capability interface over the directory service and Kerberos tooling.
///
/// Calls are synchronous and block until the underlying tool returns.
pub trait DirectoryClient: Send + Sync {
    /// Locate domain controllers for the realm.
    fn discover(&self) -> Result<(), DirectoryError>;

    /// Forward-resolve the realm's DNS domain.
    fn resolve_domain(&self) -> Result<Vec<IpAddr>, DirectoryError>;

    /// Resolver output and configured nameservers, for failure reports.
    fn dns_diagnostics(&self) -> Vec<String>;

    /// Obtain a short-lived administrator ticket and discard it.
    fn validate_credentials(&self) -> Result<(), DirectoryError>;

    /// Configure local Kerberos client trust for the realm.
    fn join_realm(&self) -> JoinResult;

    /// Whether the realm shows up as configured.
    fn realm_configured(&self) -> Result<bool, DirectoryError>;

    /// Recent log lines from the join services.
    fn service_log_tail(&self, lines: usize) -> Vec<String>;

    /// Create or re-establish the directory-side computer account.
    fn join_domain(&self) -> JoinResult;

    /// Query the domain the machine is joined to.
    fn domain_info(&self) -> Result<(), DirectoryError>;

    /// Add a service principal name to the machine account.
    fn register_principal(&self, spn: &str) -> Result<(), DirectoryError>;

    /// Service principal names currently on the machine account.
    fn list_principals(&self) -> Result<Vec<String>, DirectoryError>;

    /// Register a DNS entry for the given identity.
    fn register_dns(&self, identity: &DnsIdentity) -> Result<(), DirectoryError>;

    /// Regenerate the keytab from the machine account's current password.
    fn create_keytab(&self) -> Result<(), DirectoryError>;

    /// Principals held in the keytab.
    fn list_keytab(&self) -> Result<Vec<String>, DirectoryError>;

    /// Non-mutating check that the machine account is still accepted.
    fn test_membership(&self) -> Result<(), DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_joined_counts_as_ok() {
        assert!(JoinResult::Success.is_ok());
        assert!(JoinResult::AlreadyJoined.is_ok());
        assert!(!JoinResult::Failure("denied".to_string()).is_ok());
    }
}
