//! Scripted [`DirectoryClient`] test double.
//!
//! Behaves like a small in-memory directory: the realm join remembers that
//! it happened (so a second join answers "already joined"), the domain join
//! registers the host principals, and `create_keytab` snapshots whatever
//! principals are registered at that moment. Every call is recorded.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard};

use adjoin_config::DnsIdentity;

use crate::client::{DirectoryClient, JoinResult};
use crate::principal::{normalize, HOST_SERVICE};
use crate::DirectoryError;

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Discover,
    ResolveDomain,
    DnsDiagnostics,
    ValidateCredentials,
    JoinRealm,
    RealmConfigured,
    ServiceLogTail,
    JoinDomain,
    DomainInfo,
    RegisterPrincipal(String),
    ListPrincipals,
    RegisterDns(DnsIdentity),
    CreateKeytab,
    ListKeytab,
    TestMembership,
}

/// Scripted responses. `Err(text)` makes the operation fail with `text`.
#[derive(Debug, Clone)]
pub struct Script {
    pub discover: Result<(), String>,
    pub resolve: Result<(), String>,
    pub credentials: Result<(), String>,
    /// Response to the first realm join; later joins answer `AlreadyJoined`.
    pub realm_join: JoinResult,
    pub realm_configured: bool,
    pub domain_join: JoinResult,
    pub domain_info: Result<(), String>,
    pub register_principal: Result<(), String>,
    /// SPN registrations that report success but do not stick.
    pub ignore_registration: Vec<String>,
    pub dns_register: Result<(), String>,
    pub keytab_create: Result<(), String>,
    /// Principals left out of every generated keytab.
    pub keytab_omit: Vec<String>,
    pub membership: Result<(), String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            discover: Ok(()),
            resolve: Ok(()),
            credentials: Ok(()),
            realm_join: JoinResult::Success,
            realm_configured: true,
            domain_join: JoinResult::Success,
            domain_info: Ok(()),
            register_principal: Ok(()),
            ignore_registration: Vec::new(),
            dns_register: Ok(()),
            keytab_create: Ok(()),
            keytab_omit: Vec::new(),
            membership: Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct Directory {
    realm_joined: bool,
    principals: Vec<String>,
    keytab: Option<Vec<String>>,
    calls: Vec<Op>,
}

/// In-memory directory double for lifecycle tests.
#[derive(Debug)]
pub struct ScriptedDirectory {
    short: String,
    fqdn: String,
    script: Mutex<Script>,
    state: Mutex<Directory>,
}

impl ScriptedDirectory {
    pub fn new(short: &str, fqdn: &str) -> Self {
        Self::with_script(short, fqdn, Script::default())
    }

    pub fn with_script(short: &str, fqdn: &str, script: Script) -> Self {
        Self {
            short: short.to_string(),
            fqdn: fqdn.to_string(),
            script: Mutex::new(script),
            state: Mutex::new(Directory::default()),
        }
    }

    /// Replace the script, keeping directory state and call history.
    pub fn set_script(&self, script: Script) {
        *lock(&self.script) = script;
    }

    /// Edit the current script in place.
    pub fn update_script(&self, edit: impl FnOnce(&mut Script)) {
        edit(&mut lock(&self.script));
    }

    /// Start from a machine that is already a realm and domain member.
    pub fn already_member(self) -> Self {
        {
            let mut state = lock(&self.state);
            state.realm_joined = true;
            let host = self.host_principals();
            state.principals.extend(host);
        }
        self
    }

    pub fn calls(&self) -> Vec<Op> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn called(&self, op: &Op) -> bool {
        lock(&self.state).calls.contains(op)
    }

    /// Principals registered on the machine account.
    pub fn principals(&self) -> Vec<String> {
        lock(&self.state).principals.clone()
    }

    /// Remove an SPN, as another tool might behind our back.
    pub fn remove_principal(&self, spn: &str) {
        let wanted = normalize(spn);
        lock(&self.state)
            .principals
            .retain(|p| normalize(p) != wanted);
    }

    /// Principals in the last generated keytab, if any.
    pub fn keytab(&self) -> Option<Vec<String>> {
        lock(&self.state).keytab.clone()
    }

    fn host_principals(&self) -> Vec<String> {
        vec![
            format!("{HOST_SERVICE}/{}", self.short),
            format!("{HOST_SERVICE}/{}", self.fqdn),
        ]
    }

    fn record(&self, op: Op) {
        lock(&self.state).calls.push(op);
    }

    fn script(&self) -> Script {
        lock(&self.script).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn scripted(tool: &str, result: Result<(), String>) -> Result<(), DirectoryError> {
    result.map_err(|detail| DirectoryError::Command {
        tool: tool.to_string(),
        code: Some(1),
        detail,
    })
}

impl DirectoryClient for ScriptedDirectory {
    fn discover(&self) -> Result<(), DirectoryError> {
        self.record(Op::Discover);
        scripted("realm", self.script().discover)
    }

    fn resolve_domain(&self) -> Result<Vec<IpAddr>, DirectoryError> {
        self.record(Op::ResolveDomain);
        scripted("getent", self.script().resolve)?;
        Ok(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10))])
    }

    fn dns_diagnostics(&self) -> Vec<String> {
        self.record(Op::DnsDiagnostics);
        vec!["nameserver 10.0.0.2".to_string()]
    }

    fn validate_credentials(&self) -> Result<(), DirectoryError> {
        self.record(Op::ValidateCredentials);
        scripted("kinit", self.script().credentials)
    }

    fn join_realm(&self) -> JoinResult {
        self.record(Op::JoinRealm);
        let mut state = lock(&self.state);
        if state.realm_joined {
            return JoinResult::AlreadyJoined;
        }
        let result = self.script().realm_join;
        if result.is_ok() {
            state.realm_joined = true;
        }
        result
    }

    fn realm_configured(&self) -> Result<bool, DirectoryError> {
        self.record(Op::RealmConfigured);
        let joined = lock(&self.state).realm_joined;
        Ok(joined && self.script().realm_configured)
    }

    fn service_log_tail(&self, lines: usize) -> Vec<String> {
        self.record(Op::ServiceLogTail);
        vec!["realmd: scripted log line".to_string(); lines.min(1)]
    }

    fn join_domain(&self) -> JoinResult {
        self.record(Op::JoinDomain);
        let result = self.script().domain_join;
        if result.is_ok() {
            let host = self.host_principals();
            let mut state = lock(&self.state);
            for spn in host {
                if !state.principals.contains(&spn) {
                    state.principals.push(spn);
                }
            }
        }
        result
    }

    fn domain_info(&self) -> Result<(), DirectoryError> {
        self.record(Op::DomainInfo);
        scripted("net", self.script().domain_info)
    }

    fn register_principal(&self, spn: &str) -> Result<(), DirectoryError> {
        self.record(Op::RegisterPrincipal(spn.to_string()));
        let script = self.script();
        scripted("net", script.register_principal)?;
        if script.ignore_registration.iter().any(|s| normalize(s) == normalize(spn)) {
            return Ok(());
        }
        let mut state = lock(&self.state);
        if !state.principals.iter().any(|p| normalize(p) == normalize(spn)) {
            state.principals.push(spn.to_string());
        }
        Ok(())
    }

    fn list_principals(&self) -> Result<Vec<String>, DirectoryError> {
        self.record(Op::ListPrincipals);
        Ok(self.principals())
    }

    fn register_dns(&self, identity: &DnsIdentity) -> Result<(), DirectoryError> {
        self.record(Op::RegisterDns(identity.clone()));
        scripted("net", self.script().dns_register)
    }

    fn create_keytab(&self) -> Result<(), DirectoryError> {
        self.record(Op::CreateKeytab);
        let script = self.script();
        scripted("net", script.keytab_create)?;
        let mut state = lock(&self.state);
        let omit: Vec<String> = script.keytab_omit.iter().map(|p| normalize(p)).collect();
        let entries = state
            .principals
            .iter()
            .filter(|p| !omit.contains(&normalize(p)))
            .cloned()
            .collect();
        state.keytab = Some(entries);
        Ok(())
    }

    fn list_keytab(&self) -> Result<Vec<String>, DirectoryError> {
        self.record(Op::ListKeytab);
        self.keytab().ok_or_else(|| DirectoryError::Command {
            tool: "klist".to_string(),
            code: Some(1),
            detail: "keytab not found".to_string(),
        })
    }

    fn test_membership(&self) -> Result<(), DirectoryError> {
        self.record(Op::TestMembership);
        scripted("net", self.script().membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ScriptedDirectory {
        ScriptedDirectory::new("files01", "files01.example.com")
    }

    #[test]
    fn second_realm_join_reports_already_joined() {
        let dir = directory();
        assert_eq!(dir.join_realm(), JoinResult::Success);
        assert_eq!(dir.join_realm(), JoinResult::AlreadyJoined);
    }

    #[test]
    fn failed_realm_join_is_not_remembered() {
        let dir = directory();
        dir.update_script(|s| s.realm_join = JoinResult::Failure("denied".to_string()));
        assert!(!dir.join_realm().is_ok());
        assert!(!dir.realm_configured().unwrap());
    }

    #[test]
    fn keytab_snapshots_registered_principals() {
        let dir = directory();
        assert!(dir.list_keytab().is_err());
        dir.join_domain();
        dir.register_principal("cifs/files01").unwrap();
        dir.create_keytab().unwrap();
        let keytab = dir.list_keytab().unwrap();
        assert!(keytab.contains(&"host/files01".to_string()));
        assert!(keytab.contains(&"cifs/files01".to_string()));
    }

    #[test]
    fn omitted_principals_stay_out_of_keytab() {
        let dir = directory().already_member();
        dir.update_script(|s| s.keytab_omit = vec!["host/files01".to_string()]);
        dir.create_keytab().unwrap();
        assert_eq!(
            dir.list_keytab().unwrap(),
            vec!["host/files01.example.com".to_string()]
        );
    }

    #[test]
    fn calls_are_recorded_in_order() {
        let dir = directory();
        dir.discover().unwrap();
        dir.test_membership().unwrap();
        assert_eq!(dir.calls(), vec![Op::Discover, Op::TestMembership]);
    }
}
