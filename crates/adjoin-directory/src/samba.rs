//! Production [`DirectoryClient`] backed by realmd, Samba `net`, and MIT
//! Kerberos command-line tools.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use adjoin_config::{DnsIdentity, Settings};

use crate::client::{DirectoryClient, JoinResult};
use crate::command::{Tool, ToolOutput};
use crate::keytab::{parse_keytab_listing, parse_spn_listing};
use crate::principal::CIFS_SERVICE;
use crate::DirectoryError;

const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Samba writes the winbind log here when journald is unavailable.
const WINBIND_LOG: &str = "/var/log/samba/log.winbindd";

/// Lifetime of the throwaway ticket used to validate credentials.
const VALIDATION_TICKET_LIFETIME: &str = "5m";

/// Phrases realmd and `net` use when the machine is already a member.
const ALREADY_JOINED_MARKERS: &[&str] = &["already joined", "already a member"];

/// Drives the directory tools as subprocesses.
pub struct SambaDirectory {
    settings: Settings,
}

impl SambaDirectory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn realm(&self) -> &str {
        &self.settings.realm.realm
    }

    fn smb_conf(&self) -> String {
        self.settings.samba_config.display().to_string()
    }

    /// `net ads <args>` authenticated as the administrator.
    ///
    /// The password is handed over through `PASSWD`, which Samba's
    /// credential parser reads, so it never appears in the process list.
    fn net_ads<I, S>(&self, args: I) -> Tool<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tool::new("net")
            .arg("ads")
            .args(args)
            .args(["-s".to_string(), self.smb_conf()])
            .args(["-U".to_string(), self.settings.admin.user.clone()])
            .env("PASSWD", self.settings.admin.password.as_str())
            .env("KRB5_CONFIG", self.settings.krb5_config.display().to_string())
    }

    fn keytab_env(path: &Path) -> String {
        format!("FILE:{}", path.display())
    }

    fn staging_keytab(&self) -> PathBuf {
        let mut name = self
            .settings
            .keytab
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "krb5.keytab".into());
        name.push(".new");
        self.settings.keytab.with_file_name(name)
    }
}

/// Classify a join response by its content, not just its exit status.
pub(crate) fn classify_join(output: &ToolOutput) -> JoinResult {
    let text = output.combined();
    let lower = text.to_ascii_lowercase();
    if ALREADY_JOINED_MARKERS.iter().any(|m| lower.contains(m)) {
        return JoinResult::AlreadyJoined;
    }
    if output.success {
        JoinResult::Success
    } else {
        JoinResult::Failure(text)
    }
}

fn nameservers(resolv_conf: &str) -> Vec<String> {
    resolv_conf
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("nameserver"))
        .map(str::to_string)
        .collect()
}

fn parse_getent_hosts(output: &str) -> Vec<IpAddr> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|addr| addr.parse().ok())
        .collect()
}

fn tail(text: &str, lines: usize) -> Vec<String> {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|l| l.to_string()).collect()
}

impl DirectoryClient for SambaDirectory {
    fn discover(&self) -> Result<(), DirectoryError> {
        let out = Tool::new("realm")
            .args(["discover", self.realm()])
            .checked()?;
        if out.stdout.trim().is_empty() {
            return Err(DirectoryError::Unexpected(format!(
                "realm discover returned nothing for {}",
                self.realm()
            )));
        }
        Ok(())
    }

    fn resolve_domain(&self) -> Result<Vec<IpAddr>, DirectoryError> {
        let domain = &self.settings.realm.domain;
        let out = Tool::new("getent").args(["hosts", domain.as_str()]).checked()?;
        let addrs = parse_getent_hosts(&out.stdout);
        if addrs.is_empty() {
            return Err(DirectoryError::Unexpected(format!(
                "{domain} did not resolve to any address"
            )));
        }
        Ok(addrs)
    }

    fn dns_diagnostics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match Tool::new("nslookup")
            .arg(self.settings.realm.domain.clone())
            .output()
        {
            Ok(out) => lines.extend(out.combined().lines().map(str::to_string)),
            Err(e) => lines.push(format!("nslookup unavailable: {e}")),
        }
        match std::fs::read_to_string(RESOLV_CONF) {
            Ok(raw) => lines.extend(nameservers(&raw)),
            Err(e) => lines.push(format!("{RESOLV_CONF} unreadable: {e}")),
        }
        lines
    }

    fn validate_credentials(&self) -> Result<(), DirectoryError> {
        let ccache = std::env::temp_dir().join(format!("adjoin-validate-{}", std::process::id()));
        let ccache = format!("FILE:{}", ccache.display());
        let principal = self.settings.admin_principal();

        let result = Tool::new("kinit")
            .args(["-l", VALIDATION_TICKET_LIFETIME, principal.as_str()])
            .env("KRB5CCNAME", ccache.clone())
            .env("KRB5_CONFIG", self.settings.krb5_config.display().to_string())
            .stdin(self.settings.admin.password.as_str())
            .checked();

        // Discard the ticket whatever the outcome.
        if let Err(e) = Tool::new("kdestroy").env("KRB5CCNAME", ccache).output() {
            tracing::debug!(error = %e, "kdestroy failed");
        }
        result.map(|_| ())
    }

    fn join_realm(&self) -> JoinResult {
        let out = Tool::new("realm")
            .args([
                "join".to_string(),
                "--verbose".to_string(),
                "--membership-software=samba".to_string(),
                "--client-software=winbind".to_string(),
                format!("--user={}", self.settings.admin.user),
                self.realm().to_string(),
            ])
            .stdin(self.settings.admin.password.as_str())
            .output();
        match out {
            Ok(out) => classify_join(&out),
            Err(e) => JoinResult::Failure(e.to_string()),
        }
    }

    fn realm_configured(&self) -> Result<bool, DirectoryError> {
        let out = Tool::new("realm").args(["list", "--name-only"]).checked()?;
        let domain = &self.settings.realm.domain;
        Ok(out
            .stdout
            .lines()
            .any(|l| l.trim().eq_ignore_ascii_case(domain)))
    }

    fn service_log_tail(&self, lines: usize) -> Vec<String> {
        let journal = Tool::new("journalctl")
            .args(["--no-pager", "-u", "realmd", "-n"])
            .arg(lines.to_string())
            .output();
        if let Ok(out) = journal {
            if out.success && !out.stdout.trim().is_empty() {
                return tail(&out.stdout, lines);
            }
        }
        match std::fs::read_to_string(WINBIND_LOG) {
            Ok(raw) => tail(&raw, lines),
            Err(_) => Vec::new(),
        }
    }

    fn join_domain(&self) -> JoinResult {
        match self.net_ads(["join"]).output() {
            Ok(out) => classify_join(&out),
            Err(e) => JoinResult::Failure(e.to_string()),
        }
    }

    fn domain_info(&self) -> Result<(), DirectoryError> {
        Tool::new("net")
            .args(["ads", "info", "-s"])
            .arg(self.smb_conf())
            .checked()
            .map(|_| ())
    }

    fn register_principal(&self, spn: &str) -> Result<(), DirectoryError> {
        self.net_ads(["setspn", "add", spn]).checked().map(|_| ())
    }

    fn list_principals(&self) -> Result<Vec<String>, DirectoryError> {
        let out = self.net_ads(["setspn", "list"]).checked()?;
        Ok(parse_spn_listing(&out.stdout))
    }

    fn register_dns(&self, identity: &DnsIdentity) -> Result<(), DirectoryError> {
        let tool = match identity {
            DnsIdentity::Local => self.net_ads(["dns", "register", self.settings.fqdn().as_str()]),
            DnsIdentity::External { address, name } => {
                let name = if name.contains('.') {
                    name.clone()
                } else {
                    format!("{name}.{}", self.settings.realm.domain)
                };
                self.net_ads(["dns".to_string(), "register".to_string(), name, address.clone()])
            }
        };
        tool.checked().map(|_| ())
    }

    fn create_keytab(&self) -> Result<(), DirectoryError> {
        // Build into a staging file and rename, so readers sharing the
        // keytab never see a partially written one.
        let staging = self.staging_keytab();
        let _ = std::fs::remove_file(&staging);

        self.net_ads(["keytab", "create"])
            .env("KRB5_KTNAME", Self::keytab_env(&staging))
            .checked()?;
        if self.settings.smb_enabled {
            self.net_ads(["keytab", "add", CIFS_SERVICE])
                .env("KRB5_KTNAME", Self::keytab_env(&staging))
                .checked()?;
        }

        std::fs::rename(&staging, &self.settings.keytab).map_err(|e| {
            DirectoryError::Unexpected(format!(
                "could not install keytab {}: {e}",
                self.settings.keytab.display()
            ))
        })?;
        Ok(())
    }

    fn list_keytab(&self) -> Result<Vec<String>, DirectoryError> {
        let out = Tool::new("klist")
            .arg("-k")
            .arg(self.settings.keytab.display().to_string())
            .checked()?;
        Ok(parse_keytab_listing(&out.stdout))
    }

    fn test_membership(&self) -> Result<(), DirectoryError> {
        Tool::new("net")
            .args(["ads", "testjoin", "-s"])
            .arg(self.smb_conf())
            .checked()
            .map(|_| ())
    }
}
