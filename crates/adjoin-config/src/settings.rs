//! Configuration Resolver.
//!
//! Turns a name → value environment mapping into a validated [`Settings`]
//! record. Pure: the caller snapshots the process environment once at
//! startup and every component receives the resolved record by reference.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use adjoin_common::paths::{DEFAULT_KEYTAB, DEFAULT_KRB5_CONFIG, DEFAULT_SAMBA_CONFIG};

/// Environment snapshot the resolver reads from.
pub type EnvMap = HashMap<String, String>;

pub const ENV_ADMIN_USER: &str = "AD_ADMIN_USER";
pub const ENV_ADMIN_PASSWORD: &str = "AD_ADMIN_PASSWORD";
pub const ENV_REALM: &str = "KRB5_REALM";
pub const ENV_DOMAIN: &str = "KRB5_DOMAIN";
pub const ENV_KDC: &str = "KRB5_KDC";
pub const ENV_TICKET_LIFETIME: &str = "KRB5_TICKET_LIFETIME";
pub const ENV_RENEW_LIFETIME: &str = "KRB5_RENEW_LIFETIME";
pub const ENV_DNS_LOOKUP_KDC: &str = "KRB5_DNS_LOOKUP_KDC";
pub const ENV_DNS_LOOKUP_REALM: &str = "KRB5_DNS_LOOKUP_REALM";
pub const ENV_FORWARDABLE: &str = "KRB5_FORWARDABLE";
pub const ENV_RDNS: &str = "KRB5_RDNS";
pub const ENV_WORKGROUP: &str = "SAMBA_WORKGROUP";
pub const ENV_KRB5_CONFIG: &str = "KRB5_CONFIG";
pub const ENV_KEYTAB: &str = "KRB5_KTNAME";
pub const ENV_SAMBA_CONFIG: &str = "SAMBA_CONFIG";
pub const ENV_HOST_IP: &str = "HOST_IP";
pub const ENV_HOST_NAME: &str = "HOST_NAME";
pub const ENV_ENABLE_SMB: &str = "ENABLE_SMB";
pub const ENV_PROXY_PORT: &str = "PROXY_PORT";
pub const ENV_PROXY_SOCKET: &str = "PROXY_SOCKET";
pub const ENV_HOSTNAME: &str = "HOSTNAME";

pub const DEFAULT_TICKET_LIFETIME: &str = "24h";
pub const DEFAULT_RENEW_LIFETIME: &str = "7d";

/// Default gateway listener port.
pub const DEFAULT_PROXY_PORT: u16 = 1390;

/// Default winbind identity-lookup socket.
pub const DEFAULT_PROXY_SOCKET: &str = "/run/samba/winbindd/pipe";

/// The only supported keytab storage type.
const KEYTAB_FILE_PREFIX: &str = "FILE:";

/// NetBIOS names are limited to 15 characters.
const NETBIOS_NAME_MAX: usize = 15;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Administrator identity used for every privileged directory operation.
#[derive(Clone)]
pub struct AdminCredentials {
    pub user: String,
    pub password: Zeroizing<String>,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Realm identity written into the Kerberos client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmIdentity {
    pub realm: String,
    pub domain: String,
    pub workgroup: String,
    pub kdcs: Vec<String>,
    pub ticket_lifetime: String,
    pub renew_lifetime: String,
    pub dns_lookup_kdc: bool,
    pub dns_lookup_realm: bool,
    pub forwardable: bool,
    pub rdns: bool,
}

/// Which identity gets registered in DNS during the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsIdentity {
    /// Register this machine's own name and addresses.
    Local,
    /// Register an external host's address and name (host-network deployments).
    External { address: String, name: String },
}

/// Gateway settings for the optional credential proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub port: u16,
    pub socket: PathBuf,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub admin: AdminCredentials,
    pub realm: RealmIdentity,
    /// Short (first-label) hostname, lowercase.
    pub hostname: String,
    pub krb5_config: PathBuf,
    pub keytab: PathBuf,
    pub samba_config: PathBuf,
    pub dns_identity: DnsIdentity,
    /// Require file-sharing (`cifs/`) service principals.
    pub smb_enabled: bool,
    pub proxy: ProxySettings,
    /// Non-fatal configuration problems, logged by the caller.
    pub warnings: Vec<String>,
}

impl Settings {
    /// Resolve configuration from an environment snapshot.
    pub fn from_env(env: &EnvMap) -> Result<Self, ConfigError> {
        let user = required(env, ENV_ADMIN_USER)?;
        let password = required(env, ENV_ADMIN_PASSWORD)?;
        let realm = required(env, ENV_REALM)?.to_ascii_uppercase();
        let hostname = required(env, ENV_HOSTNAME)?;

        let domain = optional(env, ENV_DOMAIN)
            .map(|d| d.to_ascii_lowercase())
            .unwrap_or_else(|| default_domain(&realm));
        let workgroup = optional(env, ENV_WORKGROUP)
            .map(|w| w.to_ascii_uppercase())
            .unwrap_or_else(|| default_workgroup(&realm));

        let kdcs = optional(env, ENV_KDC)
            .map(|list| list.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let realm = RealmIdentity {
            realm,
            domain,
            workgroup,
            kdcs,
            ticket_lifetime: optional(env, ENV_TICKET_LIFETIME)
                .unwrap_or_else(|| DEFAULT_TICKET_LIFETIME.to_string()),
            renew_lifetime: optional(env, ENV_RENEW_LIFETIME)
                .unwrap_or_else(|| DEFAULT_RENEW_LIFETIME.to_string()),
            dns_lookup_kdc: flag(env, ENV_DNS_LOOKUP_KDC, true)?,
            dns_lookup_realm: flag(env, ENV_DNS_LOOKUP_REALM, false)?,
            forwardable: flag(env, ENV_FORWARDABLE, true)?,
            rdns: flag(env, ENV_RDNS, false)?,
        };

        let krb5_config = match optional(env, ENV_KRB5_CONFIG) {
            Some(value) if value.ends_with('/') || Path::new(&value).is_dir() => {
                PathBuf::from(value).join("krb5.conf")
            }
            Some(value) => PathBuf::from(value),
            None => PathBuf::from(DEFAULT_KRB5_CONFIG),
        };

        let keytab = match optional(env, ENV_KEYTAB) {
            Some(value) => parse_keytab_location(&value)?,
            None => PathBuf::from(DEFAULT_KEYTAB),
        };

        let samba_config = optional(env, ENV_SAMBA_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAMBA_CONFIG));

        let mut warnings = Vec::new();
        let dns_identity = match (optional(env, ENV_HOST_IP), optional(env, ENV_HOST_NAME)) {
            (Some(address), Some(name)) => DnsIdentity::External { address, name },
            (None, None) => DnsIdentity::Local,
            (Some(_), None) | (None, Some(_)) => {
                warnings.push(format!(
                    "{ENV_HOST_IP} and {ENV_HOST_NAME} must be set together; registering local identity"
                ));
                DnsIdentity::Local
            }
        };

        let hostname = short_hostname(&hostname);
        if hostname.len() > NETBIOS_NAME_MAX {
            warnings.push(format!(
                "hostname {hostname} is longer than {NETBIOS_NAME_MAX} characters; \
                 the machine account will be {}",
                machine_name_of(&hostname)
            ));
        }

        let port = match optional(env, ENV_PROXY_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                field: ENV_PROXY_PORT,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PROXY_PORT,
        };
        let socket = optional(env, ENV_PROXY_SOCKET)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROXY_SOCKET));

        Ok(Self {
            admin: AdminCredentials {
                user,
                password: Zeroizing::new(password),
            },
            realm,
            hostname,
            krb5_config,
            keytab,
            samba_config,
            dns_identity,
            smb_enabled: flag(env, ENV_ENABLE_SMB, false)?,
            proxy: ProxySettings { port, socket },
            warnings,
        })
    }

    /// Name of the machine account as the directory sees it: the short
    /// hostname cut to the NetBIOS limit, lowercase. Service principals and
    /// the DNS registration use this, not the raw hostname.
    pub fn machine_name(&self) -> String {
        machine_name_of(&self.hostname)
    }

    /// Fully qualified machine name: `<machine name>.<domain>`.
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.machine_name(), self.realm.domain)
    }

    /// NetBIOS machine name: the machine name in uppercase.
    pub fn netbios_name(&self) -> String {
        self.machine_name().to_ascii_uppercase()
    }

    /// `user@REALM` form of the administrator principal.
    pub fn admin_principal(&self) -> String {
        if self.admin.user.contains('@') {
            self.admin.user.clone()
        } else {
            format!("{}@{}", self.admin.user, self.realm.realm)
        }
    }
}

/// Domain default: the realm in lowercase.
pub fn default_domain(realm: &str) -> String {
    realm.to_ascii_lowercase()
}

/// Workgroup default: the first dot-separated label of the realm.
///
/// For multi-label realms such as `CHILD.PARENT.COM` this yields `CHILD`,
/// which may not be the actual NetBIOS domain name. Set `SAMBA_WORKGROUP`
/// explicitly in that case.
pub fn default_workgroup(realm: &str) -> String {
    realm
        .split('.')
        .next()
        .unwrap_or(realm)
        .to_ascii_uppercase()
}

fn short_hostname(hostname: &str) -> String {
    hostname
        .split('.')
        .next()
        .unwrap_or(hostname)
        .to_ascii_lowercase()
}

fn machine_name_of(hostname: &str) -> String {
    hostname.chars().take(NETBIOS_NAME_MAX).collect()
}

/// Strip the storage-type prefix from a keytab location.
fn parse_keytab_location(value: &str) -> Result<PathBuf, ConfigError> {
    let prefix_len = KEYTAB_FILE_PREFIX.len();
    let has_prefix = value.len() > prefix_len
        && value[..prefix_len].eq_ignore_ascii_case(KEYTAB_FILE_PREFIX);
    if !has_prefix {
        return Err(ConfigError::Invalid {
            field: ENV_KEYTAB,
            reason: format!("expected {KEYTAB_FILE_PREFIX}<path>, got {value:?}"),
        });
    }
    Ok(PathBuf::from(&value[prefix_len..]))
}

fn optional(env: &EnvMap, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(env: &EnvMap, key: &'static str) -> Result<String, ConfigError> {
    optional(env, key).ok_or(ConfigError::Missing(key))
}

fn flag(env: &EnvMap, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = optional(env, key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            field: key,
            reason: format!("expected a boolean, got {raw:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> EnvMap {
        [
            (ENV_ADMIN_USER, "administrator"),
            (ENV_ADMIN_PASSWORD, "s3cret"),
            (ENV_REALM, "EXAMPLE.COM"),
            (ENV_HOSTNAME, "Files01"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn with(mut env: EnvMap, key: &str, value: &str) -> EnvMap {
        env.insert(key.to_string(), value.to_string());
        env
    }

    #[test]
    fn defaults_fill_in() {
        let s = Settings::from_env(&base_env()).unwrap();
        assert_eq!(s.realm.realm, "EXAMPLE.COM");
        assert_eq!(s.realm.domain, "example.com");
        assert_eq!(s.realm.workgroup, "EXAMPLE");
        assert!(s.realm.kdcs.is_empty());
        assert_eq!(s.realm.ticket_lifetime, "24h");
        assert_eq!(s.realm.renew_lifetime, "7d");
        assert!(s.realm.dns_lookup_kdc);
        assert!(!s.realm.dns_lookup_realm);
        assert!(s.realm.forwardable);
        assert!(!s.realm.rdns);
        assert_eq!(s.keytab, PathBuf::from("/etc/krb5.keytab"));
        assert_eq!(s.krb5_config, PathBuf::from("/etc/krb5.conf"));
        assert_eq!(s.dns_identity, DnsIdentity::Local);
        assert_eq!(s.proxy.port, DEFAULT_PROXY_PORT);
        assert!(!s.smb_enabled);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn each_required_field_is_reported() {
        for key in [ENV_ADMIN_USER, ENV_ADMIN_PASSWORD, ENV_REALM] {
            let mut env = base_env();
            env.remove(key);
            let err = Settings::from_env(&env).unwrap_err();
            assert_eq!(err, ConfigError::Missing(key));
        }
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let env = with(base_env(), ENV_ADMIN_PASSWORD, "   ");
        assert_eq!(
            Settings::from_env(&env).unwrap_err(),
            ConfigError::Missing(ENV_ADMIN_PASSWORD)
        );
    }

    #[test]
    fn workgroup_is_first_realm_label() {
        assert_eq!(default_workgroup("EXAMPLE.COM"), "EXAMPLE");
    }

    #[test]
    fn multi_label_realm_keeps_naive_workgroup() {
        let env = with(base_env(), ENV_REALM, "CHILD.PARENT.COM");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.realm.workgroup, "CHILD");
        assert_eq!(s.realm.domain, "child.parent.com");
    }

    #[test]
    fn explicit_overrides_win() {
        let env = with(base_env(), ENV_REALM, "CHILD.PARENT.COM");
        let env = with(env, ENV_WORKGROUP, "parent");
        let env = with(env, ENV_DOMAIN, "Corp.Parent.com");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.realm.workgroup, "PARENT");
        assert_eq!(s.realm.domain, "corp.parent.com");
    }

    #[test]
    fn realm_is_uppercased() {
        let env = with(base_env(), ENV_REALM, "example.com");
        assert_eq!(Settings::from_env(&env).unwrap().realm.realm, "EXAMPLE.COM");
    }

    #[test]
    fn kdc_list_preserves_order() {
        let env = with(base_env(), ENV_KDC, "dc2.example.com  dc1.example.com");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.realm.kdcs, vec!["dc2.example.com", "dc1.example.com"]);
    }

    #[test]
    fn keytab_override_strips_file_prefix() {
        let env = with(base_env(), ENV_KEYTAB, "FILE:/shared/krb5.keytab");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.keytab, PathBuf::from("/shared/krb5.keytab"));
    }

    #[test]
    fn keytab_override_without_prefix_is_rejected() {
        let env = with(base_env(), ENV_KEYTAB, "/shared/krb5.keytab");
        assert!(matches!(
            Settings::from_env(&env),
            Err(ConfigError::Invalid { field: ENV_KEYTAB, .. })
        ));
        let env = with(base_env(), ENV_KEYTAB, "MEMORY:cache");
        assert!(Settings::from_env(&env).is_err());
    }

    #[test]
    fn krb5_config_directory_override() {
        let env = with(base_env(), ENV_KRB5_CONFIG, "/shared/krb5/");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.krb5_config, PathBuf::from("/shared/krb5/krb5.conf"));

        let env = with(base_env(), ENV_KRB5_CONFIG, "/shared/custom.conf");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.krb5_config, PathBuf::from("/shared/custom.conf"));

        let dir = tempfile::tempdir().unwrap();
        let env = with(base_env(), ENV_KRB5_CONFIG, &dir.path().display().to_string());
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.krb5_config, dir.path().join("krb5.conf"));
    }

    #[test]
    fn host_identity_pair_switches_mode() {
        let env = with(base_env(), ENV_HOST_IP, "10.0.0.5");
        let env = with(env, ENV_HOST_NAME, "docker-host");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(
            s.dns_identity,
            DnsIdentity::External {
                address: "10.0.0.5".to_string(),
                name: "docker-host".to_string()
            }
        );
    }

    #[test]
    fn half_host_identity_warns_and_falls_back() {
        let env = with(base_env(), ENV_HOST_IP, "10.0.0.5");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.dns_identity, DnsIdentity::Local);
        assert_eq!(s.warnings.len(), 1);
    }

    #[test]
    fn flags_parse_and_reject_garbage() {
        let env = with(base_env(), ENV_RDNS, "Yes");
        assert!(Settings::from_env(&env).unwrap().realm.rdns);
        let env = with(base_env(), ENV_ENABLE_SMB, "1");
        assert!(Settings::from_env(&env).unwrap().smb_enabled);
        let env = with(base_env(), ENV_FORWARDABLE, "maybe");
        assert!(matches!(
            Settings::from_env(&env),
            Err(ConfigError::Invalid { field: ENV_FORWARDABLE, .. })
        ));
    }

    #[test]
    fn proxy_port_must_be_numeric() {
        let env = with(base_env(), ENV_PROXY_PORT, "9999");
        assert_eq!(Settings::from_env(&env).unwrap().proxy.port, 9999);
        let env = with(base_env(), ENV_PROXY_PORT, "http");
        assert!(Settings::from_env(&env).is_err());
    }

    #[test]
    fn hostname_forms() {
        let env = with(base_env(), ENV_HOSTNAME, "Files01.corp.example.com");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.hostname, "files01");
        assert_eq!(s.fqdn(), "files01.example.com");
        assert_eq!(s.netbios_name(), "FILES01");
    }

    #[test]
    fn long_hostname_uses_truncated_machine_name() {
        let env = with(base_env(), ENV_HOSTNAME, "FileServer-Prod-01.corp.example.com");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.hostname, "fileserver-prod-01");
        assert_eq!(s.machine_name(), "fileserver-prod");
        assert_eq!(s.netbios_name(), "FILESERVER-PROD");
        assert_eq!(s.fqdn(), "fileserver-prod.example.com");
        assert_eq!(s.warnings.len(), 1);
        assert!(s.warnings[0].contains("fileserver-prod"));
    }

    #[test]
    fn admin_principal_appends_realm_once() {
        let s = Settings::from_env(&base_env()).unwrap();
        assert_eq!(s.admin_principal(), "administrator@EXAMPLE.COM");
        let env = with(base_env(), ENV_ADMIN_USER, "ops@EXAMPLE.COM");
        let s = Settings::from_env(&env).unwrap();
        assert_eq!(s.admin_principal(), "ops@EXAMPLE.COM");
    }

    #[test]
    fn debug_output_redacts_password() {
        let s = Settings::from_env(&base_env()).unwrap();
        let debug = format!("{s:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }
}
