//! Config File Generator.
//!
//! The Kerberos client configuration is generated output: it is rewritten
//! from [`Settings`] on every process start and never merged with what was
//! on disk. The Samba configuration is only rendered right before the
//! domain join, plus the access directive patch applied by the gateway.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use adjoin_common::persist;

use crate::settings::Settings;

/// Winbind localauth plugin that maps Kerberos principals to Unix users.
pub const WINBIND_LOCALAUTH_MODULE: &str =
    "winbind:/usr/lib/x86_64-linux-gnu/samba/krb5/winbind_krb5_localauth.so";

const GENERATED_HEADER: &str = "# Generated by adjoin. Rewritten on every start; do not edit.\n";

const ACCESS_DIRECTIVE: &str = "hosts allow";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("generated file is empty after write: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("io error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render the Kerberos client configuration.
pub fn render_krb5_conf(settings: &Settings) -> String {
    let realm = &settings.realm;
    let mut out = String::from(GENERATED_HEADER);

    out.push_str("[libdefaults]\n");
    let _ = writeln!(out, "    default_realm = {}", realm.realm);
    let _ = writeln!(out, "    dns_lookup_kdc = {}", realm.dns_lookup_kdc);
    let _ = writeln!(out, "    dns_lookup_realm = {}", realm.dns_lookup_realm);
    let _ = writeln!(out, "    ticket_lifetime = {}", realm.ticket_lifetime);
    let _ = writeln!(out, "    renew_lifetime = {}", realm.renew_lifetime);
    let _ = writeln!(out, "    forwardable = {}", realm.forwardable);
    let _ = writeln!(out, "    rdns = {}", realm.rdns);
    let _ = writeln!(out, "    default_keytab_name = FILE:{}", settings.keytab.display());
    out.push('\n');

    // Without an explicit list the section is omitted so KDCs are found
    // through SRV records.
    if !realm.kdcs.is_empty() {
        out.push_str("[realms]\n");
        let _ = writeln!(out, "    {} = {{", realm.realm);
        for kdc in &realm.kdcs {
            let _ = writeln!(out, "        kdc = {kdc}");
        }
        let _ = writeln!(out, "        admin_server = {}", realm.kdcs[0]);
        out.push_str("    }\n\n");
    }

    out.push_str("[domain_realm]\n");
    let _ = writeln!(out, "    .{} = {}", realm.domain, realm.realm);
    let _ = writeln!(out, "    {} = {}", realm.domain, realm.realm);
    out.push('\n');

    out.push_str("[logging]\n");
    out.push_str("    default = FILE:/var/log/krb5libs.log\n");
    out.push_str("    kdc = FILE:/var/log/krb5kdc.log\n");
    out.push_str("    admin_server = FILE:/var/log/kadmind.log\n");
    out.push('\n');

    out.push_str("[plugins]\n");
    out.push_str("    localauth = {\n");
    let _ = writeln!(out, "        module = {WINBIND_LOCALAUTH_MODULE}");
    out.push_str("        enable_only = winbind\n");
    out.push_str("    }\n");

    out
}

/// Render the domain-join configuration.
///
/// `allow` is the gateway access allow-list; when present it becomes the
/// `hosts allow` directive enforced by the identity daemon.
pub fn render_samba_conf(settings: &Settings, allow: Option<&[String]>) -> String {
    let realm = &settings.realm;
    let mut out = String::from(GENERATED_HEADER);

    out.push_str("[global]\n");
    let _ = writeln!(out, "    workgroup = {}", realm.workgroup);
    let _ = writeln!(out, "    realm = {}", realm.realm);
    let _ = writeln!(out, "    netbios name = {}", settings.netbios_name());
    out.push_str("    security = ads\n");
    out.push_str("    kerberos method = secrets and keytab\n");
    let _ = writeln!(out, "    dedicated keytab file = FILE:{}", settings.keytab.display());
    out.push_str("    winbind use default domain = yes\n");
    out.push_str("    winbind enum users = no\n");
    out.push_str("    winbind enum groups = no\n");
    out.push_str("    winbind refresh tickets = yes\n");
    out.push_str("    idmap config * : backend = tdb\n");
    out.push_str("    idmap config * : range = 10000-999999\n");
    let _ = writeln!(
        out,
        "    idmap config {} : backend = rid",
        realm.workgroup
    );
    let _ = writeln!(
        out,
        "    idmap config {} : range = 1000000-1999999",
        realm.workgroup
    );
    out.push_str("    log file = /var/log/samba/log.%m\n");
    out.push_str("    log level = 1\n");
    if let Some(allow) = allow {
        let _ = writeln!(out, "    {ACCESS_DIRECTIVE} = {}", allow.join(" "));
    }

    out
}

/// Write the Kerberos client configuration, replacing any existing file.
pub fn write_krb5_conf(settings: &Settings) -> Result<PathBuf, RenderError> {
    let path = settings.krb5_config.clone();
    write_generated(&path, &render_krb5_conf(settings))?;
    tracing::debug!(path = %path.display(), "Kerberos client config written");
    Ok(path)
}

/// Write the domain-join configuration, replacing any existing file.
pub fn write_samba_conf(settings: &Settings) -> Result<PathBuf, RenderError> {
    let path = settings.samba_config.clone();
    write_generated(&path, &render_samba_conf(settings, None))?;
    tracing::debug!(path = %path.display(), "Domain-join config written");
    Ok(path)
}

/// Set the `hosts allow` directive in the `[global]` section of an
/// existing configuration, replacing a previous value. A missing file or
/// section is created.
pub fn apply_access_directive(path: &Path, allow: &[String]) -> Result<(), RenderError> {
    let existing = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(RenderError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let patched = patch_access_directive(&existing, allow);
    write_generated(path, &patched)?;
    tracing::info!(path = %path.display(), allow = %allow.join(" "), "Access directive applied");
    Ok(())
}

fn patch_access_directive(existing: &str, allow: &[String]) -> String {
    let directive = format!("    {ACCESS_DIRECTIVE} = {}", allow.join(" "));
    let mut lines: Vec<String> = Vec::new();
    let mut in_global = false;
    let mut global_header: Option<usize> = None;
    let mut replaced = false;

    for line in existing.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_global = trimmed.eq_ignore_ascii_case("[global]");
            if in_global {
                global_header = Some(lines.len());
            }
            lines.push(line.to_string());
            continue;
        }
        if in_global && is_access_directive(trimmed) {
            if !replaced {
                lines.push(directive.clone());
                replaced = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }

    if !replaced {
        match global_header {
            Some(idx) => lines.insert(idx + 1, directive),
            None => {
                lines.insert(0, directive);
                lines.insert(0, "[global]".to_string());
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn is_access_directive(line: &str) -> bool {
    let Some((key, _)) = line.split_once('=') else {
        return false;
    };
    let key: String = key.split_whitespace().collect::<Vec<_>>().join(" ");
    key.eq_ignore_ascii_case(ACCESS_DIRECTIVE) || key.eq_ignore_ascii_case("allow hosts")
}

fn write_generated(path: &Path, contents: &str) -> Result<(), RenderError> {
    let io_err = |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };
    persist::write_atomic(path, contents.as_bytes()).map_err(io_err)?;

    let written = std::fs::metadata(path).map_err(io_err)?;
    if written.len() == 0 {
        return Err(RenderError::EmptyOutput(path.to_path_buf()));
    }
    Ok(())
}
