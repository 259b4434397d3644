//! Keytab refresh task.
//!
//! Safe to run any number of times and independent of the initialization
//! marker: it re-checks the file-sharing principals (something else may
//! have removed them), regenerates the keytab so it carries the current
//! machine password, and verifies every required principal is in it.

use serde::Serialize;

use adjoin_config::Settings;
use adjoin_directory::{DirectoryClient, ServicePrincipalSet};

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    CheckCredentials,
    CheckPrincipals,
    RegenerateKeytab,
    VerifyKeytab,
}

impl RefreshStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckCredentials => "check-credentials",
            Self::CheckPrincipals => "check-principals",
            Self::RegenerateKeytab => "regenerate-keytab",
            Self::VerifyKeytab => "verify-keytab",
        }
    }
}

impl std::fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a successful refresh did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Principals that had gone missing and were registered again.
    pub reregistered: Vec<String>,
    /// Principals listed in the regenerated keytab.
    pub keytab_principals: Vec<String>,
}

impl RefreshReport {
    pub fn summary(&self) -> String {
        let mut summary = format!("{} principals in keytab", self.keytab_principals.len());
        if !self.reregistered.is_empty() {
            summary.push_str(&format!("; re-registered {}", self.reregistered.join(", ")));
        }
        summary
    }
}

pub fn run_refresh(
    settings: &Settings,
    directory: &dyn DirectoryClient,
) -> Result<RefreshReport, LifecycleError> {
    use RefreshStage::*;

    if settings.admin.user.trim().is_empty() || settings.admin.password.is_empty() {
        return Err(LifecycleError::refresh(
            CheckCredentials,
            "administrator credentials are not configured",
        ));
    }

    let spns = ServicePrincipalSet::for_settings(settings);
    let mut reregistered = Vec::new();

    if !spns.file_sharing().is_empty() {
        let listed = directory
            .list_principals()
            .map_err(|e| LifecycleError::refresh(CheckPrincipals, e.to_string()))?;
        let missing = spns.file_sharing_missing_from(&listed);
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "File-sharing principals missing; registering again");
            // Both forms are registered again, even if only one was lost.
            for spn in spns.file_sharing() {
                directory
                    .register_principal(spn)
                    .map_err(|e| LifecycleError::refresh(CheckPrincipals, e.to_string()))?;
            }
            let listed = directory
                .list_principals()
                .map_err(|e| LifecycleError::refresh(CheckPrincipals, e.to_string()))?;
            let still_missing = spns.file_sharing_missing_from(&listed);
            if !still_missing.is_empty() {
                return Err(LifecycleError::refresh(
                    CheckPrincipals,
                    format!("still not registered: {}", still_missing.join(", ")),
                ));
            }
            reregistered = spns.file_sharing().to_vec();
        }
    }

    directory
        .create_keytab()
        .map_err(|e| LifecycleError::refresh(RegenerateKeytab, e.to_string()))?;

    let keytab_principals = directory
        .list_keytab()
        .map_err(|e| LifecycleError::refresh(VerifyKeytab, e.to_string()))?;
    let missing = spns.missing_from(&keytab_principals);
    if !missing.is_empty() {
        return Err(LifecycleError::refresh(
            VerifyKeytab,
            format!("keytab is missing {}", missing.join(", ")),
        ));
    }

    Ok(RefreshReport {
        reregistered,
        keytab_principals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoin_config::EnvMap;
    use adjoin_directory::{Op, ScriptedDirectory};

    fn settings(smb: bool) -> Settings {
        let mut env = EnvMap::new();
        env.insert("AD_ADMIN_USER".into(), "Administrator".into());
        env.insert("AD_ADMIN_PASSWORD".into(), "hunter2".into());
        env.insert("KRB5_REALM".into(), "EXAMPLE.COM".into());
        env.insert("HOSTNAME".into(), "files01".into());
        if smb {
            env.insert("ENABLE_SMB".into(), "true".into());
        }
        Settings::from_env(&env).unwrap()
    }

    fn member() -> ScriptedDirectory {
        ScriptedDirectory::new("files01", "files01.example.com").already_member()
    }

    #[test]
    fn regenerates_keytab_with_host_principals() {
        let dir = member();
        let report = run_refresh(&settings(false), &dir).unwrap();
        assert!(report.reregistered.is_empty());
        assert_eq!(report.keytab_principals.len(), 2);
        assert!(!dir.called(&Op::ListPrincipals));
        assert!(dir.called(&Op::CreateKeytab));
    }

    #[test]
    fn missing_file_sharing_principals_are_registered_again() {
        let dir = member();
        dir.register_principal("cifs/files01.example.com").unwrap();
        dir.clear_calls();

        let report = run_refresh(&settings(true), &dir).unwrap();
        assert_eq!(report.reregistered.len(), 2);
        assert!(dir.called(&Op::RegisterPrincipal("cifs/files01".to_string())));
        assert!(dir.called(&Op::RegisterPrincipal("cifs/files01.example.com".to_string())));
        assert_eq!(report.keytab_principals.len(), 4);
    }

    #[test]
    fn registration_that_does_not_stick_fails() {
        let dir = member();
        dir.update_script(|s| s.ignore_registration = vec!["cifs/files01".to_string()]);
        let err = run_refresh(&settings(true), &dir).unwrap_err();
        assert!(err.to_string().contains("[refresh check-principals]"));
        assert!(!dir.called(&Op::CreateKeytab));
    }

    #[test]
    fn keytab_missing_a_file_sharing_form_fails() {
        let dir = member();
        dir.update_script(|s| s.keytab_omit = vec!["cifs/files01.example.com".to_string()]);
        let err = run_refresh(&settings(true), &dir).unwrap_err();
        match err {
            LifecycleError::Refresh { stage, cause } => {
                assert_eq!(stage, RefreshStage::VerifyKeytab);
                assert!(cause.contains("cifs/files01.example.com"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn keytab_creation_failure_is_reported() {
        let dir = member();
        dir.update_script(|s| s.keytab_create = Err("kvno mismatch".to_string()));
        let err = run_refresh(&settings(false), &dir).unwrap_err();
        assert!(err.to_string().starts_with("[refresh regenerate-keytab]"));
    }

    #[test]
    fn summary_mentions_reregistration() {
        let report = RefreshReport {
            reregistered: vec!["cifs/files01".to_string()],
            keytab_principals: vec!["host/files01".to_string(), "cifs/files01".to_string()],
        };
        assert_eq!(report.summary(), "2 principals in keytab; re-registered cifs/files01");
    }
}
