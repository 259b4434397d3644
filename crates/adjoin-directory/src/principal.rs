//! Service principal names required on the machine account.

use adjoin_config::Settings;

/// Generic host service class. Registered implicitly by the domain join.
pub const HOST_SERVICE: &str = "host";

/// File-sharing service class.
pub const CIFS_SERVICE: &str = "cifs";

/// The principals this machine must carry, in short and fully-qualified form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipalSet {
    host: Vec<String>,
    file_sharing: Vec<String>,
}

impl ServicePrincipalSet {
    pub fn new(short: &str, fqdn: &str, file_sharing: bool) -> Self {
        let forms = |service: &str| vec![format!("{service}/{short}"), format!("{service}/{fqdn}")];
        Self {
            host: forms(HOST_SERVICE),
            file_sharing: if file_sharing {
                forms(CIFS_SERVICE)
            } else {
                Vec::new()
            },
        }
    }

    pub fn for_settings(settings: &Settings) -> Self {
        Self::new(&settings.machine_name(), &settings.fqdn(), settings.smb_enabled)
    }

    /// Host principals (short and fully qualified).
    pub fn host(&self) -> &[String] {
        &self.host
    }

    /// File-sharing principals; empty when file sharing is disabled.
    pub fn file_sharing(&self) -> &[String] {
        &self.file_sharing
    }

    /// Every required principal.
    pub fn required(&self) -> Vec<String> {
        self.host.iter().chain(&self.file_sharing).cloned().collect()
    }

    /// Required principals that do not appear in `listed`.
    pub fn missing_from(&self, listed: &[String]) -> Vec<String> {
        missing(&self.required(), listed)
    }

    /// File-sharing principals that do not appear in `listed`.
    pub fn file_sharing_missing_from(&self, listed: &[String]) -> Vec<String> {
        missing(&self.file_sharing, listed)
    }
}

fn missing(wanted: &[String], listed: &[String]) -> Vec<String> {
    let listed: Vec<String> = listed.iter().map(|p| normalize(p)).collect();
    wanted
        .iter()
        .filter(|w| !listed.contains(&normalize(w)))
        .cloned()
        .collect()
}

/// Compare principals case-insensitively and without the `@REALM` suffix.
pub fn normalize(principal: &str) -> String {
    principal
        .trim()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn host_only_without_file_sharing() {
        let set = ServicePrincipalSet::new("files01", "files01.example.com", false);
        assert_eq!(
            set.required(),
            strings(&["host/files01", "host/files01.example.com"])
        );
        assert!(set.file_sharing().is_empty());
    }

    #[test]
    fn file_sharing_adds_both_forms() {
        let set = ServicePrincipalSet::new("files01", "files01.example.com", true);
        assert_eq!(
            set.file_sharing(),
            strings(&["cifs/files01", "cifs/files01.example.com"]).as_slice()
        );
        assert_eq!(set.required().len(), 4);
    }

    #[test]
    fn matching_ignores_case_and_realm() {
        let set = ServicePrincipalSet::new("files01", "files01.example.com", true);
        let listed = strings(&[
            "HOST/FILES01@EXAMPLE.COM",
            "host/files01.example.com@EXAMPLE.COM",
            "cifs/files01.example.com@EXAMPLE.COM",
        ]);
        assert_eq!(set.missing_from(&listed), strings(&["cifs/files01"]));
        assert_eq!(set.file_sharing_missing_from(&listed), strings(&["cifs/files01"]));
    }

    #[test]
    fn long_hostname_uses_machine_account_name() {
        let mut env = adjoin_config::EnvMap::new();
        for (k, v) in [
            ("AD_ADMIN_USER", "Administrator"),
            ("AD_ADMIN_PASSWORD", "hunter2"),
            ("KRB5_REALM", "EXAMPLE.COM"),
            ("HOSTNAME", "fileserver-prod-01"),
        ] {
            env.insert(k.to_string(), v.to_string());
        }
        let settings = Settings::from_env(&env).unwrap();
        let set = ServicePrincipalSet::for_settings(&settings);

        assert_eq!(
            set.required(),
            strings(&["host/fileserver-prod", "host/fileserver-prod.example.com"])
        );
        // What the directory registers for the account FILESERVER-PROD$.
        let listed = strings(&[
            "HOST/FILESERVER-PROD@EXAMPLE.COM",
            "host/fileserver-prod.example.com@EXAMPLE.COM",
        ]);
        assert!(set.missing_from(&listed).is_empty());
    }

    #[test]
    fn superset_listing_has_nothing_missing() {
        let set = ServicePrincipalSet::new("files01", "files01.example.com", false);
        let listed = strings(&["host/files01", "host/files01.example.com", "FILES01$"]);
        assert!(set.missing_from(&listed).is_empty());
    }
}
