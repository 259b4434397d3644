use std::path::{Path, PathBuf};

/// Default state directory (FHS variable state).
pub const DEFAULT_STATE_DIR: &str = "/var/lib/adjoin";

/// Default Kerberos client configuration path.
pub const DEFAULT_KRB5_CONFIG: &str = "/etc/krb5.conf";

/// Default keytab path.
pub const DEFAULT_KEYTAB: &str = "/etc/krb5.keytab";

/// Default domain-join (Samba) configuration path.
pub const DEFAULT_SAMBA_CONFIG: &str = "/etc/samba/smb.conf";

const MARKER_FILENAME: &str = "initialized.json";
const SCHEDULE_FILENAME: &str = "refresh.json";
const LOCK_FILENAME: &str = "lifecycle.lock";
const REFRESH_LOG_FILENAME: &str = "refresh.log";

/// Initialization marker. Its existence is the "already joined" guard.
pub fn marker_path(state_dir: &Path) -> PathBuf {
    state_dir.join(MARKER_FILENAME)
}

/// Persisted refresh schedule record.
pub fn schedule_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SCHEDULE_FILENAME)
}

/// Advisory lock taken around the join sequence and each refresh run.
pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILENAME)
}

/// Log directory.
pub fn log_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("logs")
}

/// Append-only refresh activity log.
pub fn refresh_log_path(state_dir: &Path) -> PathBuf {
    log_dir(state_dir).join(REFRESH_LOG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_files_live_under_state_dir() {
        let base = Path::new("/srv/adjoin");
        assert_eq!(marker_path(base), base.join("initialized.json"));
        assert_eq!(schedule_path(base), base.join("refresh.json"));
        assert_eq!(lock_path(base), base.join("lifecycle.lock"));
        assert_eq!(refresh_log_path(base), base.join("logs").join("refresh.log"));
    }
}
