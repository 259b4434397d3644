//! adjoin health probe.
//!
//! Healthy means both: the keytab lists at least one principal, and the
//! machine account passes a live membership test. The probe keeps no state
//! and is cheap to call repeatedly; start-up grace belongs to the caller.

pub mod http;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use adjoin_common::capability::{Capability, CapabilityStatus};
use adjoin_directory::DirectoryClient;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("keytab check failed: {0}")]
    Keytab(String),

    #[error("membership check failed: {0}")]
    Membership(String),

    #[error("health probe did not complete: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub keytab: CheckResult,
    pub membership: CheckResult,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// The first failing check as an error, or the report itself.
    pub fn into_result(self) -> Result<Self, HealthError> {
        if !self.keytab.ok {
            return Err(HealthError::Keytab(self.keytab.detail));
        }
        if !self.membership.ok {
            return Err(HealthError::Membership(self.membership.detail));
        }
        Ok(self)
    }
}

impl Capability for HealthReport {
    fn name(&self) -> &str {
        "health"
    }

    fn status(&self) -> CapabilityStatus {
        let summary = if self.healthy {
            "healthy".to_string()
        } else {
            let failed: Vec<&str> = [
                (!self.keytab.ok).then_some(self.keytab.detail.as_str()),
                (!self.membership.ok).then_some(self.membership.detail.as_str()),
            ]
            .into_iter()
            .flatten()
            .collect();
            format!("unhealthy: {}", failed.join("; "))
        };
        CapabilityStatus::new(self.name(), summary, self.healthy)
            .with_detail(format!("keytab: {}", self.keytab.detail))
            .with_detail(format!("membership: {}", self.membership.detail))
    }
}

pub struct HealthProbe {
    directory: Arc<dyn DirectoryClient>,
}

impl HealthProbe {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory }
    }

    /// Run both checks. Blocks on the directory tools.
    pub fn check(&self) -> HealthReport {
        let keytab = match self.directory.list_keytab() {
            Ok(principals) if principals.is_empty() => CheckResult::fail("keytab lists no principals"),
            Ok(principals) => CheckResult::pass(format!("{} principals", principals.len())),
            Err(e) => CheckResult::fail(e.to_string()),
        };
        let membership = match self.directory.test_membership() {
            Ok(()) => CheckResult::pass("join is OK"),
            Err(e) => CheckResult::fail(e.to_string()),
        };
        let healthy = keytab.ok && membership.ok;
        if !healthy {
            tracing::debug!(keytab = %keytab.detail, membership = %membership.detail, "Health check failed");
        }
        HealthReport {
            healthy,
            keytab,
            membership,
            checked_at: Utc::now(),
        }
    }

    /// [`check`](Self::check) on the blocking pool.
    pub async fn check_async(self: &Arc<Self>) -> Result<HealthReport, HealthError> {
        let probe = Arc::clone(self);
        tokio::task::spawn_blocking(move || probe.check())
            .await
            .map_err(|e| HealthError::Aborted(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoin_directory::ScriptedDirectory;

    fn member() -> Arc<ScriptedDirectory> {
        let dir = ScriptedDirectory::new("files01", "files01.example.com").already_member();
        adjoin_directory::DirectoryClient::create_keytab(&dir).unwrap();
        Arc::new(dir)
    }

    #[test]
    fn healthy_when_both_checks_pass() {
        let probe = HealthProbe::new(member());
        let report = probe.check();
        assert!(report.healthy);
        assert_eq!(report.keytab.detail, "2 principals");
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn missing_keytab_is_unhealthy() {
        let dir = ScriptedDirectory::new("files01", "files01.example.com").already_member();
        let report = HealthProbe::new(Arc::new(dir)).check();
        assert!(!report.healthy);
        assert!(report.membership.ok);
        assert!(matches!(report.into_result(), Err(HealthError::Keytab(_))));
    }

    #[test]
    fn failed_membership_is_unhealthy() {
        let dir = member();
        dir.update_script(|s| s.membership = Err("NT_STATUS_TRUSTED_RELATIONSHIP_FAILURE".into()));
        let report = HealthProbe::new(dir).check();
        assert!(!report.healthy);
        let status = report.status();
        assert!(status.summary.contains("TRUSTED_RELATIONSHIP"));
        assert_eq!(status.details.len(), 2);
        assert!(status.details[1].starts_with("membership: "));
        assert!(matches!(report.into_result(), Err(HealthError::Membership(_))));
    }

    #[tokio::test]
    async fn async_check_runs_on_blocking_pool() {
        let probe = Arc::new(HealthProbe::new(member()));
        assert!(probe.check_async().await.unwrap().healthy);
    }
}
