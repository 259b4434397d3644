//! Lifecycle state machine.
//!
//! On every start the client configuration is regenerated and the
//! initialization marker decides the branch:
//!
//! - marker absent: run the thirteen-step join sequence under the lifecycle
//!   lock. The marker is written by the last step only, so any failure
//!   leaves the machine `Uninitialized` and a rerun starts from scratch.
//! - marker present: run the non-mutating membership test. A failure is
//!   reported as `Degraded` and never blocks startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use adjoin_common::capability::{Capability, CapabilityStatus};
use adjoin_common::error::ExitCode;
use adjoin_config::render::{write_krb5_conf, write_samba_conf};
use adjoin_config::{InitRecord, Settings, StateStore};
use adjoin_directory::{DirectoryClient, JoinResult, ServicePrincipalSet};

use crate::error::LifecycleError;
use crate::lock::LifecycleLock;
use crate::schedule::{RefreshOutcome, RefreshSchedule, REFRESH_INTERVAL};

/// Number of steps in the join sequence.
pub const STEP_COUNT: usize = 13;

/// Lines of realmd/winbind log attached to a failed realm join.
const SERVICE_LOG_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Joining,
    Initialized,
    /// Initialized, but the last membership test failed.
    Degraded,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Joining => "joining",
            Self::Initialized => "initialized",
            Self::Degraded => "degraded",
        })
    }
}

/// The join sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ValidateConfiguration,
    DiscoverRealm,
    ResolveDns,
    ValidateCredentials,
    JoinRealm,
    ConfirmRealm,
    GenerateJoinConfig,
    JoinDomain,
    RegisterPrincipals,
    RegisterDns,
    CreateKeytab,
    ScheduleRefresh,
    PersistMarker,
}

impl Step {
    pub const ALL: [Step; STEP_COUNT] = [
        Step::ValidateConfiguration,
        Step::DiscoverRealm,
        Step::ResolveDns,
        Step::ValidateCredentials,
        Step::JoinRealm,
        Step::ConfirmRealm,
        Step::GenerateJoinConfig,
        Step::JoinDomain,
        Step::RegisterPrincipals,
        Step::RegisterDns,
        Step::CreateKeytab,
        Step::ScheduleRefresh,
        Step::PersistMarker,
    ];

    /// 1-based position in the sequence.
    pub fn number(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).map_or(0, |i| i + 1)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ValidateConfiguration => "validate-configuration",
            Self::DiscoverRealm => "discover-realm",
            Self::ResolveDns => "resolve-dns",
            Self::ValidateCredentials => "validate-credentials",
            Self::JoinRealm => "join-realm",
            Self::ConfirmRealm => "confirm-realm",
            Self::GenerateJoinConfig => "generate-join-config",
            Self::JoinDomain => "join-domain",
            Self::RegisterPrincipals => "register-principals",
            Self::RegisterDns => "register-dns",
            Self::CreateKeytab => "create-keytab",
            Self::ScheduleRefresh => "schedule-refresh",
            Self::PersistMarker => "persist-marker",
        }
    }

    /// Exit code reported when this step fails.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::ValidateConfiguration => ExitCode::MissingConfiguration,
            Self::DiscoverRealm | Self::ResolveDns => ExitCode::RealmDiscovery,
            Self::ValidateCredentials | Self::JoinRealm | Self::ConfirmRealm => {
                ExitCode::CredentialOrRealmJoin
            }
            Self::GenerateJoinConfig | Self::JoinDomain => ExitCode::DomainJoin,
            Self::RegisterPrincipals => ExitCode::ServicePrincipal,
            Self::RegisterDns => ExitCode::DnsRegistration,
            Self::CreateKeytab => ExitCode::KeytabCreation,
            Self::ScheduleRefresh | Self::PersistMarker => ExitCode::Unknown,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[step {}/{} {}]", self.number(), STEP_COUNT, self.name())
    }
}

/// How a start completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The join sequence ran and wrote the marker.
    Joined(InitRecord),
    /// Marker present and the membership test passed.
    Verified,
    /// Marker present but the membership test failed.
    Degraded(String),
}

pub struct Lifecycle {
    settings: Arc<Settings>,
    directory: Arc<dyn DirectoryClient>,
    store: Arc<dyn StateStore>,
    state_dir: PathBuf,
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new(
        settings: Arc<Settings>,
        directory: Arc<dyn DirectoryClient>,
        store: Arc<dyn StateStore>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            directory,
            store,
            state_dir: state_dir.into(),
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Regenerate the client configuration, then join or verify.
    pub fn start(&mut self) -> Result<StartOutcome, LifecycleError> {
        let krb5 = write_krb5_conf(&self.settings)?;
        tracing::info!(path = %krb5.display(), "Kerberos client configuration written");

        if self.store.is_initialized()? {
            return Ok(self.verify());
        }

        let _lock = LifecycleLock::acquire(&self.state_dir)?;
        // Re-check under the lock; a concurrent run may have finished.
        if self.store.is_initialized()? {
            tracing::info!("Marker appeared before the join started; verifying instead");
            return Ok(self.verify());
        }
        self.join().map(StartOutcome::Joined)
    }

    /// Membership test for an already-initialized machine.
    pub fn verify(&mut self) -> StartOutcome {
        match self.directory.test_membership() {
            Ok(()) => {
                self.transition(LifecycleState::Initialized);
                tracing::info!("Machine account membership verified");
                StartOutcome::Verified
            }
            Err(e) => {
                self.transition(LifecycleState::Degraded);
                tracing::warn!(
                    error = %e,
                    "Membership test failed; continuing with the existing keytab"
                );
                StartOutcome::Degraded(e.to_string())
            }
        }
    }

    fn join(&mut self) -> Result<InitRecord, LifecycleError> {
        self.transition(LifecycleState::Joining);
        let mut record = None;
        for step in Step::ALL {
            tracing::info!("{step} running");
            let result = match step {
                Step::PersistMarker => match self.persist_marker() {
                    Ok(r) => {
                        record = Some(r);
                        Ok(())
                    }
                    Err(e) => {
                        // No marker means the next start joins afresh; it
                        // must not find a schedule from this attempt.
                        self.discard_schedule();
                        Err(e)
                    }
                },
                other => self.run_step(other),
            };
            if let Err(e) = result {
                tracing::error!("{e}");
                self.transition(LifecycleState::Uninitialized);
                return Err(e);
            }
        }
        self.transition(LifecycleState::Initialized);
        record.ok_or_else(|| LifecycleError::step(Step::PersistMarker, "marker was not written"))
    }

    fn run_step(&self, step: Step) -> Result<(), LifecycleError> {
        let fail = |cause: String| LifecycleError::step(step, cause);
        let settings = &self.settings;
        let directory = self.directory.as_ref();

        match step {
            // `Settings::from_env` rejects blank values already; this guards
            // settings assembled elsewhere before anything touches the host.
            Step::ValidateConfiguration => {
                let required = [
                    ("AD_ADMIN_USER", settings.admin.user.as_str()),
                    ("AD_ADMIN_PASSWORD", settings.admin.password.as_str()),
                    ("KRB5_REALM", settings.realm.realm.as_str()),
                    ("HOSTNAME", settings.hostname.as_str()),
                ];
                if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
                    return Err(fail(format!("missing required configuration: {name}")));
                }
                Ok(())
            }
            Step::DiscoverRealm => directory.discover().map_err(|e| fail(e.to_string())),
            Step::ResolveDns => match directory.resolve_domain() {
                Ok(addrs) => {
                    tracing::debug!(domain = %settings.realm.domain, addresses = ?addrs, "Domain resolves");
                    Ok(())
                }
                Err(e) => {
                    for line in directory.dns_diagnostics() {
                        tracing::error!("{step} dns: {line}");
                    }
                    Err(fail(e.to_string()))
                }
            },
            Step::ValidateCredentials => directory
                .validate_credentials()
                .map_err(|e| fail(format!("administrator credentials rejected: {e}"))),
            Step::JoinRealm => match directory.join_realm() {
                JoinResult::Success => Ok(()),
                JoinResult::AlreadyJoined => {
                    tracing::info!(realm = %settings.realm.realm, "Already joined; continuing");
                    Ok(())
                }
                JoinResult::Failure(detail) => {
                    for line in detail.lines().filter(|l| !l.trim().is_empty()) {
                        tracing::error!("{step} output: {line}");
                    }
                    for line in directory.service_log_tail(SERVICE_LOG_LINES) {
                        tracing::error!("{step} log: {line}");
                    }
                    Err(fail(format!("could not join realm {}", settings.realm.realm)))
                }
            },
            Step::ConfirmRealm => match directory.realm_configured() {
                Ok(true) => Ok(()),
                Ok(false) => Err(fail(format!(
                    "{} is not listed as a configured realm after joining",
                    settings.realm.domain
                ))),
                Err(e) => Err(fail(e.to_string())),
            },
            Step::GenerateJoinConfig => {
                let path = write_samba_conf(settings).map_err(|e| fail(e.to_string()))?;
                tracing::info!(path = %path.display(), "Domain-join configuration written");
                Ok(())
            }
            Step::JoinDomain => {
                match directory.join_domain() {
                    JoinResult::Success | JoinResult::AlreadyJoined => {}
                    JoinResult::Failure(detail) => return Err(fail(detail.trim().to_string())),
                }
                directory
                    .domain_info()
                    .map_err(|e| fail(format!("joined but domain info query failed: {e}")))
            }
            Step::RegisterPrincipals => {
                let spns = ServicePrincipalSet::for_settings(settings);
                for spn in spns.file_sharing() {
                    directory
                        .register_principal(spn)
                        .map_err(|e| fail(format!("{spn}: {e}")))?;
                }
                let listed = directory.list_principals().map_err(|e| fail(e.to_string()))?;
                let missing = spns.missing_from(&listed);
                if !missing.is_empty() {
                    return Err(fail(format!("not registered: {}", missing.join(", "))));
                }
                Ok(())
            }
            Step::RegisterDns => directory
                .register_dns(&settings.dns_identity)
                .map_err(|e| fail(e.to_string())),
            Step::CreateKeytab => {
                directory.create_keytab().map_err(|e| fail(e.to_string()))?;
                let listed = directory.list_keytab().map_err(|e| fail(e.to_string()))?;
                if listed.is_empty() {
                    return Err(fail(format!("{} is empty", settings.keytab.display())));
                }
                let missing = ServicePrincipalSet::for_settings(settings).missing_from(&listed);
                if !missing.is_empty() {
                    return Err(LifecycleError::Step {
                        step,
                        code: ExitCode::ServicePrincipal,
                        cause: format!("keytab is missing {}", missing.join(", ")),
                    });
                }
                tracing::info!(principals = listed.len(), "Keytab verified");
                Ok(())
            }
            Step::ScheduleRefresh => {
                let schedule = RefreshSchedule::new(REFRESH_INTERVAL, Utc::now());
                schedule
                    .save(&self.state_dir)
                    .map_err(|e| fail(e.to_string()))?;
                tracing::info!(next_due = %schedule.next_due().to_rfc3339(), "Keytab refresh scheduled");
                Ok(())
            }
            Step::PersistMarker => self.persist_marker().map(|_| ()),
        }
    }

    fn persist_marker(&self) -> Result<InitRecord, LifecycleError> {
        let record = InitRecord::new(&self.settings.realm.realm, &self.settings.hostname);
        self.store
            .mark_initialized(&record)
            .map_err(|e| LifecycleError::step(Step::PersistMarker, e.to_string()))?;
        Ok(record)
    }

    fn discard_schedule(&self) {
        if let Err(e) = RefreshSchedule::clear(&self.state_dir) {
            tracing::warn!(error = %e, "Failed to remove refresh schedule");
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Lifecycle transition");
            self.state = next;
        }
    }
}

/// Point-in-time view of the persisted lifecycle state for `adjoin status`.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    pub marker: Option<InitRecord>,
    pub schedule: Option<RefreshSchedule>,
    pub membership_error: Option<String>,
}

impl LifecycleSnapshot {
    /// Read the marker and schedule. `membership` is the result of an
    /// optional membership test; `None` when none was run.
    pub fn load(
        store: &dyn StateStore,
        state_dir: &Path,
        membership: Option<Result<(), String>>,
    ) -> Result<Self, LifecycleError> {
        let initialized = store.is_initialized()?;
        let marker = store.marker().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Initialization marker unreadable");
            None
        });
        let schedule = RefreshSchedule::load(state_dir)?;
        let membership_error = membership.and_then(Result::err);
        let state = match (initialized, &membership_error) {
            (false, _) => LifecycleState::Uninitialized,
            (true, Some(_)) => LifecycleState::Degraded,
            (true, None) => LifecycleState::Initialized,
        };
        Ok(Self {
            state,
            marker,
            schedule,
            membership_error,
        })
    }
}

impl Capability for LifecycleSnapshot {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn status(&self) -> CapabilityStatus {
        let mut summary = self.state.to_string();
        if let Some(marker) = &self.marker {
            summary.push_str(&format!(
                " ({} as {}, since {})",
                marker.realm,
                marker.hostname,
                marker.initialized_at.to_rfc3339()
            ));
        }
        if let Some(schedule) = &self.schedule {
            summary.push_str(&format!("; next refresh {}", schedule.next_due().to_rfc3339()));
        }
        let mut status =
            CapabilityStatus::new(self.name(), summary, self.state == LifecycleState::Initialized);
        if let Some(schedule) = &self.schedule {
            if let Some(last) = schedule.last_run {
                let outcome = match &schedule.last_outcome {
                    Some(RefreshOutcome::Ok) | None => "ok".to_string(),
                    Some(RefreshOutcome::Failed(cause)) => format!("failed: {cause}"),
                };
                status = status.with_detail(format!("last refresh {} {outcome}", last.to_rfc3339()));
            }
        }
        if let Some(error) = &self.membership_error {
            status = status.with_detail(format!("membership: {error}"));
        }
        status
    }
}
