//! Refresh cadence, persisted so a restart does not reset it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use adjoin_common::{paths, persist};
use adjoin_config::Settings;
use adjoin_directory::DirectoryClient;

use crate::error::LifecycleError;
use crate::lock::LifecycleLock;
use crate::log::append_refresh;
use crate::refresh::{run_refresh, RefreshReport};

/// Refresh period: a quarter of AD's 30-day machine password rotation,
/// rounded down to a week.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How often the runner checks whether a refresh is due.
pub const RUNNER_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Ok,
    Failed(String),
}

/// Content of `refresh.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSchedule {
    pub interval_secs: u64,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_outcome: Option<RefreshOutcome>,
}

impl RefreshSchedule {
    pub fn new(interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval_secs: interval.as_secs(),
            scheduled_at: now,
            last_run: None,
            last_outcome: None,
        }
    }

    /// Next due time, measured from the last run (or from scheduling).
    pub fn next_due(&self) -> DateTime<Utc> {
        let base = self.last_run.unwrap_or(self.scheduled_at);
        let secs = i64::try_from(self.interval_secs).unwrap_or(i64::MAX);
        base.checked_add_signed(chrono::Duration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_due()
    }

    pub fn record(&mut self, now: DateTime<Utc>, outcome: RefreshOutcome) {
        self.last_run = Some(now);
        self.last_outcome = Some(outcome);
    }

    pub fn load(state_dir: &Path) -> Result<Option<Self>, std::io::Error> {
        persist::read_json_if_exists(&paths::schedule_path(state_dir))
    }

    pub fn save(&self, state_dir: &Path) -> Result<(), std::io::Error> {
        persist::write_json_pretty(&paths::schedule_path(state_dir), self)
    }

    pub fn clear(state_dir: &Path) -> Result<bool, std::io::Error> {
        persist::remove_if_exists(&paths::schedule_path(state_dir))
    }
}

/// Run the refresh task once under the lifecycle lock, then record the
/// outcome in the schedule and the refresh log.
///
/// This is the entrypoint for both the in-process runner and external
/// schedulers (`adjoin refresh`).
pub fn refresh_and_record(
    settings: &Settings,
    directory: &dyn DirectoryClient,
    state_dir: &Path,
) -> Result<RefreshReport, LifecycleError> {
    let _lock = LifecycleLock::acquire(state_dir)?;
    let result = run_refresh(settings, directory);
    let now = Utc::now();

    let (outcome, detail) = match &result {
        Ok(report) => (RefreshOutcome::Ok, report.summary()),
        Err(e) => (RefreshOutcome::Failed(e.to_string()), e.to_string()),
    };

    // The keytab has already been touched; losing the schedule must not
    // lose the outcome.
    let mut schedule = load_or_recreate(state_dir, now);
    schedule.record(now, outcome);
    if let Err(e) = schedule.save(state_dir) {
        tracing::warn!(error = %e, "Failed to save refresh schedule");
    }

    if let Err(e) = append_refresh(state_dir, result.is_ok(), &detail) {
        tracing::warn!(error = %e, "Failed to write refresh log");
    }
    result
}

/// The persisted schedule, or a fresh one when `refresh.json` is missing
/// or unreadable.
fn load_or_recreate(state_dir: &Path, now: DateTime<Utc>) -> RefreshSchedule {
    match RefreshSchedule::load(state_dir) {
        Ok(Some(schedule)) => schedule,
        Ok(None) => {
            tracing::warn!("Refresh schedule missing; recreating it");
            RefreshSchedule::new(REFRESH_INTERVAL, now)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Refresh schedule unreadable; recreating it");
            RefreshSchedule::new(REFRESH_INTERVAL, now)
        }
    }
}

/// Periodic driver for the refresh task inside the daemon.
pub struct RefreshRunner {
    settings: Arc<Settings>,
    directory: Arc<dyn DirectoryClient>,
    state_dir: Arc<Path>,
    check_every: Duration,
}

impl RefreshRunner {
    pub fn new(
        settings: Arc<Settings>,
        directory: Arc<dyn DirectoryClient>,
        state_dir: &Path,
    ) -> Self {
        Self {
            settings,
            directory,
            state_dir: Arc::from(state_dir),
            check_every: RUNNER_CHECK_INTERVAL,
        }
    }

    pub fn with_check_interval(mut self, every: Duration) -> Self {
        self.check_every = every;
        self
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.check_every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::debug!("Refresh runner stopped");
    }

    /// Run the refresh if the schedule says it is due. A missing or
    /// unreadable schedule counts as due. Returns whether it ran.
    pub async fn tick(&self) -> bool {
        match RefreshSchedule::load(&self.state_dir) {
            Ok(Some(schedule)) if !schedule.is_due(Utc::now()) => return false,
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!("No refresh schedule; refreshing now"),
            Err(e) => tracing::warn!(error = %e, "Failed to read refresh schedule; refreshing now"),
        }

        let settings = Arc::clone(&self.settings);
        let directory = Arc::clone(&self.directory);
        let state_dir = Arc::clone(&self.state_dir);
        let joined = tokio::task::spawn_blocking(move || {
            refresh_and_record(&settings, directory.as_ref(), &state_dir)
        })
        .await;

        match joined {
            Ok(Ok(report)) => tracing::info!(summary = %report.summary(), "Keytab refreshed"),
            Ok(Err(e)) => tracing::error!(error = %e, "Keytab refresh failed"),
            Err(e) => tracing::error!(error = %e, "Keytab refresh task panicked"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_refresh_is_due_one_interval_after_scheduling() {
        let now = Utc::now();
        let schedule = RefreshSchedule::new(REFRESH_INTERVAL, now);
        assert!(!schedule.is_due(now));
        assert!(!schedule.is_due(now + chrono::Duration::days(6)));
        assert!(schedule.is_due(now + chrono::Duration::days(7)));
    }

    #[test]
    fn last_run_moves_the_next_due_time() {
        let start = Utc::now();
        let mut schedule = RefreshSchedule::new(REFRESH_INTERVAL, start);
        let ran = start + chrono::Duration::days(7);
        schedule.record(ran, RefreshOutcome::Failed("kdc unreachable".to_string()));
        assert_eq!(schedule.next_due(), ran + chrono::Duration::days(7));
    }

    #[test]
    fn schedule_persists_in_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RefreshSchedule::load(dir.path()).unwrap().is_none());

        let mut schedule = RefreshSchedule::new(REFRESH_INTERVAL, Utc::now());
        schedule.record(Utc::now(), RefreshOutcome::Ok);
        schedule.save(dir.path()).unwrap();

        assert_eq!(RefreshSchedule::load(dir.path()).unwrap(), Some(schedule));
        assert!(RefreshSchedule::clear(dir.path()).unwrap());
        assert!(!RefreshSchedule::clear(dir.path()).unwrap());
    }

    #[test]
    fn unreadable_schedule_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(paths::schedule_path(dir.path()), "").unwrap();
        assert!(RefreshSchedule::load(dir.path()).is_err());

        let now = Utc::now();
        let schedule = load_or_recreate(dir.path(), now);
        assert_eq!(schedule, RefreshSchedule::new(REFRESH_INTERVAL, now));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(RefreshOutcome::Failed("boom".to_string())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["detail"], "boom");
    }
}
