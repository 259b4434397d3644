//! CLI command handlers.
//!
//! Handlers return the process exit code. Lifecycle failures are mapped to
//! their designated code here; anything else bubbles up as `anyhow` and
//! exits with the unknown-error code.

pub mod health;
pub mod init;
pub mod proxy;
pub mod refresh;
pub mod reset;
pub mod run;
pub mod status;
pub mod topology;

use std::ffi::OsString;
use std::sync::Arc;

use adjoin_common::error::ExitCode;
use adjoin_config::settings::ENV_HOSTNAME;
use adjoin_config::{EnvMap, Settings};
use adjoin_directory::{DirectoryClient, SambaDirectory};
use adjoin_lifecycle::LifecycleError;

/// Snapshot of the process environment, with `HOSTNAME` filled from the
/// system when the environment does not carry it.
pub(crate) fn environment() -> EnvMap {
    let mut env: EnvMap = std::env::vars().collect();
    fill_hostname(&mut env, hostname::get);
    env
}

fn fill_hostname(env: &mut EnvMap, lookup: impl FnOnce() -> std::io::Result<OsString>) {
    if env.get(ENV_HOSTNAME).is_some_and(|h| !h.trim().is_empty()) {
        return;
    }
    match lookup() {
        Ok(name) => {
            env.insert(ENV_HOSTNAME.to_string(), name.to_string_lossy().into_owned());
        }
        Err(e) => tracing::warn!(error = %e, "Could not determine hostname"),
    }
}

/// Resolve settings once for the whole process.
pub(crate) fn load_settings() -> Result<Settings, LifecycleError> {
    let settings = Settings::from_env(&environment())?;
    for warning in &settings.warnings {
        tracing::warn!("{warning}");
    }
    tracing::debug!(
        realm = %settings.realm.realm,
        hostname = %settings.hostname,
        smb = settings.smb_enabled,
        "Configuration resolved"
    );
    Ok(settings)
}

/// Production directory client for the resolved settings.
pub(crate) fn directory(settings: &Settings) -> Arc<dyn DirectoryClient> {
    Arc::new(SambaDirectory::new(settings.clone()))
}

/// Log a lifecycle failure and return its exit code.
///
/// Step failures were already logged by the state machine.
pub(crate) fn fail(e: &LifecycleError) -> ExitCode {
    if !matches!(e, LifecycleError::Step { .. }) {
        tracing::error!("{e}");
    }
    ExitCode::from(e)
}

/// Print a serializable value as JSON, handling serialization errors
/// gracefully instead of panicking.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize response: {e}"),
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_filled_when_absent() {
        let mut env = EnvMap::new();
        fill_hostname(&mut env, || Ok(OsString::from("files01")));
        assert_eq!(env.get(ENV_HOSTNAME).map(String::as_str), Some("files01"));
    }

    #[test]
    fn explicit_hostname_wins() {
        let mut env = EnvMap::new();
        env.insert(ENV_HOSTNAME.to_string(), "web02".to_string());
        fill_hostname(&mut env, || panic!("lookup must not run"));
        assert_eq!(env.get(ENV_HOSTNAME).map(String::as_str), Some("web02"));
    }

    #[test]
    fn blank_hostname_is_replaced() {
        let mut env = EnvMap::new();
        env.insert(ENV_HOSTNAME.to_string(), "  ".to_string());
        fill_hostname(&mut env, || Ok(OsString::from("files01")));
        assert_eq!(env.get(ENV_HOSTNAME).map(String::as_str), Some("files01"));
    }

    #[test]
    fn lookup_failure_leaves_env_untouched() {
        let mut env = EnvMap::new();
        fill_hostname(&mut env, || Err(std::io::Error::other("no uts namespace")));
        assert!(!env.contains_key(ENV_HOSTNAME));
    }

    #[test]
    fn missing_configuration_maps_to_code_2() {
        let e = LifecycleError::from(adjoin_config::ConfigError::Missing("AD_ADMIN_USER"));
        assert_eq!(fail(&e).code(), 2);
    }

    #[test]
    fn lock_contention_maps_to_code_1() {
        let e = LifecycleError::Locked("/var/lib/adjoin/lifecycle.lock".into());
        assert_eq!(fail(&e), ExitCode::Unknown);
    }
}
