use adjoin_common::error::ExitCode;
use adjoin_config::{FileStateStore, StateStore};
use adjoin_lifecycle::{LifecycleLock, RefreshSchedule};

use crate::cli::{Cli, ResetArgs};
use crate::commands;

/// Remove the initialization marker and refresh schedule.
///
/// The directory-side computer account is left alone; the next start joins
/// against it and treats "already joined" as success.
pub fn reset(cli: &Cli, args: &ResetArgs) -> anyhow::Result<ExitCode> {
    if !args.yes {
        eprintln!("Refusing to reset without --yes.");
        eprintln!(
            "The next start will run the full join sequence. Remove the computer \
             account in the directory first if this host should get a fresh one."
        );
        return Ok(ExitCode::Unknown);
    }

    let _lock = match LifecycleLock::acquire(&cli.state_dir) {
        Ok(lock) => lock,
        Err(e) => return Ok(commands::fail(&e)),
    };

    tracing::warn!(
        "Resetting initialization state; clean up the computer account in the directory \
         to avoid orphaned accounts"
    );
    let store = FileStateStore::new(&cli.state_dir);
    let had_marker = store.clear()?;
    let had_schedule = RefreshSchedule::clear(&cli.state_dir)?;
    tracing::info!(marker = had_marker, schedule = had_schedule, "Initialization state reset");

    if cli.json {
        commands::print_json(&serde_json::json!({
            "marker_removed": had_marker,
            "schedule_removed": had_schedule,
        }));
    } else if had_marker {
        println!("Initialization marker removed from {}", store.marker_path().display());
    } else {
        println!("No initialization marker in {}", cli.state_dir.display());
    }
    Ok(ExitCode::Success)
}
