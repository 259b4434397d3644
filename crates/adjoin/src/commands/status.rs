//! Lifecycle status: marker, refresh schedule and, with `--check`, a live
//! membership test.

use std::path::PathBuf;

use serde::Serialize;

use adjoin_common::capability::{Capability, CapabilityStatus};
use adjoin_common::error::ExitCode;
use adjoin_config::{FileStateStore, Settings};
use adjoin_lifecycle::LifecycleSnapshot;

use crate::cli::{Cli, StatusArgs};
use crate::commands::{self, print_json};

#[derive(Serialize)]
struct StatusReport {
    version: String,
    state_dir: PathBuf,
    keytab: Option<PathBuf>,
    #[serde(flatten)]
    lifecycle: LifecycleSnapshot,
    capabilities: Vec<CapabilityStatus>,
}

pub fn status(cli: &Cli, args: &StatusArgs) -> anyhow::Result<ExitCode> {
    let settings = if args.check {
        match commands::load_settings() {
            Ok(settings) => Some(settings),
            Err(e) => return Ok(commands::fail(&e)),
        }
    } else {
        // Best effort: the keytab path is informational here.
        Settings::from_env(&commands::environment()).ok()
    };

    let membership = match (&settings, args.check) {
        (Some(settings), true) => Some(
            commands::directory(settings)
                .test_membership()
                .map_err(|e| e.to_string()),
        ),
        _ => None,
    };

    let store = FileStateStore::new(&cli.state_dir);
    let lifecycle = LifecycleSnapshot::load(&store, &cli.state_dir, membership)?;
    let report = StatusReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        state_dir: cli.state_dir.clone(),
        keytab: settings.map(|s| s.keytab),
        capabilities: vec![lifecycle.status()],
        lifecycle,
    };

    if cli.json {
        print_json(&report);
    } else {
        println!("adjoin v{}", report.version);
        println!("  State:   {}", report.state_dir.display());
        if let Some(keytab) = &report.keytab {
            println!("  Keytab:  {}", keytab.display());
        }
        for line in report.capabilities.iter().flat_map(CapabilityStatus::lines) {
            println!("  {line}");
        }
    }

    Ok(ExitCode::Success)
}
