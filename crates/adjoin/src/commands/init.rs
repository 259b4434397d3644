use std::sync::Arc;

use adjoin_common::error::ExitCode;
use adjoin_config::FileStateStore;
use adjoin_lifecycle::{Lifecycle, StartOutcome};

use crate::cli::Cli;
use crate::commands::{self, print_json};

/// Generate configuration and join (or verify) once.
pub fn init(cli: &Cli) -> ExitCode {
    let settings = match commands::load_settings() {
        Ok(settings) => Arc::new(settings),
        Err(e) => return commands::fail(&e),
    };
    let directory = commands::directory(&settings);
    let store = Arc::new(FileStateStore::new(&cli.state_dir));
    let mut lifecycle = Lifecycle::new(settings, directory, store, &cli.state_dir);

    match lifecycle.start() {
        Ok(outcome) => {
            report(cli, &lifecycle, &outcome);
            ExitCode::Success
        }
        Err(e) => {
            let code = commands::fail(&e);
            if cli.json {
                print_json(&serde_json::json!({
                    "state": lifecycle.state(),
                    "exit_code": code.code(),
                    "error": e.to_string(),
                }));
            }
            code
        }
    }
}

fn report(cli: &Cli, lifecycle: &Lifecycle, outcome: &StartOutcome) {
    if cli.json {
        let (result, detail) = match outcome {
            StartOutcome::Joined(record) => ("joined", serde_json::to_value(record).ok()),
            StartOutcome::Verified => ("verified", None),
            StartOutcome::Degraded(reason) => ("degraded", Some(serde_json::json!(reason))),
        };
        print_json(&serde_json::json!({
            "state": lifecycle.state(),
            "result": result,
            "detail": detail,
            "exit_code": 0,
        }));
        return;
    }

    match outcome {
        StartOutcome::Joined(record) => {
            println!("Joined {} as {}", record.realm, record.hostname);
        }
        StartOutcome::Verified => println!("Already initialized; membership verified"),
        StartOutcome::Degraded(reason) => {
            println!("Already initialized; membership test failed: {reason}");
        }
    }
}
