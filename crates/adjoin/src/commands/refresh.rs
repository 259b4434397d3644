use adjoin_common::error::ExitCode;
use adjoin_lifecycle::refresh_and_record;

use crate::cli::Cli;
use crate::commands::{self, print_json};

/// Run the keytab refresh once. Stable entrypoint for external schedulers.
pub fn refresh(cli: &Cli) -> ExitCode {
    let settings = match commands::load_settings() {
        Ok(settings) => settings,
        Err(e) => return commands::fail(&e),
    };
    let directory = commands::directory(&settings);

    match refresh_and_record(&settings, directory.as_ref(), &cli.state_dir) {
        Ok(report) => {
            tracing::info!("Keytab refreshed: {}", report.summary());
            if cli.json {
                print_json(&report);
            } else {
                println!("Keytab refreshed: {}", report.summary());
            }
            ExitCode::Success
        }
        Err(e) => {
            tracing::error!("{e}");
            if cli.json {
                print_json(&serde_json::json!({ "ok": false, "error": e.to_string() }));
            }
            // Refresh reports pass/fail only.
            ExitCode::Unknown
        }
    }
}
