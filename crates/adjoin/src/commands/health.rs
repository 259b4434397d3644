use adjoin_common::capability::Capability;
use adjoin_common::error::ExitCode;
use adjoin_health::HealthProbe;

use crate::cli::Cli;
use crate::commands::{self, print_json};

/// Run the health probe once: exit 0 when healthy, 1 otherwise.
pub fn health(cli: &Cli) -> ExitCode {
    let settings = match commands::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::Unknown;
        }
    };
    let report = HealthProbe::new(commands::directory(&settings)).check();

    if cli.json {
        print_json(&report);
    } else {
        for line in report.status().lines() {
            println!("{line}");
        }
    }

    if report.healthy {
        ExitCode::Success
    } else {
        ExitCode::Unknown
    }
}
