mod cli;
mod commands;

use std::time::Duration;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use adjoin_common::error::ExitCode;
use cli::{Cli, Command};

/// Maximum time to wait for orderly shutdown before forcing exit.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Brief pause after cancellation to let in-flight sessions complete.
pub(crate) const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

fn main() {
    let cli = Cli::parse();

    let log_guards = match init_logging(&cli) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e}");
            std::process::exit(ExitCode::Unknown.code());
        }
    };

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::Unknown
        }
    };
    tracing::debug!(code = code.code(), "Exiting: {}", code.description());

    // process::exit skips destructors; flush the log writers first.
    drop(log_guards);
    std::process::exit(code.code());
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    adjoin_config::dirs::ensure_state_dir(&cli.state_dir);

    match &cli.command {
        Command::Init => Ok(commands::init::init(&cli)),
        Command::Refresh => Ok(commands::refresh::refresh(&cli)),
        Command::Health => Ok(commands::health::health(&cli)),
        Command::Topology => commands::topology::topology(&cli),
        Command::Status(args) => commands::status::status(&cli, args),
        Command::Reset(args) => commands::reset::reset(&cli, args),
        Command::Run(args) => {
            startup_diagnostics(&cli);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::run::run(&cli, args))
        }
        Command::Proxy => {
            startup_diagnostics(&cli);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::proxy::proxy())
        }
    }
}

// ── Daemon startup diagnostics ──────────────────────────────────────

fn startup_diagnostics(cli: &Cli) {
    tracing::info!("adjoin v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {}", std::env::consts::OS);

    match hostname::get() {
        Ok(h) => tracing::info!("Hostname: {}", h.to_string_lossy()),
        Err(e) => tracing::warn!(error = %e, "Could not determine hostname"),
    }

    tracing::info!("State directory: {}", cli.state_dir.display());
}

/// Install the global subscriber: non-blocking stderr, plus an append-mode
/// file when `--log-file` is set. The returned guards flush on drop.
fn init_logging(cli: &Cli) -> anyhow::Result<Vec<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::try_new(cli.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    // A container runtime may leave the stderr pipe unread; never block on it.
    let (stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let mut guards = vec![stderr_guard];

    let file_layer = match cli.log_file.as_deref() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            guards.push(guard);
            Some(fmt::layer().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(stderr))
        .with(file_layer)
        .init();

    Ok(guards)
}
