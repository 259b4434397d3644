//! Daemon mode: join or verify, then keep the identity healthy until
//! signalled.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use adjoin_common::error::ExitCode;
use adjoin_config::FileStateStore;
use adjoin_health::HealthProbe;
use adjoin_lifecycle::{Lifecycle, RefreshRunner, StartOutcome};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, RunArgs};
use crate::commands::{self, proxy::start_gateway};
use crate::{SHUTDOWN_DRAIN, SHUTDOWN_TIMEOUT};

pub async fn run(cli: &Cli, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let settings = match commands::load_settings() {
        Ok(settings) => Arc::new(settings),
        Err(e) => return Ok(commands::fail(&e)),
    };
    let directory = commands::directory(&settings);
    let store = Arc::new(FileStateStore::new(&cli.state_dir));

    // ── Lifecycle ──────────────────────────────────────────────────
    // The directory tools block; keep them off the async workers.
    let mut lifecycle = Lifecycle::new(
        Arc::clone(&settings),
        Arc::clone(&directory),
        store,
        &cli.state_dir,
    );
    match tokio::task::spawn_blocking(move || lifecycle.start()).await? {
        Ok(StartOutcome::Joined(record)) => {
            tracing::info!(realm = %record.realm, hostname = %record.hostname, "Initialization complete");
        }
        Ok(StartOutcome::Verified) => {}
        Ok(StartOutcome::Degraded(_)) => {
            tracing::warn!("Starting with the existing keytab");
        }
        Err(e) => return Ok(commands::fail(&e)),
    }

    // ── Services ───────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let runner = RefreshRunner::new(Arc::clone(&settings), Arc::clone(&directory), &cli.state_dir);
    tasks.push(tokio::spawn(runner.run(cancel.clone())));

    if let Some(port) = args.http_port {
        let probe = Arc::new(HealthProbe::new(Arc::clone(&directory)));
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let c = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = adjoin_health::http::serve(probe, addr, c).await {
                tracing::error!(error = %e, "Health endpoint failed");
            }
        }));
    }

    let gateway = if args.proxy {
        match start_gateway(&settings, cancel.clone()).await {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                cancel.cancel();
                for task in tasks {
                    let _ = task.await;
                }
                return Err(e.context("credential gateway failed to start"));
            }
        }
    } else {
        None
    };

    tracing::info!("Ready. Press Ctrl+C to stop.");
    commands::shutdown_signal().await;

    // ── Ordered shutdown ───────────────────────────────────────────
    tracing::info!("Shutting down");
    cancel.cancel();

    let shutdown = async {
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        if let Some(runtime) = gateway {
            runtime.shutdown().await;
        }
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await.is_err() {
        tracing::warn!("Shutdown timed out after {:?}; forcing exit", SHUTDOWN_TIMEOUT);
    }

    Ok(ExitCode::Success)
}
