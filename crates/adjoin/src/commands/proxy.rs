use adjoin_common::error::ExitCode;
use adjoin_config::Settings;
use adjoin_proxy::{GatewayConfig, ProxyRuntime};
use adjoin_topology::{classify, IpCommand, TcpProbe};
use tokio_util::sync::CancellationToken;

use crate::commands;
use crate::{SHUTDOWN_DRAIN, SHUTDOWN_TIMEOUT};

/// Classify the local networks, then start the gateway with the resulting
/// allow-list. Topology is recomputed on every start.
pub(crate) async fn start_gateway(
    settings: &Settings,
    cancel: CancellationToken,
) -> anyhow::Result<ProxyRuntime> {
    let classification =
        tokio::task::spawn_blocking(|| classify(&IpCommand, &TcpProbe::default())).await??;

    for entry in classification.isolated() {
        tracing::info!(
            interface = %entry.interface.name,
            network = %entry.network,
            "Isolated network"
        );
    }
    tracing::info!(allow = %classification.allow_list.join(" "), "Gateway allow-list");

    let runtime = ProxyRuntime::start(
        GatewayConfig::from_settings(&settings.proxy),
        &settings.samba_config,
        &classification.allow_list,
        cancel,
    )
    .await?;
    Ok(runtime)
}

/// Run only the gateway until Ctrl+C or SIGTERM.
pub async fn proxy() -> anyhow::Result<ExitCode> {
    let settings = match commands::load_settings() {
        Ok(settings) => settings,
        Err(e) => return Ok(commands::fail(&e)),
    };

    let cancel = CancellationToken::new();
    let runtime = start_gateway(&settings, cancel.clone()).await?;

    commands::shutdown_signal().await;
    tracing::info!("Shutting down gateway");
    cancel.cancel();

    let shutdown = async {
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        runtime.shutdown().await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await.is_err() {
        tracing::warn!("Shutdown timed out after {:?}; forcing exit", SHUTDOWN_TIMEOUT);
    }
    Ok(ExitCode::Success)
}
