use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::HealthProbe;

/// `GET /healthz`: 200 `OK` when healthy, 503 with the report otherwise.
pub fn routes(probe: Arc<HealthProbe>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .layer(Extension(probe))
}

async fn healthz_handler(Extension(probe): Extension<Arc<HealthProbe>>) -> Response {
    match probe.check_async().await {
        Ok(report) if report.healthy => "OK".into_response(),
        Ok(report) => (StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "healthy": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Serve the health routes until `cancel` fires.
pub async fn serve(
    probe: Arc<HealthProbe>,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Health endpoint listening");
    serve_on(listener, probe, cancel).await
}

pub async fn serve_on(
    listener: tokio::net::TcpListener,
    probe: Arc<HealthProbe>,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    axum::serve(listener, routes(probe))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;
    tracing::debug!("Health endpoint stopped");
    Ok(())
}
