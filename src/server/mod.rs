//! HTTP server for the control-plane API
//!
//! Provides:
//! - Deploy/update endpoints backed by the [`Reconciler`]
//! - Status and health endpoints backed by the [`StatusReporter`] and health store
//! - Kubernetes probes (`/ready`, `/healthz`, `/start`)
//! - Prometheus metrics (`/metrics`)

mod api;
mod error;
mod metrics;
mod probes;

pub use api::MessageResponse;
pub use error::ApiError;
pub use metrics::{create_metrics, ApiMetrics, SharedMetrics};
pub use probes::ProbeFlags;

use crate::controller::{Reconciler, StatusReporter};
use crate::store::HealthStore;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Handles shared by every request
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub reporter: Arc<StatusReporter>,
    pub store: Arc<dyn HealthStore>,
    pub probes: ProbeFlags,
    pub metrics: SharedMetrics,
}

/// Build the router with request metrics on every route
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/deploy-application", post(api::deploy_application))
        .route("/update-resources", post(api::update_resources))
        .route("/status/", get(api::all_status))
        .route("/status/{app_name}", get(api::app_status))
        .route("/health", get(api::health))
        .route("/health/{app_name}", get(api::health_record))
        .route("/health-report", get(api::health_report))
        .route("/ready", get(probes::ready))
        .route("/healthz", get(probes::healthz))
        .route("/start", get(probes::start))
        .route("/metrics", get(api::metrics))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            api::track_requests,
        ))
        .with_state(state)
}

/// Serve the API on an already bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .await
        .map_err(std::io::Error::other)
}

/// Run the API server on the specified port
///
/// Runs until the server is shut down.
pub async fn run_api_server(port: u16, state: AppState) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    // Log after successful bind - server is actually listening
    info!(port = %port, "API server listening");

    serve(listener, state).await
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_tests;

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_tests;
