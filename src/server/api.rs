//! Control-plane HTTP handlers

use super::error::ApiError;
use super::metrics::SharedMetrics;
use super::AppState;
use crate::controller::status::{HealthCheckError, HealthSample, MonitoredApp};
use crate::controller::ReconcileError;
use crate::model::{ApplicationConfig, ResourceUpdateConfig};
use crate::store::HealthRecord;
use axum::extract::{Path, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

/// Count every request and time it
pub(crate) async fn track_requests(
    State(metrics): State<SharedMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    metrics.record_request(response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

pub(crate) async fn deploy_application(
    State(state): State<AppState>,
    Json(config): Json<ApplicationConfig>,
) -> Result<Json<MessageResponse>, ApiError> {
    config.validate()?;

    let outcome = state.reconciler.deploy(&config).await.map_err(|e| {
        error!(app = ?config.app_name, error = %e, "Deploy failed");
        // Every deploy failure is a client error, including races on creation
        ApiError::BadRequest(e.to_string())
    })?;

    info!(app = ?config.app_name, outcome = ?outcome, "Deploy finished");
    Ok(Json(MessageResponse {
        message: outcome.message(&config.app_name),
    }))
}

pub(crate) async fn update_resources(
    State(state): State<AppState>,
    Json(update): Json<ResourceUpdateConfig>,
) -> Result<Json<MessageResponse>, ApiError> {
    update.validate()?;

    state.reconciler.update_resources(&update).await?;

    Ok(Json(MessageResponse {
        message: format!("Resources for {} updated successfully", update.app_name),
    }))
}

/// Status of one app; failures come back as `{"error"}` with 200
pub(crate) async fn app_status(
    State(state): State<AppState>,
    Path(app_name): Path<String>,
) -> Json<Value> {
    match state.reporter.get_status(&app_name).await {
        Ok(status) => Json(json!(status)),
        Err(e @ ReconcileError::NotFound(_)) => Json(json!({ "error": e.to_string() })),
        Err(e) => {
            warn!(app = ?app_name, error = %e, "Status lookup failed");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

pub(crate) async fn all_status(State(state): State<AppState>) -> Json<Value> {
    match state.reporter.get_all_status().await {
        Ok(statuses) => Json(json!(statuses)),
        Err(e) => {
            warn!(error = %e, "Status listing failed");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthSample>, ApiError> {
    match state.reporter.get_health().await {
        Ok(sample) => Ok(Json(sample)),
        Err(HealthCheckError::Unhealthy(sample)) => Err(ApiError::Unhealthy(sample)),
        Err(e @ HealthCheckError::NoMonitoredApps) => Err(ApiError::NotFound(e.to_string())),
        Err(HealthCheckError::Cluster(e)) => Err(ApiError::BadRequest(e.to_string())),
    }
}

pub(crate) async fn health_report(
    State(state): State<AppState>,
) -> Result<Json<Vec<MonitoredApp>>, ApiError> {
    let report = state
        .reporter
        .health_report()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(report))
}

pub(crate) async fn health_record(
    State(state): State<AppState>,
    Path(app_name): Path<String>,
) -> Result<Json<HealthRecord>, ApiError> {
    let start = Instant::now();
    let result = state.store.find(&app_name).await;
    state
        .metrics
        .record_db_query(result.is_ok(), start.elapsed().as_secs_f64());

    match result {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::NotFound(format!(
            "Application {} not found",
            app_name
        ))),
        Err(e) => {
            error!(app = ?app_name, error = %e, "Health store query failed");
            Err(e.into())
        }
    }
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
