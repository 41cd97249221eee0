//! Health recorder
//!
//! Polls the control plane's `/health` endpoint once and folds the result
//! into the health store. There is no retry: an unreachable endpoint or a
//! malformed body fails the whole invocation and the next scheduled run
//! tries again.

use crate::store::{HealthRecord, HealthStore, Observation, ProbeOutcome, StoreError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("health endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed health response: {0}")]
    MalformedResponse(String),

    /// The endpoint failed for its own reasons instead of naming an app
    #[error("health endpoint returned {status}: {detail}")]
    Endpoint { status: u16, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse a `created_at` value as reported by the health endpoint
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// forms (taken as UTC).
pub fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn field<'a>(body: &'a Value, key: &str) -> Result<&'a str, RecorderError> {
    body.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RecorderError::MalformedResponse(format!("missing string field {:?}", key)))
}

/// Turn a health endpoint response into an observation
///
/// 200 carries `{app_name, created_at}` at the top level; anything else
/// carries it under `detail`, either as an object or as the
/// `"app_name,created_at"` string. A string detail whose second half is not
/// a timestamp is an error from the endpoint itself, not an unhealthy app.
pub fn observation_from_response(
    status: u16,
    body: &Value,
    observed_at: DateTime<Utc>,
) -> Result<Observation, RecorderError> {
    let (outcome, app_name, created_at) = if status == 200 {
        (
            ProbeOutcome::Success,
            field(body, "app_name")?,
            field(body, "created_at")?,
        )
    } else {
        let detail = body
            .get("detail")
            .ok_or_else(|| RecorderError::MalformedResponse("missing detail".to_string()))?;
        let (app_name, created_at) = match detail {
            Value::String(s) => s
                .split_once(',')
                .filter(|(app, created)| !app.is_empty() && parse_created_at(created).is_some())
                .ok_or_else(|| RecorderError::Endpoint {
                    status,
                    detail: s.clone(),
                })?,
            other => (field(other, "app_name")?, field(other, "created_at")?),
        };
        (ProbeOutcome::Failure, app_name, created_at)
    };

    let created_at = parse_created_at(created_at).ok_or_else(|| {
        RecorderError::MalformedResponse(format!("invalid created_at {:?}", created_at))
    })?;

    Ok(Observation {
        app_name: app_name.to_string(),
        created_at,
        outcome,
        observed_at,
    })
}

pub struct HealthRecorder {
    http: reqwest::Client,
    endpoint: String,
    store: Arc<dyn HealthStore>,
}

impl HealthRecorder {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, store: Arc<dyn HealthStore>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            store,
        }
    }

    /// Poll the endpoint once and record the outcome
    pub async fn poll_once(&self) -> Result<HealthRecord, RecorderError> {
        let response = self.http.get(&self.endpoint).send().await?;
        let status = response.status().as_u16();
        let body: Value = response.json().await?;

        let observation = observation_from_response(status, &body, Utc::now())?;
        let record = self.store.record(&observation).await?;

        info!(
            app = ?record.app_name,
            outcome = ?observation.outcome,
            success_count = record.success_count,
            failure_count = record.failure_count,
            "Health observation recorded"
        );
        Ok(record)
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod tests;
