//! Kubernetes probe endpoints
//!
//! - `/ready` - Readiness: initialised and the health store is reachable (503 otherwise)
//! - `/healthz` - Liveness (500 when marked unhealthy)
//! - `/start` - Startup: initialisation finished (500 otherwise)

use super::error::ApiError;
use super::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Flags {
    ready: AtomicBool,
    healthy: AtomicBool,
    started: AtomicBool,
    database_connected: AtomicBool,
}

/// Process-wide probe flags
///
/// Starts alive but not started/ready. The entry point flips the flags once
/// the cluster client and health store are set up; the setters are the only
/// mutation path.
#[derive(Debug, Clone)]
pub struct ProbeFlags {
    flags: Arc<Flags>,
}

impl ProbeFlags {
    pub fn new() -> Self {
        Self {
            flags: Arc::new(Flags {
                ready: AtomicBool::new(false),
                healthy: AtomicBool::new(true),
                started: AtomicBool::new(false),
                database_connected: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.flags.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.flags.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_started(&self, started: bool) {
        self.flags.started.store(started, Ordering::SeqCst);
    }

    pub fn set_database_connected(&self, connected: bool) {
        self.flags.database_connected.store(connected, Ordering::SeqCst);
    }

    /// Ready to serve: marked ready and the health store is connected
    pub fn is_ready(&self) -> bool {
        self.flags.ready.load(Ordering::SeqCst)
            && self.flags.database_connected.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self) -> bool {
        self.flags.healthy.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.flags.started.load(Ordering::SeqCst)
    }
}

impl Default for ProbeFlags {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) async fn ready(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.probes.is_ready() {
        Ok(Json(json!({"status": "ready"})))
    } else {
        Err(ApiError::ServiceUnavailable("Service not ready".to_string()))
    }
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.probes.is_healthy() {
        Ok(Json(json!({"status": "healthy"})))
    } else {
        Err(ApiError::Internal("Service not healthy".to_string()))
    }
}

pub(crate) async fn start(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.probes.is_started() {
        Ok(Json(json!({"status": "started"})))
    } else {
        Err(ApiError::Internal("Service not started".to_string()))
    }
}
