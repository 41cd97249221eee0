//! Read-only status views over observed cluster state

use super::resources::{APP_LABEL, APP_NAME_LABEL, MONITOR_LABEL};
use super::ReconcileError;
use crate::cluster::{ClusterApi, ClusterError};
use crate::model::application::{app_name_from_object_name, statefulset_name};
use futures::future::try_join_all;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Display format for timestamps in status payloads
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub name: String,
    pub phase: Option<String>,
    pub host_ip: Option<String>,
    pub pod_ip: Option<String>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub app_name: String,
    /// StatefulSet object name
    pub name: String,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub pods: Vec<PodStatus>,
}

/// `{app_name, created_at}` of one monitored application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSample {
    pub app_name: String,
    pub created_at: String,
}

/// Readiness of one monitored application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredApp {
    pub app_name: String,
    pub created_at: String,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub ready: bool,
}

#[derive(Debug, Error)]
pub enum HealthCheckError {
    /// A monitored app is not fully ready; carries which one
    #[error("{},{}", .0.app_name, .0.created_at)]
    Unhealthy(HealthSample),

    #[error("no monitored applications found")]
    NoMonitoredApps,

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Format a cluster timestamp as `YYYY-MM-DD HH:MM:SS` (UTC)
pub fn format_time(time: &Time) -> Option<String> {
    let value = serde_json::to_value(time).ok()?;
    let parsed = chrono::DateTime::parse_from_rfc3339(value.as_str()?).ok()?;
    Some(parsed.with_timezone(&chrono::Utc).format(TIME_FORMAT).to_string())
}

/// The app a StatefulSet belongs to
///
/// Reads the app-name label; objects created before the label existed fall
/// back to stripping the `-statefulset` suffix from the object name.
pub fn app_name_of(statefulset: &StatefulSet) -> String {
    statefulset
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(APP_NAME_LABEL))
        .cloned()
        .unwrap_or_else(|| {
            app_name_from_object_name(statefulset.metadata.name.as_deref().unwrap_or_default())
        })
}

/// Whether the StatefulSet's selector carries `monitor=true`
pub fn is_monitored(statefulset: &StatefulSet) -> bool {
    statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.as_ref())
        .and_then(|labels| labels.get(MONITOR_LABEL))
        .is_some_and(|value| value == "true")
}

/// (desired, ready) replica counts
pub fn replica_counts(statefulset: &StatefulSet) -> (i32, i32) {
    let desired = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = statefulset
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    (desired, ready)
}

fn created_at(statefulset: &StatefulSet) -> String {
    statefulset
        .metadata
        .creation_timestamp
        .as_ref()
        .and_then(format_time)
        .unwrap_or_default()
}

fn pod_status(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();
    PodStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status.and_then(|s| s.phase.clone()),
        host_ip: status.and_then(|s| s.host_ip.clone()),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        start_time: status
            .and_then(|s| s.start_time.as_ref())
            .and_then(format_time),
    }
}

pub struct StatusReporter {
    cluster: Arc<dyn ClusterApi>,
}

impl StatusReporter {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Status of one application's StatefulSet and its pods
    pub async fn get_status(&self, app_name: &str) -> Result<AppStatus, ReconcileError> {
        let statefulset = match self.cluster.get_statefulset(&statefulset_name(app_name)).await {
            Ok(sts) => sts,
            Err(e) if e.is_not_found() => {
                return Err(ReconcileError::NotFound(app_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self.describe(app_name.to_string(), &statefulset).await?)
    }

    /// Status of every StatefulSet in the namespace
    pub async fn get_all_status(&self) -> Result<Vec<AppStatus>, ReconcileError> {
        let statefulsets = self.cluster.list_statefulsets().await?;
        debug!(count = statefulsets.len(), "Listing status of all StatefulSets");

        let statuses = try_join_all(
            statefulsets
                .iter()
                .map(|sts| self.describe(app_name_of(sts), sts)),
        )
        .await?;

        Ok(statuses)
    }

    /// Single-app health signal over monitored StatefulSets
    ///
    /// Walks monitored StatefulSets in list order. The first one that is not
    /// fully ready is reported as [`HealthCheckError::Unhealthy`]; if all are
    /// ready the first one is returned. Callers wanting a verdict for every
    /// app should use [`StatusReporter::health_report`].
    pub async fn get_health(&self) -> Result<HealthSample, HealthCheckError> {
        let statefulsets = self.cluster.list_statefulsets().await?;
        let mut first = None;

        for sts in statefulsets.iter().filter(|sts| is_monitored(sts)) {
            let sample = HealthSample {
                app_name: app_name_of(sts),
                created_at: created_at(sts),
            };
            let (desired, ready) = replica_counts(sts);
            if desired != ready {
                warn!(
                    app = ?sample.app_name,
                    desired = desired,
                    ready = ready,
                    "Monitored application not ready"
                );
                return Err(HealthCheckError::Unhealthy(sample));
            }
            first.get_or_insert(sample);
        }

        first.ok_or(HealthCheckError::NoMonitoredApps)
    }

    /// Readiness of every monitored application
    pub async fn health_report(&self) -> Result<Vec<MonitoredApp>, ClusterError> {
        let statefulsets = self.cluster.list_statefulsets().await?;

        Ok(statefulsets
            .iter()
            .filter(|sts| is_monitored(sts))
            .map(|sts| {
                let (desired_replicas, ready_replicas) = replica_counts(sts);
                MonitoredApp {
                    app_name: app_name_of(sts),
                    created_at: created_at(sts),
                    desired_replicas,
                    ready_replicas,
                    ready: desired_replicas == ready_replicas,
                }
            })
            .collect())
    }

    async fn describe(
        &self,
        app_name: String,
        statefulset: &StatefulSet,
    ) -> Result<AppStatus, ClusterError> {
        let pods = self
            .cluster
            .list_pods(&format!("{}={}", APP_LABEL, app_name))
            .await?;
        let (desired_replicas, ready_replicas) = replica_counts(statefulset);

        Ok(AppStatus {
            name: statefulset.metadata.name.clone().unwrap_or_default(),
            app_name,
            desired_replicas,
            ready_replicas,
            pods: pods.iter().map(pod_status).collect(),
        })
    }
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
