//! Orchestration cluster seam
//!
//! Everything the control plane needs from the cluster goes through
//! [`ClusterApi`], so reconciliation and status logic can run against the
//! live API server or an in-memory fake.

mod client;

pub use client::KubeCluster;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use std::fmt;
use thiserror::Error;

/// Cluster API failures, classified by how callers react to them
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("Kubernetes API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Kubernetes API call timed out after {0}s")]
    Timeout(u64),

    #[error("Kubernetes client error: {0}")]
    Transport(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// The request may or may not have been applied by the API server
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, ClusterError::Timeout(_) | ClusterError::Transport(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(err) if err.code == 404 => ClusterError::NotFound(err.message.clone()),
            kube::Error::Api(err) if err.code == 409 && err.reason == "AlreadyExists" => {
                ClusterError::AlreadyExists(err.message.clone())
            }
            kube::Error::Api(err) => ClusterError::Api {
                code: err.code,
                message: err.message.clone(),
            },
            other => ClusterError::Transport(other.to_string()),
        }
    }
}

/// Kinds of object in an application's resource graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Secret,
    ConfigMap,
    StatefulSet,
    Service,
    Ingress,
    PersistentVolumeClaim,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ObjectKind::Secret => "Secret",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::StatefulSet => "StatefulSet",
            ObjectKind::Service => "Service",
            ObjectKind::Ingress => "Ingress",
            ObjectKind::PersistentVolumeClaim => "PersistentVolumeClaim",
        };
        f.write_str(kind)
    }
}

/// A fully built object ready to be created
#[derive(Debug, Clone)]
pub enum ManagedObject {
    Secret(Secret),
    ConfigMap(ConfigMap),
    StatefulSet(StatefulSet),
    Service(Service),
    Ingress(Ingress),
    PersistentVolumeClaim(PersistentVolumeClaim),
}

impl ManagedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::Secret(_) => ObjectKind::Secret,
            ManagedObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ManagedObject::StatefulSet(_) => ObjectKind::StatefulSet,
            ManagedObject::Service(_) => ObjectKind::Service,
            ManagedObject::Ingress(_) => ObjectKind::Ingress,
            ManagedObject::PersistentVolumeClaim(_) => ObjectKind::PersistentVolumeClaim,
        }
    }

    pub fn name(&self) -> &str {
        let name = match self {
            ManagedObject::Secret(o) => &o.metadata.name,
            ManagedObject::ConfigMap(o) => &o.metadata.name,
            ManagedObject::StatefulSet(o) => &o.metadata.name,
            ManagedObject::Service(o) => &o.metadata.name,
            ManagedObject::Ingress(o) => &o.metadata.name,
            ManagedObject::PersistentVolumeClaim(o) => &o.metadata.name,
        };
        name.as_deref().unwrap_or_default()
    }
}

/// Namespaced operations the control plane issues against the cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_statefulset(&self, name: &str) -> Result<StatefulSet, ClusterError>;

    async fn replace_statefulset(&self, statefulset: &StatefulSet) -> Result<StatefulSet, ClusterError>;

    async fn list_statefulsets(&self) -> Result<Vec<StatefulSet>, ClusterError>;

    /// List pods matching a label selector such as `app=orders`
    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>, ClusterError>;

    /// Whether an object of `kind` named `name` exists
    async fn exists(&self, kind: ObjectKind, name: &str) -> Result<bool, ClusterError>;

    async fn create(&self, object: &ManagedObject) -> Result<(), ClusterError>;

    async fn delete(&self, kind: ObjectKind, name: &str) -> Result<(), ClusterError>;
}

#[cfg(test)]
#[path = "cluster_test.rs"]
mod tests;
