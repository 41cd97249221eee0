//! Health store bootstrap
//!
//! Brings up the primary/replica PostgreSQL pair behind the health record
//! store. Each object is created only when it is missing, so a second run
//! against a complete install creates nothing.

use super::resources::{
    config_map_env, resource_requirements, secret_env, MANAGED_BY, MANAGED_BY_LABEL,
};
use crate::cluster::{ClusterApi, ClusterError, ManagedObject, ObjectKind};
use crate::config::{BootstrapConfig, DatabaseRole};
use crate::model::application::ResourceQuantities;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec,
    Secret, Service, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// `app` label value shared by both database nodes
pub const STORE_APP: &str = "postgresql";

/// Label telling the primary and replica pods apart
pub const ROLE_LABEL: &str = "role";

pub const STORE_SECRET: &str = "postgresql-secret";
pub const STORE_CONFIG_MAP: &str = "postgresql-config";

/// Port both nodes listen and are exposed on
pub const STORE_PORT: i32 = 5432;

const DATA_MOUNT_PATH: &str = "/bitnami/postgresql";

const USERNAME_KEY: &str = "POSTGRESQL_USERNAME";
const PASSWORD_KEY: &str = "POSTGRESQL_PASSWORD";
const DATABASE_KEY: &str = "POSTGRESQL_DATABASE";
const REPLICATION_USER_KEY: &str = "POSTGRESQL_REPLICATION_USER";
const REPLICATION_PASSWORD_KEY: &str = "POSTGRESQL_REPLICATION_PASSWORD";
const MASTER_HOST_KEY: &str = "POSTGRESQL_MASTER_HOST";
const SLAVE_HOST_KEY: &str = "POSTGRESQL_SLAVE_HOST";

/// Node name used in object names and the replication mode
fn node(role: DatabaseRole) -> &'static str {
    match role {
        DatabaseRole::Primary => "master",
        DatabaseRole::Replica => "slave",
    }
}

pub fn statefulset_name(role: DatabaseRole) -> String {
    format!("{}-{}", STORE_APP, node(role))
}

pub fn service_name(role: DatabaseRole) -> String {
    format!("{}-{}-service", STORE_APP, node(role))
}

pub fn claim_name(role: DatabaseRole) -> String {
    format!("{}-{}-pvc", STORE_APP, node(role))
}

fn volume_name(role: DatabaseRole) -> String {
    format!("{}-{}-pv", STORE_APP, node(role))
}

fn role_labels(role: DatabaseRole) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), STORE_APP.to_string()),
        (ROLE_LABEL.to_string(), node(role).to_string()),
    ])
}

fn store_metadata(name: &str, mut labels: BTreeMap<String, String>) -> ObjectMeta {
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

fn store_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), STORE_APP.to_string())])
}

fn node_resources() -> ResourceQuantities {
    ResourceQuantities {
        cpu_request: "500m".to_string(),
        cpu_limit: "1".to_string(),
        memory_request: "512Mi".to_string(),
        memory_limit: "1Gi".to_string(),
    }
}

/// Credentials shared by both nodes
pub fn build_store_secret(config: &BootstrapConfig) -> Secret {
    Secret {
        metadata: store_metadata(STORE_SECRET, store_labels()),
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            (USERNAME_KEY.to_string(), config.username.clone()),
            (PASSWORD_KEY.to_string(), config.password.clone()),
            (DATABASE_KEY.to_string(), config.database.clone()),
            (REPLICATION_USER_KEY.to_string(), config.replication_user.clone()),
            (
                REPLICATION_PASSWORD_KEY.to_string(),
                config.replication_password.clone(),
            ),
        ])),
        ..Default::default()
    }
}

/// Host names of both nodes, as their Services resolve
pub fn build_store_config_map() -> ConfigMap {
    ConfigMap {
        metadata: store_metadata(STORE_CONFIG_MAP, store_labels()),
        data: Some(BTreeMap::from([
            (
                MASTER_HOST_KEY.to_string(),
                service_name(DatabaseRole::Primary),
            ),
            (SLAVE_HOST_KEY.to_string(), service_name(DatabaseRole::Replica)),
        ])),
        ..Default::default()
    }
}

/// Standalone claim holding one node's data directory
///
/// Created outside the StatefulSet so deleting a node keeps its data.
pub fn build_store_claim(role: DatabaseRole, config: &BootstrapConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: store_metadata(&claim_name(role), role_labels(role)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(config.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

/// Single-replica StatefulSet running one database node
///
/// The replica additionally learns the primary's host from the ConfigMap.
pub fn build_store_statefulset(role: DatabaseRole, config: &BootstrapConfig) -> StatefulSet {
    let labels = role_labels(role);
    let volume = volume_name(role);

    let mut env: Vec<EnvVar> = [
        USERNAME_KEY,
        PASSWORD_KEY,
        DATABASE_KEY,
        REPLICATION_USER_KEY,
        REPLICATION_PASSWORD_KEY,
    ]
    .into_iter()
    .map(|key| secret_env(key, STORE_SECRET, key))
    .collect();
    env.push(EnvVar {
        name: "POSTGRESQL_REPLICATION_MODE".to_string(),
        value: Some(node(role).to_string()),
        ..Default::default()
    });
    if role == DatabaseRole::Replica {
        env.push(config_map_env(MASTER_HOST_KEY, STORE_CONFIG_MAP, MASTER_HOST_KEY));
    }

    let container = Container {
        name: format!("{}-container", statefulset_name(role)),
        image: Some(config.image.clone()),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            container_port: STORE_PORT,
            ..Default::default()
        }]),
        resources: Some(resource_requirements(&node_resources())),
        volume_mounts: Some(vec![VolumeMount {
            name: volume.clone(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    StatefulSet {
        metadata: store_metadata(&statefulset_name(role), labels.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            service_name: service_name(role).into(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: volume,
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: claim_name(role),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// In-cluster Service selecting one node by role
pub fn build_store_service(role: DatabaseRole) -> Service {
    Service {
        metadata: store_metadata(&service_name(role), role_labels(role)),
        spec: Some(ServiceSpec {
            selector: Some(role_labels(role)),
            ports: Some(vec![ServicePort {
                port: STORE_PORT,
                target_port: Some(IntOrString::Int(STORE_PORT)),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Every object of the health store, in creation order
///
/// Credentials and claims come before the StatefulSets that mount them.
pub fn bootstrap_plan(config: &BootstrapConfig) -> Vec<ManagedObject> {
    let roles = [DatabaseRole::Primary, DatabaseRole::Replica];
    let mut plan = vec![
        ManagedObject::Secret(build_store_secret(config)),
        ManagedObject::ConfigMap(build_store_config_map()),
    ];
    plan.extend(
        roles
            .iter()
            .map(|role| ManagedObject::PersistentVolumeClaim(build_store_claim(*role, config))),
    );
    plan.extend(
        roles
            .iter()
            .map(|role| ManagedObject::StatefulSet(build_store_statefulset(*role, config))),
    );
    plan.extend(
        roles
            .iter()
            .map(|role| ManagedObject::Service(build_store_service(*role))),
    );
    plan
}

/// What one bootstrap run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created: Vec<(ObjectKind, String)>,
    pub existing: Vec<(ObjectKind, String)>,
}

impl BootstrapReport {
    /// Nothing was missing
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

/// Creates whatever part of the health store is missing
pub struct HealthStoreBootstrap {
    cluster: Arc<dyn ClusterApi>,
}

impl HealthStoreBootstrap {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Create each missing object in plan order
    ///
    /// Existing objects are left as they are. A create that loses a race
    /// with another run counts as existing. Any other error stops the run;
    /// whatever was already created stays, and the next run picks up from
    /// there.
    pub async fn ensure(&self, config: &BootstrapConfig) -> Result<BootstrapReport, ClusterError> {
        let mut report = BootstrapReport::default();

        for object in bootstrap_plan(config) {
            let entry = (object.kind(), object.name().to_string());

            if self.cluster.exists(object.kind(), object.name()).await? {
                debug!(kind = %entry.0, name = %entry.1, "Health store object present");
                report.existing.push(entry);
                continue;
            }

            match self.cluster.create(&object).await {
                Ok(()) => {
                    info!(kind = %entry.0, name = %entry.1, "Created health store object");
                    report.created.push(entry);
                }
                Err(ClusterError::AlreadyExists(_)) => {
                    info!(
                        kind = %entry.0,
                        name = %entry.1,
                        "Health store object created concurrently"
                    );
                    report.existing.push(entry);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod tests;
