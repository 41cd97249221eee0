//! Builders for the objects that make up an application's resource graph
//!
//! Every object is named by the suffix convention in
//! [`ObjectNames`](crate::model::application::ObjectNames) and
//! labelled with the owning app_name so status lookups never have to
//! decode it from a generated name.

use crate::model::application::ResourceQuantities;
use crate::model::ApplicationConfig;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    ResourceRequirements, Secret, SecretKeySelector, Service, ServicePort, ServiceSpec,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Pod selector label carrying the app_name
pub const APP_LABEL: &str = "app";

/// Pod selector label marking the workload for health aggregation
pub const MONITOR_LABEL: &str = "monitor";

/// Explicit app_name label on every managed object
pub const APP_NAME_LABEL: &str = "kaas.io/app-name";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "kaas";

/// Name of the per-replica data volume claim template
pub const DATA_VOLUME: &str = "data";

// Keys shared between the Secret/ConfigMap and the env references into them
const SECRET_USER_KEY: &str = "DB_USER";
const SECRET_PASSWORD_KEY: &str = "DB_PASSWORD";
const SECRET_DB_NAME_KEY: &str = "DB_NAME";
const CONFIG_APP_NAME_KEY: &str = "APP_NAME";
const CONFIG_DB_NAME_KEY: &str = "DB_NAME";
const CONFIG_PORT_KEY: &str = "SERVICE_PORT";

/// Labels placed on the metadata of every managed object
pub fn object_labels(app_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), app_name.to_string()),
        (APP_NAME_LABEL.to_string(), app_name.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
    ])
}

/// StatefulSet selector labels: `app` and the string-valued `monitor` flag
pub fn selector_labels(app_name: &str, monitor: bool) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), app_name.to_string()),
        (MONITOR_LABEL.to_string(), monitor.to_string()),
    ])
}

fn metadata(name: &str, app_name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(object_labels(app_name)),
        ..Default::default()
    }
}

pub fn resource_requirements(quantities: &ResourceQuantities) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(quantities.cpu_request.clone())),
            ("memory".to_string(), Quantity(quantities.memory_request.clone())),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(quantities.cpu_limit.clone())),
            ("memory".to_string(), Quantity(quantities.memory_limit.clone())),
        ])),
        ..Default::default()
    }
}

/// Opaque Secret holding the database credentials
pub fn build_secret(config: &ApplicationConfig) -> Secret {
    let names = config.names();
    Secret {
        metadata: metadata(&names.secret, &config.app_name),
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            (SECRET_USER_KEY.to_string(), config.user.clone()),
            (SECRET_PASSWORD_KEY.to_string(), config.password.clone()),
            (SECRET_DB_NAME_KEY.to_string(), config.db_name.clone()),
        ])),
        ..Default::default()
    }
}

/// ConfigMap holding the non-secret settings
pub fn build_config_map(config: &ApplicationConfig) -> ConfigMap {
    let names = config.names();
    ConfigMap {
        metadata: metadata(&names.config_map, &config.app_name),
        data: Some(BTreeMap::from([
            (CONFIG_APP_NAME_KEY.to_string(), config.app_name.clone()),
            (CONFIG_DB_NAME_KEY.to_string(), config.db_name.clone()),
            (CONFIG_PORT_KEY.to_string(), config.service_port.to_string()),
        ])),
        ..Default::default()
    }
}

/// Env var read from key `key` of Secret `secret`
pub(crate) fn secret_env(env_name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: env_name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string().into(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn config_map_env(env_name: &str, config_map: &str, key: &str) -> EnvVar {
    EnvVar {
        name: env_name.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_map.to_string().into(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// StatefulSet running the database container
///
/// Credentials and settings reach the container only through env
/// references, so rotating the Secret never touches this definition.
pub fn build_statefulset(config: &ApplicationConfig) -> StatefulSet {
    let names = config.names();
    let selector = selector_labels(&config.app_name, config.monitor);

    let mut pod_labels = selector.clone();
    pod_labels.insert(APP_NAME_LABEL.to_string(), config.app_name.clone());

    let volume_mounts = config.storage_size.as_ref().map(|_| {
        vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: config.storage_mount_path().to_string(),
            ..Default::default()
        }]
    });

    let volume_claim_templates = config.storage_size.as_ref().map(|size| {
        vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(DATA_VOLUME.to_string()),
                labels: Some(object_labels(&config.app_name)),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(size.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]
    });

    let container = Container {
        name: names.container.clone(),
        image: Some(config.image()),
        env: Some(vec![
            secret_env("DB_USER", &names.secret, SECRET_USER_KEY),
            secret_env("POSTGRES_PASSWORD", &names.secret, SECRET_PASSWORD_KEY),
            secret_env("DB_NAME", &names.secret, SECRET_DB_NAME_KEY),
            config_map_env("SERVICE_PORT", &names.config_map, CONFIG_PORT_KEY),
        ]),
        ports: Some(vec![ContainerPort {
            container_port: config.service_port,
            ..Default::default()
        }]),
        resources: Some(resource_requirements(&config.resources())),
        volume_mounts,
        ..Default::default()
    };

    StatefulSet {
        metadata: metadata(&names.statefulset, &config.app_name),
        spec: Some(StatefulSetSpec {
            replicas: Some(config.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            service_name: names.service.clone().into(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            volume_claim_templates,
            ..Default::default()
        }),
        status: None,
    }
}

/// Service giving the workload a stable network identity
///
/// `LoadBalancer` when external access is requested, `ClusterIP` otherwise.
pub fn build_service(config: &ApplicationConfig) -> Service {
    let names = config.names();
    let service_type = if config.external_access {
        "LoadBalancer"
    } else {
        "ClusterIP"
    };

    Service {
        metadata: metadata(&names.service, &config.app_name),
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                APP_LABEL.to_string(),
                config.app_name.clone(),
            )])),
            ports: Some(vec![ServicePort {
                port: config.service_port,
                target_port: Some(IntOrString::Int(config.service_port)),
                ..Default::default()
            }]),
            type_: Some(service_type.to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Ingress routing `domain_address` to the Service
pub fn build_ingress(config: &ApplicationConfig) -> Ingress {
    let names = config.names();
    Ingress {
        metadata: metadata(&names.ingress, &config.app_name),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(config.domain_address.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: names.service.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(config.service_port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
#[path = "resources_test.rs"]
mod tests;
