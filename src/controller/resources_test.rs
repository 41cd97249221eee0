use super::*;
use crate::test_support::sample_config;

fn env_var<'a>(container: &'a Container, name: &str) -> &'a EnvVar {
    container
        .env
        .as_ref()
        .unwrap()
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("env var {} missing", name))
}

#[test]
fn test_secret_holds_credentials() {
    let secret = build_secret(&sample_config("orders"));

    assert_eq!(secret.metadata.name.as_deref(), Some("orders-secret"));
    assert_eq!(secret.type_.as_deref(), Some("Opaque"));
    let data = secret.string_data.unwrap();
    assert_eq!(data.get("DB_USER"), Some(&"tenant".to_string()));
    assert_eq!(data.get("DB_PASSWORD"), Some(&"hunter2".to_string()));
    assert_eq!(data.get("DB_NAME"), Some(&"orders".to_string()));
}

#[test]
fn test_config_map_has_no_credentials() {
    let config_map = build_config_map(&sample_config("orders"));

    assert_eq!(config_map.metadata.name.as_deref(), Some("orders-config"));
    let data = config_map.data.unwrap();
    assert_eq!(data.get("SERVICE_PORT"), Some(&"5432".to_string()));
    assert!(!data.values().any(|v| v == "hunter2"));
}

#[test]
fn test_statefulset_selector_carries_app_and_monitor() {
    let mut config = sample_config("orders");
    config.monitor = false;

    let sts = build_statefulset(&config);
    let spec = sts.spec.unwrap();

    let selector = spec.selector.match_labels.unwrap();
    assert_eq!(selector.get("app"), Some(&"orders".to_string()));
    assert_eq!(selector.get("monitor"), Some(&"false".to_string()));

    // Pod labels must be a superset of the selector
    let pod_labels = spec.template.metadata.unwrap().labels.unwrap();
    for (k, v) in &selector {
        assert_eq!(pod_labels.get(k), Some(v));
    }
    assert_eq!(pod_labels.get(APP_NAME_LABEL), Some(&"orders".to_string()));
    assert_eq!(spec.replicas, Some(2));
}

#[test]
fn test_statefulset_metadata_is_labelled_with_app_name() {
    let sts = build_statefulset(&sample_config("orders"));

    assert_eq!(sts.metadata.name.as_deref(), Some("orders-statefulset"));
    let labels = sts.metadata.labels.unwrap();
    assert_eq!(labels.get(APP_NAME_LABEL), Some(&"orders".to_string()));
    assert_eq!(labels.get(MANAGED_BY_LABEL), Some(&"kaas".to_string()));
}

#[test]
fn test_statefulset_env_references_secret_and_config_map() {
    let sts = build_statefulset(&sample_config("orders"));
    let pod_spec = sts.spec.unwrap().template.spec.unwrap();
    let container = &pod_spec.containers[0];

    assert_eq!(container.name, "orders-container");
    assert_eq!(container.image.as_deref(), Some("postgres:16"));

    let password = env_var(container, "POSTGRES_PASSWORD");
    assert_eq!(password.value, None, "credentials must not be inlined");
    let secret_ref = password
        .value_from
        .as_ref()
        .unwrap()
        .secret_key_ref
        .as_ref()
        .unwrap();
    assert_eq!(secret_ref.key, "DB_PASSWORD");

    let port = env_var(container, "SERVICE_PORT");
    let config_ref = port
        .value_from
        .as_ref()
        .unwrap()
        .config_map_key_ref
        .as_ref()
        .unwrap();
    assert_eq!(config_ref.key, "SERVICE_PORT");
}

#[test]
fn test_statefulset_carries_requested_resources() {
    let sts = build_statefulset(&sample_config("orders"));
    let resources = sts.spec.unwrap().template.spec.unwrap().containers[0]
        .resources
        .clone()
        .unwrap();

    let requests = resources.requests.unwrap();
    let limits = resources.limits.unwrap();
    assert_eq!(requests.get("cpu"), Some(&Quantity("500m".to_string())));
    assert_eq!(requests.get("memory"), Some(&Quantity("512Mi".to_string())));
    assert_eq!(limits.get("cpu"), Some(&Quantity("1".to_string())));
    assert_eq!(limits.get("memory"), Some(&Quantity("1Gi".to_string())));
}

#[test]
fn test_statefulset_storage_is_optional() {
    let sts = build_statefulset(&sample_config("orders"));
    let spec = sts.spec.unwrap();
    assert!(spec.volume_claim_templates.is_none());
    assert!(spec.template.spec.unwrap().containers[0].volume_mounts.is_none());

    let mut config = sample_config("orders");
    config.storage_size = Some("10Gi".to_string());
    let spec = build_statefulset(&config).spec.unwrap();

    let claims = spec.volume_claim_templates.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].metadata.name.as_deref(), Some(DATA_VOLUME));
    let mounts = spec.template.spec.unwrap().containers[0]
        .volume_mounts
        .clone()
        .unwrap();
    assert_eq!(mounts[0].mount_path, "/var/lib/postgresql/data");
}

#[test]
fn test_service_type_follows_external_access() {
    let internal = build_service(&sample_config("orders"));
    assert_eq!(internal.metadata.name.as_deref(), Some("orders-service"));
    assert_eq!(
        internal.spec.as_ref().unwrap().type_.as_deref(),
        Some("ClusterIP")
    );

    let mut config = sample_config("orders");
    config.external_access = true;
    let external = build_service(&config);
    let spec = external.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
    assert_eq!(
        spec.selector.unwrap().get("app"),
        Some(&"orders".to_string())
    );
    assert_eq!(spec.ports.unwrap()[0].port, 5432);
}

#[test]
fn test_ingress_routes_domain_to_service() {
    let mut config = sample_config("orders");
    config.external_access = true;

    let ingress = build_ingress(&config);

    assert_eq!(ingress.metadata.name.as_deref(), Some("orders-ingress"));
    let rule = &ingress.spec.unwrap().rules.unwrap()[0];
    assert_eq!(rule.host.as_deref(), Some("orders.example.com"));
    let path = &rule.http.as_ref().unwrap().paths[0];
    assert_eq!(path.path_type, "Prefix");
    let backend = path.backend.service.as_ref().unwrap();
    assert_eq!(backend.name, "orders-service");
    assert_eq!(backend.port.as_ref().unwrap().number, Some(5432));
}
