//! In-memory collaborators and fixtures shared by unit tests

#![allow(clippy::unwrap_used)]

use crate::cluster::{ClusterApi, ClusterError, ManagedObject, ObjectKind};
use crate::model::ApplicationConfig;
use crate::store::{HealthRecord, HealthStore, Observation, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

pub fn sample_config(app_name: &str) -> ApplicationConfig {
    ApplicationConfig {
        app_name: app_name.to_string(),
        replicas: 2,
        user: "tenant".to_string(),
        password: "hunter2".to_string(),
        db_name: "orders".to_string(),
        image_address: "postgres".to_string(),
        image_tag: "16".to_string(),
        domain_address: "orders.example.com".to_string(),
        service_port: 5432,
        external_access: false,
        monitor: true,
        cpu_request: "500m".to_string(),
        cpu_limit: "1".to_string(),
        memory_request: "512Mi".to_string(),
        memory_limit: "1Gi".to_string(),
        storage_size: None,
        storage_mount_path: None,
    }
}

/// StatefulSet as the API server would return it
///
/// `app_label` is the explicit app-name label; `None` mimics objects
/// created before the label existed.
pub fn statefulset_fixture(
    name: &str,
    app_label: Option<&str>,
    monitor: Option<&str>,
    replicas: i32,
    ready_replicas: i32,
) -> StatefulSet {
    let mut labels = serde_json::Map::new();
    if let Some(app) = app_label {
        labels.insert("kaas.io/app-name".to_string(), app.into());
    }
    let mut selector = serde_json::Map::new();
    selector.insert("app".to_string(), name.into());
    if let Some(monitor) = monitor {
        selector.insert("monitor".to_string(), monitor.into());
    }

    serde_json::from_value(serde_json::json!({
        "metadata": {
            "name": name,
            "namespace": "default",
            "labels": labels,
            "creationTimestamp": "2024-01-01T00:00:00Z",
            "resourceVersion": "1"
        },
        "spec": {
            "replicas": replicas,
            "serviceName": format!("{}-service", name),
            "selector": { "matchLabels": selector },
            "template": {
                "metadata": { "labels": selector },
                "spec": {
                    "containers": [{ "name": "db", "image": "postgres:16" }]
                }
            }
        },
        "status": {
            "replicas": replicas,
            "readyReplicas": ready_replicas
        }
    }))
    .unwrap()
}

pub fn pod_fixture(name: &str, app: &str, phase: &str, start_time: Option<&str>) -> Pod {
    serde_json::from_value(serde_json::json!({
        "metadata": {
            "name": name,
            "namespace": "default",
            "labels": { "app": app }
        },
        "status": {
            "phase": phase,
            "hostIP": "10.0.0.1",
            "podIP": "192.168.1.10",
            "startTime": start_time
        }
    }))
    .unwrap()
}

#[derive(Default)]
pub struct FakeState {
    pub statefulsets: Vec<StatefulSet>,
    pub objects: BTreeSet<(ObjectKind, String)>,
    pub pods: Vec<Pod>,
    pub created: Vec<(ObjectKind, String)>,
    pub deleted: Vec<(ObjectKind, String)>,
    pub replaced: Vec<StatefulSet>,
    pub get_error: Option<ClusterError>,
    pub list_error: Option<ClusterError>,
    pub create_errors: HashMap<ObjectKind, ClusterError>,
    /// Creates that are applied and then reported as failed
    pub applied_create_errors: HashMap<ObjectKind, ClusterError>,
    pub delete_errors: HashMap<ObjectKind, ClusterError>,
}

/// In-memory [`ClusterApi`] with failure injection
#[derive(Default)]
pub struct FakeCluster {
    pub state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statefulset(self, statefulset: StatefulSet) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let name = statefulset.metadata.name.clone().unwrap();
            state.objects.insert((ObjectKind::StatefulSet, name));
            state.statefulsets.push(statefulset);
        }
        self
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        self.state.lock().unwrap().pods.push(pod);
        self
    }

    pub fn fail_get(&self, error: ClusterError) {
        self.state.lock().unwrap().get_error = Some(error);
    }

    pub fn fail_list(&self, error: ClusterError) {
        self.state.lock().unwrap().list_error = Some(error);
    }

    pub fn fail_create(&self, kind: ObjectKind, error: ClusterError) {
        self.state.lock().unwrap().create_errors.insert(kind, error);
    }

    /// Apply the create, then return `error` as if the response was lost
    pub fn fail_create_after_apply(&self, kind: ObjectKind, error: ClusterError) {
        self.state
            .lock()
            .unwrap()
            .applied_create_errors
            .insert(kind, error);
    }

    pub fn fail_delete(&self, kind: ObjectKind, error: ClusterError) {
        self.state.lock().unwrap().delete_errors.insert(kind, error);
    }

    pub fn insert_object(&self, kind: ObjectKind, name: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((kind, name.to_string()));
    }

    pub fn has(&self, kind: ObjectKind, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .objects
            .contains(&(kind, name.to_string()))
    }

    pub fn created(&self) -> Vec<(ObjectKind, String)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<(ObjectKind, String)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn replaced(&self) -> Vec<StatefulSet> {
        self.state.lock().unwrap().replaced.clone()
    }

    pub fn statefulset(&self, name: &str) -> Option<StatefulSet> {
        self.state
            .lock()
            .unwrap()
            .statefulsets
            .iter()
            .find(|s| s.metadata.name.as_deref() == Some(name))
            .cloned()
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter_map(|term| term.split_once('='))
        .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_statefulset(&self, name: &str) -> Result<StatefulSet, ClusterError> {
        let state = self.state.lock().unwrap();
        if let Some(e) = &state.get_error {
            return Err(e.clone());
        }
        state
            .statefulsets
            .iter()
            .find(|s| s.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| {
                ClusterError::NotFound(format!("statefulsets.apps \"{}\" not found", name))
            })
    }

    async fn replace_statefulset(&self, statefulset: &StatefulSet) -> Result<StatefulSet, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let name = statefulset.metadata.name.clone();
        let slot = state
            .statefulsets
            .iter_mut()
            .find(|s| s.metadata.name == name)
            .ok_or_else(|| ClusterError::NotFound(format!("statefulsets.apps {:?} not found", name)))?;
        *slot = statefulset.clone();
        state.replaced.push(statefulset.clone());
        Ok(statefulset.clone())
    }

    async fn list_statefulsets(&self) -> Result<Vec<StatefulSet>, ClusterError> {
        let state = self.state.lock().unwrap();
        if let Some(e) = &state.list_error {
            return Err(e.clone());
        }
        Ok(state.statefulsets.clone())
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let state = self.state.lock().unwrap();
        if let Some(e) = &state.list_error {
            return Err(e.clone());
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| matches_selector(p, label_selector))
            .cloned()
            .collect())
    }

    async fn exists(&self, kind: ObjectKind, name: &str) -> Result<bool, ClusterError> {
        let state = self.state.lock().unwrap();
        if let Some(e) = &state.get_error {
            return Err(e.clone());
        }
        Ok(state.objects.contains(&(kind, name.to_string())))
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.create_errors.get(&object.kind()) {
            return Err(e.clone());
        }
        let key = (object.kind(), object.name().to_string());
        if state.objects.contains(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "{} {:?} already exists",
                key.0, key.1
            )));
        }
        if let ManagedObject::StatefulSet(sts) = object {
            state.statefulsets.push(sts.clone());
        }
        state.objects.insert(key.clone());
        state.created.push(key);
        if let Some(e) = state.applied_create_errors.get(&object.kind()) {
            return Err(e.clone());
        }
        Ok(())
    }

    async fn delete(&self, kind: ObjectKind, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.delete_errors.get(&kind) {
            return Err(e.clone());
        }
        let key = (kind, name.to_string());
        if !state.objects.remove(&key) {
            return Err(ClusterError::NotFound(format!("{} {:?} not found", kind, name)));
        }
        if kind == ObjectKind::StatefulSet {
            state
                .statefulsets
                .retain(|s| s.metadata.name.as_deref() != Some(name));
        }
        state.deleted.push(key);
        Ok(())
    }
}

/// In-memory [`HealthStore`]
#[derive(Default)]
pub struct MemoryHealthStore {
    pub records: Mutex<Vec<HealthRecord>>,
    pub fail: Mutex<bool>,
}

impl MemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, record: HealthRecord) -> Self {
        self.records.lock().unwrap().push(record);
        self
    }

    pub fn set_failing(&self) {
        *self.fail.lock().unwrap() = true;
    }

    fn check(&self) -> Result<(), StoreError> {
        if *self.fail.lock().unwrap() {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl HealthStore for MemoryHealthStore {
    async fn find(&self, app_name: &str) -> Result<Option<HealthRecord>, StoreError> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.app_name == app_name)
            .cloned())
    }

    async fn record(&self, observation: &Observation) -> Result<HealthRecord, StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.app_name == observation.app_name)
        {
            record.apply(observation);
            return Ok(record.clone());
        }
        let mut record = HealthRecord::first(observation);
        record.id = records.len() as i32 + 1;
        records.push(record.clone());
        Ok(record)
    }
}
