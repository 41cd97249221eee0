use super::{ClusterApi, ClusterError, ManagedObject, ObjectKind};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// [`ClusterApi`] backed by the Kubernetes API server
///
/// Every call is bounded by `timeout` so a stalled API server surfaces as
/// an error instead of hanging the request.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
    timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            timeout,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(ClusterError::from),
            Err(_) => Err(ClusterError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_statefulset(&self, name: &str) -> Result<StatefulSet, ClusterError> {
        let api: Api<StatefulSet> = self.api();
        self.bounded(api.get(name)).await
    }

    async fn replace_statefulset(&self, statefulset: &StatefulSet) -> Result<StatefulSet, ClusterError> {
        let api: Api<StatefulSet> = self.api();
        let name = statefulset.metadata.name.as_deref().unwrap_or_default();
        self.bounded(api.replace(name, &PostParams::default(), statefulset))
            .await
    }

    async fn list_statefulsets(&self) -> Result<Vec<StatefulSet>, ClusterError> {
        let api: Api<StatefulSet> = self.api();
        let list = self.bounded(api.list(&ListParams::default())).await?;
        Ok(list.items)
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = self.api();
        let params = ListParams::default().labels(label_selector);
        let list = self.bounded(api.list(&params)).await?;
        Ok(list.items)
    }

    async fn exists(&self, kind: ObjectKind, name: &str) -> Result<bool, ClusterError> {
        let found = match kind {
            ObjectKind::Secret => self.bounded(self.api::<Secret>().get_opt(name)).await?.is_some(),
            ObjectKind::ConfigMap => self.bounded(self.api::<ConfigMap>().get_opt(name)).await?.is_some(),
            ObjectKind::StatefulSet => {
                self.bounded(self.api::<StatefulSet>().get_opt(name)).await?.is_some()
            }
            ObjectKind::Service => self.bounded(self.api::<Service>().get_opt(name)).await?.is_some(),
            ObjectKind::Ingress => self.bounded(self.api::<Ingress>().get_opt(name)).await?.is_some(),
            ObjectKind::PersistentVolumeClaim => self
                .bounded(self.api::<PersistentVolumeClaim>().get_opt(name))
                .await?
                .is_some(),
        };
        Ok(found)
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), ClusterError> {
        let pp = PostParams::default();
        debug!(kind = %object.kind(), name = object.name(), namespace = %self.namespace, "Creating object");

        match object {
            ManagedObject::Secret(o) => {
                self.bounded(self.api::<Secret>().create(&pp, o)).await?;
            }
            ManagedObject::ConfigMap(o) => {
                self.bounded(self.api::<ConfigMap>().create(&pp, o)).await?;
            }
            ManagedObject::StatefulSet(o) => {
                self.bounded(self.api::<StatefulSet>().create(&pp, o)).await?;
            }
            ManagedObject::Service(o) => {
                self.bounded(self.api::<Service>().create(&pp, o)).await?;
            }
            ManagedObject::Ingress(o) => {
                self.bounded(self.api::<Ingress>().create(&pp, o)).await?;
            }
            ManagedObject::PersistentVolumeClaim(o) => {
                self.bounded(self.api::<PersistentVolumeClaim>().create(&pp, o))
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, kind: ObjectKind, name: &str) -> Result<(), ClusterError> {
        let dp = DeleteParams::default();
        debug!(kind = %kind, name = name, namespace = %self.namespace, "Deleting object");

        match kind {
            ObjectKind::Secret => {
                self.bounded(self.api::<Secret>().delete(name, &dp)).await?;
            }
            ObjectKind::ConfigMap => {
                self.bounded(self.api::<ConfigMap>().delete(name, &dp)).await?;
            }
            ObjectKind::StatefulSet => {
                self.bounded(self.api::<StatefulSet>().delete(name, &dp)).await?;
            }
            ObjectKind::Service => {
                self.bounded(self.api::<Service>().delete(name, &dp)).await?;
            }
            ObjectKind::Ingress => {
                self.bounded(self.api::<Ingress>().delete(name, &dp)).await?;
            }
            ObjectKind::PersistentVolumeClaim => {
                self.bounded(self.api::<PersistentVolumeClaim>().delete(name, &dp))
                    .await?;
            }
        }
        Ok(())
    }
}
