//! Workload reconciliation
//!
//! The StatefulSet `{app_name}-statefulset` decides the branch:
//! - present: only the first container's requests/limits are replaced
//! - absent (404): Secret → ConfigMap → StatefulSet → Service → Ingress are created
//!
//! No lock guards the creation sequence. Two concurrent deploys of the same
//! app race on the API server's name uniqueness and the loser surfaces the
//! resulting AlreadyExists error.

use super::resources::{
    build_config_map, build_ingress, build_secret, build_service, build_statefulset,
    resource_requirements,
};
use super::ReconcileError;
use crate::cluster::{ClusterApi, ManagedObject, ObjectKind};
use crate::model::application::ResourceQuantities;
use crate::model::{ApplicationConfig, ResourceUpdateConfig};
use k8s_openapi::api::apps::v1::StatefulSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of a successful deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The full resource graph was created
    Created(CreationLedger),
    /// The StatefulSet existed; its resources were replaced
    Updated,
}

impl DeployOutcome {
    pub fn message(&self, app_name: &str) -> String {
        match self {
            DeployOutcome::Created(_) => {
                format!("Application deployment for {} created successfully", app_name)
            }
            DeployOutcome::Updated => format!("Resources for {} updated successfully", app_name),
        }
    }
}

/// Objects created by one deploy attempt, in creation order
///
/// Only what this attempt created is recorded, so compensation never
/// removes objects that belong to a concurrent caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationLedger {
    pub app_name: String,
    pub attempt: Uuid,
    created: Vec<(ObjectKind, String)>,
}

impl CreationLedger {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            attempt: Uuid::new_v4(),
            created: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: ObjectKind, name: &str) {
        self.created.push((kind, name.to_string()));
    }

    pub fn created(&self) -> &[(ObjectKind, String)] {
        &self.created
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Deletion order for compensation
    ///
    /// The StatefulSet goes first since the other objects are what its pods
    /// reference; everything else follows newest first.
    pub fn rollback_order(&self) -> Vec<(ObjectKind, String)> {
        let (workload, rest): (Vec<_>, Vec<_>) = self
            .created
            .iter()
            .rev()
            .cloned()
            .partition(|(kind, _)| *kind == ObjectKind::StatefulSet);
        workload.into_iter().chain(rest).collect()
    }
}

/// The ordered list of objects to create for a new application
pub fn creation_plan(config: &ApplicationConfig) -> Vec<ManagedObject> {
    let mut plan = vec![
        ManagedObject::Secret(build_secret(config)),
        ManagedObject::ConfigMap(build_config_map(config)),
        ManagedObject::StatefulSet(build_statefulset(config)),
        ManagedObject::Service(build_service(config)),
    ];
    if config.external_access {
        plan.push(ManagedObject::Ingress(build_ingress(config)));
    }
    plan
}

/// Replace the first container's requests/limits, leaving everything else
pub fn apply_resources(
    statefulset: &mut StatefulSet,
    quantities: &ResourceQuantities,
) -> Result<(), ReconcileError> {
    let name = statefulset.metadata.name.clone().unwrap_or_default();
    let container = statefulset
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod| pod.containers.first_mut())
        .ok_or(ReconcileError::InvalidObject(name))?;

    container.resources = Some(resource_requirements(quantities));
    Ok(())
}

pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Create the application's resource graph, or update its resources if
    /// the StatefulSet already exists
    pub async fn deploy(&self, config: &ApplicationConfig) -> Result<DeployOutcome, ReconcileError> {
        let names = config.names();

        match self.cluster.get_statefulset(&names.statefulset).await {
            Ok(existing) => {
                info!(
                    app = ?config.app_name,
                    statefulset = ?names.statefulset,
                    "StatefulSet exists, updating resources only"
                );
                self.replace_resources(existing, &config.resources()).await?;
                Ok(DeployOutcome::Updated)
            }
            Err(e) if e.is_not_found() => {
                let ledger = self.create_graph(config).await?;
                Ok(DeployOutcome::Created(ledger))
            }
            Err(e) => {
                error!(
                    error = %e,
                    app = ?config.app_name,
                    "Failed to read StatefulSet"
                );
                Err(e.into())
            }
        }
    }

    /// Replace requests/limits of an existing application
    pub async fn update_resources(&self, update: &ResourceUpdateConfig) -> Result<(), ReconcileError> {
        let statefulset_name = crate::model::application::statefulset_name(&update.app_name);

        let existing = match self.cluster.get_statefulset(&statefulset_name).await {
            Ok(sts) => sts,
            Err(e) if e.is_not_found() => {
                warn!(app = ?update.app_name, "StatefulSet not found for resource update");
                return Err(ReconcileError::NotFound(update.app_name.clone()));
            }
            Err(e) => {
                error!(error = %e, app = ?update.app_name, "Failed to read StatefulSet");
                return Err(e.into());
            }
        };

        self.replace_resources(existing, &update.resources()).await
    }

    async fn replace_resources(
        &self,
        mut statefulset: StatefulSet,
        quantities: &ResourceQuantities,
    ) -> Result<(), ReconcileError> {
        apply_resources(&mut statefulset, quantities)?;
        self.cluster.replace_statefulset(&statefulset).await?;

        info!(
            statefulset = ?statefulset.metadata.name,
            cpu_request = %quantities.cpu_request,
            cpu_limit = %quantities.cpu_limit,
            memory_request = %quantities.memory_request,
            memory_limit = %quantities.memory_limit,
            "StatefulSet resources replaced"
        );
        Ok(())
    }

    async fn create_graph(&self, config: &ApplicationConfig) -> Result<CreationLedger, ReconcileError> {
        let mut ledger = CreationLedger::new(&config.app_name);

        info!(
            app = ?config.app_name,
            attempt = %ledger.attempt,
            external_access = config.external_access,
            "Creating resource graph"
        );

        for object in creation_plan(config) {
            match self.cluster.create(&object).await {
                Ok(()) => {
                    info!(
                        app = ?config.app_name,
                        attempt = %ledger.attempt,
                        kind = %object.kind(),
                        name = object.name(),
                        "Created"
                    );
                    ledger.record(object.kind(), object.name());
                }
                Err(e) => {
                    error!(
                        error = %e,
                        app = ?config.app_name,
                        attempt = %ledger.attempt,
                        kind = %object.kind(),
                        name = object.name(),
                        created = ?ledger.created(),
                        "Resource graph creation failed"
                    );
                    if e.is_unknown_outcome() {
                        // The create may have been applied; roll it back as well
                        ledger.record(object.kind(), object.name());
                    }
                    self.compensate(&ledger).await;
                    return Err(e.into());
                }
            }
        }

        Ok(ledger)
    }

    /// Delete what this attempt created, in [`CreationLedger::rollback_order`]
    ///
    /// If the StatefulSet cannot be deleted the rollback stops there, so its
    /// Secret and ConfigMap stay in place and the next deploy takes the update
    /// branch against a working graph. Other failed deletes are logged and
    /// the rest still run.
    async fn compensate(&self, ledger: &CreationLedger) {
        for (kind, name) in ledger.rollback_order() {
            match self.cluster.delete(kind, &name).await {
                Ok(()) => {
                    info!(attempt = %ledger.attempt, kind = %kind, name = ?name, "Rolled back");
                }
                Err(e) if e.is_not_found() => {}
                Err(e) if kind == ObjectKind::StatefulSet => {
                    error!(
                        error = %e,
                        attempt = %ledger.attempt,
                        name = ?name,
                        "StatefulSet rollback failed, keeping the rest of the graph"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt = %ledger.attempt,
                        kind = %kind,
                        name = ?name,
                        "Rollback delete failed, object left behind"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
