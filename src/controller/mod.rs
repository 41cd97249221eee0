//! Control-plane logic
//!
//! - [`Reconciler`]: create-or-update of an application's resource graph
//! - [`StatusReporter`]: read-only views of observed cluster state
//! - [`HealthRecorder`]: out-of-band poll that feeds the health store
//! - [`HealthStoreBootstrap`]: creates the health store's own database nodes

pub mod bootstrap;
pub mod reconciler;
pub mod recorder;
pub mod resources;
pub mod status;

pub use bootstrap::{BootstrapReport, HealthStoreBootstrap};
pub use reconciler::{CreationLedger, DeployOutcome, Reconciler};
pub use recorder::{HealthRecorder, RecorderError};
pub use status::{AppStatus, HealthSample, MonitoredApp, PodStatus, StatusReporter};

use crate::cluster::ClusterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("StatefulSet for {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("StatefulSet {0} has no container to update")]
    InvalidObject(String),
}
