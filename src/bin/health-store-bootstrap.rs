//! Health store bootstrap
//!
//! Run once per install, before the API and the health job: creates the
//! PostgreSQL primary/replica pair that stores health records. Safe to run
//! again; objects that already exist are left alone.

use kaas::cluster::KubeCluster;
use kaas::config::BootstrapConfig;
use kaas::controller::HealthStoreBootstrap;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = BootstrapConfig::from_env();
    info!(
        namespace = %config.namespace,
        image = %config.image,
        storage = %config.storage_size,
        "Starting health store bootstrap"
    );

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    let cluster = Arc::new(KubeCluster::new(
        client,
        config.namespace.clone(),
        config.cluster_timeout,
    ));

    match HealthStoreBootstrap::new(cluster).ensure(&config).await {
        Ok(report) => {
            info!(
                created = report.created.len(),
                existing = report.existing.len(),
                "Health store bootstrap finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Health store bootstrap failed");
            Err(e.into())
        }
    }
}
