use kaas::cluster::KubeCluster;
use kaas::config::Config;
use kaas::server::{create_metrics, run_api_server, AppState, ProbeFlags};
use kaas::store::PgHealthStore;
use kaas::{Reconciler, StatusReporter};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often the health store connection is re-checked for `/ready`
const DATABASE_CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// Keep the database flag in step with the health store
///
/// Runs forever. A failed check only flips readiness; the API keeps serving.
async fn watch_database(store: PgHealthStore, probes: ProbeFlags) {
    let mut interval = tokio::time::interval(DATABASE_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        match store.health_check().await {
            Ok(()) => {
                if !probes.is_ready() {
                    info!("Health store reachable");
                }
                probes.set_database_connected(true);
            }
            Err(e) => {
                warn!(error = %e, "Health store unreachable");
                probes.set_database_connected(false);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting KaaS control plane");

    let config = Config::from_env();
    info!(
        port = config.port,
        namespace = %config.namespace,
        cluster_timeout_secs = config.cluster_timeout.as_secs(),
        database = %config.database.redacted_url(),
        "Configuration loaded"
    );

    // Not started or ready until the cluster client and store are set up
    let probes = ProbeFlags::new();
    let metrics = create_metrics()?;

    // Create Kubernetes client
    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let cluster = Arc::new(KubeCluster::new(
        client,
        config.namespace.clone(),
        config.cluster_timeout,
    ));

    let store = PgHealthStore::connect_lazy(config.database.url())?;
    tokio::spawn(watch_database(store.clone(), probes.clone()));

    let state = AppState {
        reconciler: Arc::new(Reconciler::new(cluster.clone())),
        reporter: Arc::new(StatusReporter::new(cluster)),
        store: Arc::new(store),
        probes: probes.clone(),
        metrics,
    };

    probes.set_started(true);
    probes.set_ready(true);
    info!("Control plane initialised, serving API");

    run_api_server(config.port, state).await?;

    Ok(())
}
