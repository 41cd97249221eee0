//! One-shot health recorder
//!
//! Meant to run as a CronJob: polls the control plane's `/health` once,
//! folds the result into the `health` table and exits. A non-zero exit means
//! nothing was recorded.

use kaas::config::HealthJobConfig;
use kaas::controller::HealthRecorder;
use kaas::store::PgHealthStore;
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

    let config = HealthJobConfig::from_env();
    info!(
        endpoint = %config.endpoint,
        timeout_secs = config.timeout.as_secs(),
        database = %config.database.redacted_url(),
        "Starting health job"
    );

    let store = PgHealthStore::connect_lazy(config.database.url())?;
    if let Err(e) = store.ensure_schema().await {
        error!(error = %e, "Failed to prepare health table");
        return Err(e.into());
    }

    let http = reqwest::Client::builder().timeout(config.timeout).build()?;
    let recorder = HealthRecorder::new(http, config.endpoint, Arc::new(store));

    match recorder.poll_once().await {
        Ok(record) => {
            info!(
                app = ?record.app_name,
                success_count = record.success_count,
                failure_count = record.failure_count,
                "Health job finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Health job failed");
            Err(e.into())
        }
    }
}
