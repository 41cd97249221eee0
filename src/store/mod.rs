//! Health record store
//!
//! One row per application with success/failure counters. Rows are created
//! on the first observation of an app and only ever incremented afterwards.

mod postgres;

pub use postgres::PgHealthStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of one health poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// A single health poll, ready to be folded into the store
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub app_name: String,
    /// Creation time reported by the health endpoint; only used on insert
    pub created_at: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HealthRecord {
    pub id: i32,
    pub app_name: String,
    pub success_count: i32,
    pub failure_count: i32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HealthRecord {
    /// Record for an app seen for the first time (id assigned by the store)
    pub fn first(observation: &Observation) -> Self {
        let mut record = HealthRecord {
            id: 0,
            app_name: observation.app_name.clone(),
            success_count: 0,
            failure_count: 0,
            last_success: None,
            last_failure: None,
            created_at: observation.created_at,
        };
        record.apply(observation);
        record
    }

    /// Increment exactly one counter and its timestamp
    pub fn apply(&mut self, observation: &Observation) {
        match observation.outcome {
            ProbeOutcome::Success => {
                self.success_count += 1;
                self.last_success = Some(observation.observed_at);
            }
            ProbeOutcome::Failure => {
                self.failure_count += 1;
                self.last_failure = Some(observation.observed_at);
            }
        }
    }
}

#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Exact-match lookup by app_name
    async fn find(&self, app_name: &str) -> Result<Option<HealthRecord>, StoreError>;

    /// Fold an observation into the app's record, inserting it if missing
    ///
    /// One read followed by one update-or-insert, committed together.
    async fn record(&self, observation: &Observation) -> Result<HealthRecord, StoreError>;
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
