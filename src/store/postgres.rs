use super::{HealthRecord, HealthStore, Observation, StoreError};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

const CREATE_HEALTH_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS health (
    id SERIAL PRIMARY KEY,
    app_name VARCHAR NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    last_failure TIMESTAMPTZ NULL,
    last_success TIMESTAMPTZ NULL,
    created_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_APP_NAME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS health_app_name_idx ON health (app_name)";

/// [`HealthStore`] on the `health` table in PostgreSQL
#[derive(Clone)]
pub struct PgHealthStore {
    pool: PgPool,
}

impl PgHealthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect without touching the database until the first query
    pub fn connect_lazy(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(PgPool::connect_lazy(url)?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the health table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_HEALTH_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_APP_NAME_INDEX)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HealthStore for PgHealthStore {
    async fn find(&self, app_name: &str) -> Result<Option<HealthRecord>, StoreError> {
        let record = sqlx::query_as::<_, HealthRecord>(
            r#"
            SELECT id, app_name, success_count, failure_count, last_success, last_failure, created_at
            FROM health
            WHERE app_name = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(app_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record(&self, observation: &Observation) -> Result<HealthRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, HealthRecord>(
            r#"
            SELECT id, app_name, success_count, failure_count, last_success, last_failure, created_at
            FROM health
            WHERE app_name = $1
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&observation.app_name)
        .fetch_optional(&mut *tx)
        .await?;

        let record = match existing {
            Some(mut record) => {
                record.apply(observation);
                sqlx::query(
                    r#"
                    UPDATE health
                    SET success_count = $2, failure_count = $3, last_success = $4, last_failure = $5
                    WHERE id = $1
                    "#,
                )
                .bind(record.id)
                .bind(record.success_count)
                .bind(record.failure_count)
                .bind(record.last_success)
                .bind(record.last_failure)
                .execute(&mut *tx)
                .await?;
                debug!(app = ?record.app_name, id = record.id, "Updated health record");
                record
            }
            None => {
                let mut record = HealthRecord::first(observation);
                let id: i32 = sqlx::query_scalar(
                    r#"
                    INSERT INTO health (app_name, success_count, failure_count, last_success, last_failure, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id
                    "#,
                )
                .bind(&record.app_name)
                .bind(record.success_count)
                .bind(record.failure_count)
                .bind(record.last_success)
                .bind(record.last_failure)
                .bind(record.created_at)
                .fetch_one(&mut *tx)
                .await?;
                record.id = id;
                debug!(app = ?record.app_name, id = record.id, "Inserted health record");
                record
            }
        };

        tx.commit().await?;
        Ok(record)
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
