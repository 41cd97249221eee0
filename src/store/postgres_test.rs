//! Run with a reachable PostgreSQL in `DATABASE_URL`; each test gets a
//! fresh database.

use super::*;
use crate::store::ProbeOutcome;
use chrono::{DateTime, TimeZone, Utc};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).single().unwrap()
}

fn observation(app_name: &str, outcome: ProbeOutcome, observed_at: DateTime<Utc>) -> Observation {
    Observation {
        app_name: app_name.to_string(),
        created_at: at(1, 8),
        outcome,
        observed_at,
    }
}

async fn store(pool: PgPool) -> PgHealthStore {
    let store = PgHealthStore::new(pool);
    store.ensure_schema().await.unwrap();
    store
}

async fn row_count(store: &PgHealthStore, app_name: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM health WHERE app_name = $1")
        .bind(app_name)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[sqlx::test]
async fn test_first_success_inserts_row(pool: PgPool) {
    // ARRANGE
    let store = store(pool).await;

    // ACT
    let record = store
        .record(&observation("orders", ProbeOutcome::Success, at(2, 9)))
        .await
        .unwrap();

    // ASSERT: created_at comes from the observation, not the poll time
    assert!(record.id > 0);
    assert_eq!(record.success_count, 1);
    assert_eq!(record.failure_count, 0);
    assert_eq!(record.last_success, Some(at(2, 9)));
    assert_eq!(record.last_failure, None);
    assert_eq!(record.created_at, at(1, 8));
    assert_eq!(store.find("orders").await.unwrap(), Some(record));
}

#[sqlx::test]
async fn test_second_success_increments_and_keeps_created_at(pool: PgPool) {
    // ARRANGE
    let store = store(pool).await;
    let first = store
        .record(&observation("orders", ProbeOutcome::Success, at(2, 9)))
        .await
        .unwrap();

    // ACT: a later poll reports a different creation time
    let mut later = observation("orders", ProbeOutcome::Success, at(3, 9));
    later.created_at = at(3, 0);
    let second = store.record(&later).await.unwrap();

    // ASSERT
    assert_eq!(second.id, first.id);
    assert_eq!(second.success_count, 2);
    assert_eq!(second.last_success, Some(at(3, 9)));
    assert_eq!(second.created_at, at(1, 8));
    assert_eq!(row_count(&store, "orders").await, 1);
}

#[sqlx::test]
async fn test_failure_touches_only_failure_fields(pool: PgPool) {
    // ARRANGE
    let store = store(pool).await;
    let before = store
        .record(&observation("orders", ProbeOutcome::Success, at(2, 9)))
        .await
        .unwrap();

    // ACT
    store
        .record(&observation("orders", ProbeOutcome::Failure, at(4, 12)))
        .await
        .unwrap();

    // ASSERT: read back from the table, not the returned value
    let after = store.find("orders").await.unwrap().unwrap();
    assert_eq!(after.failure_count, 1);
    assert_eq!(after.last_failure, Some(at(4, 12)));
    assert_eq!(after.success_count, before.success_count);
    assert_eq!(after.last_success, before.last_success);
    assert_eq!(after.created_at, before.created_at);
}

#[sqlx::test]
async fn test_first_failure_inserts_failure_row(pool: PgPool) {
    let store = store(pool).await;

    let record = store
        .record(&observation("billing", ProbeOutcome::Failure, at(5, 7)))
        .await
        .unwrap();

    assert_eq!(record.success_count, 0);
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.last_success, None);
    assert_eq!(record.last_failure, Some(at(5, 7)));
}

#[sqlx::test]
async fn test_find_unknown_app_returns_none(pool: PgPool) {
    let store = store(pool).await;
    store
        .record(&observation("orders", ProbeOutcome::Success, at(2, 9)))
        .await
        .unwrap();

    assert_eq!(store.find("inventory").await.unwrap(), None);
}

#[sqlx::test]
async fn test_ensure_schema_is_idempotent(pool: PgPool) {
    let store = store(pool).await;

    store.ensure_schema().await.unwrap();

    store.health_check().await.unwrap();
    assert_eq!(row_count(&store, "orders").await, 0);
}
