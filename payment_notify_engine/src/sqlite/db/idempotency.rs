use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{IdempotencyRecord, LedgerKey, OrderStatusType, PayloadDigest},
    sqlite::SqliteDatabaseError,
};

pub async fn insert_reservation(
    key: &LedgerKey,
    digest: &PayloadDigest,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            INSERT INTO idempotency_records
                (gateway, gateway_transaction_id, payload_digest, state, attempts, first_seen_at, reserved_at)
            VALUES ($1, $2, $3, 'Reserved', 1, $4, $4)
            ON CONFLICT (gateway, gateway_transaction_id) DO NOTHING;
        "#,
    )
    .bind(key.gateway)
    .bind(&key.transaction_id)
    .bind(digest)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_record(
    key: &LedgerKey,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, SqliteDatabaseError> {
    let record = sqlx::query_as::<_, IdempotencyRecord>(
        r#"
            SELECT id, gateway, gateway_transaction_id, payload_digest, state, applied_order_status, attempts,
                   first_seen_at, reserved_at, committed_at
            FROM idempotency_records
            WHERE gateway = $1 AND gateway_transaction_id = $2;
        "#,
    )
    .bind(key.gateway)
    .bind(&key.transaction_id)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Compare-and-set on `attempts`: of several handlers racing to take over the same stale reservation, exactly one
/// sees a row updated.
pub async fn reclaim_reservation(
    key: &LedgerKey,
    observed_attempts: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE idempotency_records SET attempts = attempts + 1, reserved_at = $1
            WHERE gateway = $2 AND gateway_transaction_id = $3 AND state = 'Reserved' AND attempts = $4;
        "#,
    )
    .bind(now)
    .bind(key.gateway)
    .bind(&key.transaction_id)
    .bind(observed_attempts)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Only the handler holding reservation number `attempts` may commit it. A handler whose reservation was reclaimed
/// sees `false`.
pub async fn commit_record(
    key: &LedgerKey,
    attempts: i64,
    applied_status: Option<OrderStatusType>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE idempotency_records SET state = 'Committed', applied_order_status = $1, committed_at = $2
            WHERE gateway = $3 AND gateway_transaction_id = $4 AND state = 'Reserved' AND attempts = $5;
        "#,
    )
    .bind(applied_status)
    .bind(now)
    .bind(key.gateway)
    .bind(&key.transaction_id)
    .bind(attempts)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_reservation(
    key: &LedgerKey,
    attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            DELETE FROM idempotency_records
            WHERE gateway = $1 AND gateway_transaction_id = $2 AND state = 'Reserved' AND attempts = $3;
        "#,
    )
    .bind(key.gateway)
    .bind(&key.transaction_id)
    .bind(attempts)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
