use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AuditEvent, NewAuditEvent, OrderId},
    sqlite::SqliteDatabaseError,
};

pub async fn insert_audit_event(
    event: NewAuditEvent,
    conn: &mut SqliteConnection,
) -> Result<AuditEvent, SqliteDatabaseError> {
    let entry = sqlx::query_as::<_, AuditEvent>(
        r#"
            INSERT INTO audit_events (order_id, event_type, gateway, gateway_transaction_id, detail)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, event_type, gateway, gateway_transaction_id, detail, created_at;
        "#,
    )
    .bind(event.order_id)
    .bind(event.event_type)
    .bind(event.gateway)
    .bind(event.gateway_transaction_id)
    .bind(event.detail)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Audit event #{} ({}) recorded for order {}", entry.id, entry.event_type, entry.order_id);
    Ok(entry)
}

pub async fn fetch_audit_events_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditEvent>, SqliteDatabaseError> {
    let events = sqlx::query_as::<_, AuditEvent>(
        r#"
            SELECT id, order_id, event_type, gateway, gateway_transaction_id, detail, created_at
            FROM audit_events
            WHERE order_id = $1
            ORDER BY id ASC;
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(events)
}
