use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    sqlite::SqliteDatabaseError,
    traits::InsertOrderResult,
};

const ORDER_COLUMNS: &str = "id, order_id, status, amount, currency, last_applied_transaction_id, created_at, updated_at";

/// Inserts the order unless one with the same `order_id` exists. Either way, the stored order is returned.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO orders (order_id, amount, currency) VALUES ($1, $2, $3) ON CONFLICT (order_id) DO NOTHING \
         RETURNING {ORDER_COLUMNS};"
    );
    let inserted = sqlx::query_as::<_, Order>(&sql)
        .bind(&order.order_id)
        .bind(order.amount)
        .bind(&order.currency)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(order) = inserted {
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        return Ok(InsertOrderResult::Inserted(order));
    }
    let existing = fetch_order_by_order_id(&order.order_id, conn).await?.ok_or_else(|| {
        SqliteDatabaseError::QueryError(format!("Order {} conflicted on insert but does not exist", order.order_id))
    })?;
    trace!("🗃️ Order {} already exists", existing.order_id);
    Ok(InsertOrderResult::AlreadyExists(existing))
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1;");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_orders_in_status(
    status: OrderStatusType,
    updated_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND datetime(updated_at) <= datetime($2) ORDER BY \
         datetime(last_swept_at) ASC NULLS FIRST, updated_at ASC LIMIT $3;"
    );
    let orders = sqlx::query_as::<_, Order>(&sql).bind(status).bind(updated_before).bind(limit).fetch_all(conn).await?;
    trace!("🗃️ {} orders in status {status} since {updated_before}", orders.len());
    Ok(orders)
}

/// A single conditional `UPDATE`. The row only changes if the status is still `expected` and `transaction_id` is not
/// the transaction that produced the current status.
pub async fn compare_and_set_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    next: OrderStatusType,
    transaction_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                status = $1,
                last_applied_transaction_id = COALESCE($2, last_applied_transaction_id),
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $3
              AND status = $4
              AND ($2 IS NULL OR last_applied_transaction_id IS NULL OR last_applied_transaction_id <> $2);
        "#,
    )
    .bind(next)
    .bind(transaction_id)
    .bind(order_id)
    .bind(expected)
    .execute(conn)
    .await?;
    let updated = result.rows_affected() == 1;
    if updated {
        debug!("🗃️ Order {order_id} moved from {expected} to {next}");
    }
    Ok(updated)
}

pub async fn mark_swept(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE orders SET last_swept_at = $1 WHERE order_id = $2;")
        .bind(now)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}
