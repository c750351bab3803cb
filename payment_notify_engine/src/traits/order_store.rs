use chrono::{DateTime, Utc};

use crate::{
    db_types::{AuditEvent, NewAuditEvent, NewOrder, Order, OrderId, OrderStatusType},
    traits::{InsertOrderResult, StoreError},
};

#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// Stores a new order with status `Created`. This call is idempotent: if an order with the same id exists, it is
    /// returned unchanged.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, StoreError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Up to `limit` orders in `status` that have not changed since `updated_before`. Orders that have never been
    /// swept come first (least recently updated first), then the least recently swept.
    async fn fetch_orders_in_status(
        &self,
        status: OrderStatusType,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, StoreError>;

    /// Moves the order from `expected` to `next` and appends `audit` to its trail, as one atomic write. Either both
    /// are stored or neither is.
    ///
    /// The write only happens if the order's status is still `expected` *and* `transaction_id` is not the transaction
    /// that produced the current status. When `transaction_id` is given it becomes the order's
    /// `last_applied_transaction_id`; when it is `None` the existing value is kept.
    ///
    /// Returns `false` if the condition did not hold and nothing was written.
    async fn compare_and_set_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        next: OrderStatusType,
        transaction_id: Option<&str>,
        audit: NewAuditEvent,
    ) -> Result<bool, StoreError>;

    /// Records that the sweeper looked at these orders at `now`, so the next batch starts with other orders.
    async fn mark_orders_swept(&self, order_ids: &[OrderId], now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Appends an entry to the order's audit trail. Audit entries are never modified or removed.
    async fn append_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError>;

    async fn fetch_audit_events(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, StoreError>;
}
