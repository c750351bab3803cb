//! `SqliteDatabase` is a concrete implementation of a payment notification engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! [`traits`]: crate::traits
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::{
    db::{audit, db_url, idempotency, new_pool, orders},
    SqliteDatabaseError,
};
use crate::{
    db_types::{
        AuditEvent,
        IdempotencyRecord,
        LedgerKey,
        NewAuditEvent,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        PayloadDigest,
    },
    traits::{IdempotencyStore, InsertOrderResult, OrderStore, StoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderStore for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::idempotent_insert(order, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders_in_status(
        &self,
        status: OrderStatusType,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_in_status(status, updated_before, limit, &mut conn).await?;
        Ok(orders)
    }

    async fn compare_and_set_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        next: OrderStatusType,
        transaction_id: Option<&str>,
        audit: NewAuditEvent,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::compare_and_set_status(order_id, expected, next, transaction_id, &mut tx).await?;
        if !updated {
            return Ok(false);
        }
        audit::insert_audit_event(audit, &mut tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn mark_orders_swept(&self, order_ids: &[OrderId], now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for order_id in order_ids {
            orders::mark_swept(order_id, now, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let entry = audit::insert_audit_event(event, &mut conn).await?;
        Ok(entry)
    }

    async fn fetch_audit_events(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let events = audit::fetch_audit_events_for_order(order_id, &mut conn).await?;
        Ok(events)
    }
}

impl IdempotencyStore for SqliteDatabase {
    async fn conditional_insert(
        &self,
        key: &LedgerKey,
        digest: &PayloadDigest,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let inserted = idempotency::insert_reservation(key, digest, now, &mut conn).await?;
        Ok(inserted)
    }

    async fn read(&self, key: &LedgerKey) -> Result<Option<IdempotencyRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let record = idempotency::fetch_record(key, &mut conn).await?;
        Ok(record)
    }

    async fn reclaim(&self, key: &LedgerKey, observed_attempts: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let reclaimed = idempotency::reclaim_reservation(key, observed_attempts, now, &mut conn).await?;
        Ok(reclaimed)
    }

    async fn commit(
        &self,
        key: &LedgerKey,
        attempts: i64,
        applied_status: Option<OrderStatusType>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let committed = idempotency::commit_record(key, attempts, applied_status, now, &mut conn).await?;
        Ok(committed)
    }

    async fn release(&self, key: &LedgerKey, attempts: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let released = idempotency::release_reservation(key, attempts, &mut conn).await?;
        Ok(released)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use pns_common::MinorUnits;

    use super::*;
    use crate::{
        db_types::{AuditEventType, GatewayId, LedgerState},
        test_utils::prepare_env::{prepare_test_env, random_db_path},
    };

    async fn db() -> SqliteDatabase {
        let url = random_db_path();
        prepare_test_env(&url).await;
        SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
    }

    #[tokio::test]
    async fn orders_round_trip() {
        let db = db().await;
        let id = OrderId::from("ORDER-1");
        let order = NewOrder::new(id.clone(), MinorUnits::from(9900), "CNY");
        let inserted = db.insert_order(order.clone()).await.unwrap();
        assert!(matches!(inserted, InsertOrderResult::Inserted(_)));
        let again = db.insert_order(order).await.unwrap();
        assert!(matches!(again, InsertOrderResult::AlreadyExists(ref o) if o.id == inserted.order().id));

        let fetched = db.fetch_order(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatusType::Created);
        assert_eq!(fetched.amount, MinorUnits::from(9900));
        assert!(db.fetch_order(&OrderId::from("nope")).await.unwrap().is_none());
    }

    fn status_change(id: &OrderId) -> NewAuditEvent {
        NewAuditEvent::new(id.clone(), AuditEventType::StatusChanged, "test")
    }

    #[tokio::test]
    async fn conditional_status_writes() {
        let db = db().await;
        let id = OrderId::from("ORDER-2");
        db.insert_order(NewOrder::new(id.clone(), MinorUnits::from(100), "CNY")).await.unwrap();
        use OrderStatusType::*;
        assert!(db.compare_and_set_status(&id, Created, Pending, None, status_change(&id)).await.unwrap());
        assert!(!db.compare_and_set_status(&id, Created, Paid, Some("t1"), status_change(&id)).await.unwrap());
        assert!(db.compare_and_set_status(&id, Pending, Paid, Some("t1"), status_change(&id)).await.unwrap());
        assert!(!db.compare_and_set_status(&id, Paid, Refunded, Some("t1"), status_change(&id)).await.unwrap());
        let order = db.fetch_order(&id).await.unwrap().unwrap();
        assert_eq!(order.status, Paid);
        assert_eq!(order.last_applied_transaction_id.as_deref(), Some("t1"));
        // One audit entry per status change that happened
        assert_eq!(db.fetch_audit_events(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_change_is_rolled_back_with_its_audit_entry() {
        let db = db().await;
        let id = OrderId::from("ORDER-4");
        db.insert_order(NewOrder::new(id.clone(), MinorUnits::from(100), "CNY")).await.unwrap();
        // Make every audit insert fail, so the second half of the write cannot complete
        sqlx::query(
            "CREATE TRIGGER audit_events_reject BEFORE INSERT ON audit_events BEGIN SELECT RAISE(ABORT, 'disk full'); \
             END;",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let (from, to) = (OrderStatusType::Created, OrderStatusType::Paid);
        let result = db.compare_and_set_status(&id, from, to, Some("t1"), status_change(&id)).await;
        assert!(result.is_err());
        let order = db.fetch_order(&id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Created);
        assert_eq!(order.last_applied_transaction_id, None);
    }

    #[tokio::test]
    async fn orders_by_status() {
        let db = db().await;
        for i in 0..3 {
            let id = OrderId::new(format!("ORDER-{i}"));
            db.insert_order(NewOrder::new(id.clone(), MinorUnits::from(100), "CNY")).await.unwrap();
            if i > 0 {
                let (from, to) = (OrderStatusType::Created, OrderStatusType::Pending);
                db.compare_and_set_status(&id, from, to, None, status_change(&id)).await.unwrap();
            }
        }
        let later = Utc::now() + Duration::minutes(1);
        let pending = db.fetch_orders_in_status(OrderStatusType::Pending, later, 10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|o| o.status == OrderStatusType::Pending));
        let limited = db.fetch_orders_in_status(OrderStatusType::Pending, later, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        let earlier = Utc::now() - Duration::minutes(1);
        assert!(db.fetch_orders_in_status(OrderStatusType::Pending, earlier, 10).await.unwrap().is_empty());

        // The order that was just swept goes to the back of the queue
        let swept = limited[0].order_id.clone();
        db.mark_orders_swept(&[swept.clone()], Utc::now()).await.unwrap();
        let next = db.fetch_orders_in_status(OrderStatusType::Pending, later, 1).await.unwrap();
        assert_ne!(next[0].order_id, swept);
    }

    #[tokio::test]
    async fn ledger_lifecycle() {
        let db = db().await;
        let key = LedgerKey::new(GatewayId::Stripe, "evt_1");
        let digest = PayloadDigest::of(b"body");
        let then = Utc::now() - Duration::minutes(5);
        assert!(db.conditional_insert(&key, &digest, then).await.unwrap());
        assert!(!db.conditional_insert(&key, &digest, Utc::now()).await.unwrap());
        let record = db.read(&key).await.unwrap().unwrap();
        assert_eq!(record.state, LedgerState::Reserved);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.payload_digest, digest);

        assert!(!db.reclaim(&key, 2, Utc::now()).await.unwrap());
        assert!(db.reclaim(&key, 1, Utc::now()).await.unwrap());
        assert!(!db.reclaim(&key, 1, Utc::now()).await.unwrap());

        // Attempt 1 was reclaimed, so it can no longer commit
        assert!(!db.commit(&key, 1, Some(OrderStatusType::Failed), Utc::now()).await.unwrap());
        assert!(!db.release(&key, 1).await.unwrap());
        assert!(db.commit(&key, 2, Some(OrderStatusType::Paid), Utc::now()).await.unwrap());
        assert!(!db.commit(&key, 2, Some(OrderStatusType::Failed), Utc::now()).await.unwrap());
        assert!(!db.release(&key, 2).await.unwrap());
        let record = db.read(&key).await.unwrap().unwrap();
        assert_eq!(record.state, LedgerState::Committed);
        assert_eq!(record.applied_order_status, Some(OrderStatusType::Paid));
        assert_eq!(record.attempts, 2);
        assert!(record.committed_at.is_some());
    }

    #[tokio::test]
    async fn audit_events() {
        let db = db().await;
        let id = OrderId::from("ORDER-3");
        let event = NewAuditEvent::new(id.clone(), AuditEventType::LedgerConflict, "digest mismatch")
            .with_transaction(GatewayId::Alipay, "T1:TRADE_SUCCESS");
        let stored = db.append_audit_event(event).await.unwrap();
        assert_eq!(stored.gateway, Some(GatewayId::Alipay));
        let events = db.fetch_audit_events(&id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::LedgerConflict);
        assert_eq!(events[0].gateway_transaction_id.as_deref(), Some("T1:TRADE_SUCCESS"));
    }
}
