//! An in-memory backend. State is shared between clones, so a `MemoryDatabase` behaves like a single database that
//! several handlers talk to. It is used by unit tests and by the server when `PNS_MEMORY_STORE` is set. Nothing
//! survives a restart.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;

use crate::{
    db_types::{
        AuditEvent,
        IdempotencyRecord,
        LedgerKey,
        LedgerState,
        NewAuditEvent,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        PayloadDigest,
    },
    traits::{IdempotencyStore, InsertOrderResult, OrderStore, StoreError},
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("The memory store lock was poisoned by a panicking task")]
    Poisoned,
}

impl From<MemoryStoreError> for StoreError {
    fn from(e: MemoryStoreError) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    orders: HashMap<OrderId, Order>,
    ledger: HashMap<LedgerKey, IdempotencyRecord>,
    audit: Vec<AuditEvent>,
    last_swept: HashMap<OrderId, DateTime<Utc>>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_audit_event(&mut self, event: NewAuditEvent) -> AuditEvent {
        let entry = AuditEvent {
            id: self.next_id(),
            order_id: event.order_id,
            event_type: event.event_type,
            gateway: event.gateway,
            gateway_transaction_id: event.gateway_transaction_id,
            detail: event.detail,
            created_at: Utc::now(),
        };
        self.audit.push(entry.clone());
        entry
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    latency: Option<Duration>,
    failing_status_writes: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every store call sleeps for `latency` before touching the data. Useful for exercising timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The next `count` status writes fail with a database error and store nothing.
    pub fn with_failing_status_writes(self, count: usize) -> Self {
        self.failing_status_writes.store(count, Ordering::SeqCst);
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, MemoryStoreError> {
        self.state.lock().map_err(|_| MemoryStoreError::Poisoned)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl OrderStore for MemoryDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        if let Some(existing) = state.orders.get(&order.order_id) {
            return Ok(InsertOrderResult::AlreadyExists(existing.clone()));
        }
        let now = Utc::now();
        let record = Order {
            id: state.next_id(),
            order_id: order.order_id.clone(),
            status: OrderStatusType::Created,
            amount: order.amount,
            currency: order.currency,
            last_applied_transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order.order_id, record.clone());
        trace!("🧠️ Order {} stored in memory", record.order_id);
        Ok(InsertOrderResult::Inserted(record))
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        self.simulate_latency().await;
        Ok(self.state()?.orders.get(order_id).cloned())
    }

    async fn fetch_orders_in_status(
        &self,
        status: OrderStatusType,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, StoreError> {
        self.simulate_latency().await;
        let state = self.state()?;
        let mut orders = state
            .orders
            .values()
            .filter(|o| o.status == status && o.updated_at <= updated_before)
            .cloned()
            .collect::<Vec<_>>();
        // `None` sorts before `Some`, so orders that were never swept come first
        orders.sort_by_key(|o| (state.last_swept.get(&o.order_id).copied(), o.updated_at));
        orders.truncate(usize::try_from(limit).unwrap_or_default());
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
        self.simulate_latency().await;
        if self.failing_status_writes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(StoreError::DatabaseError(format!("Injected failure writing status of {order_id}")));
        }
        let mut state = self.state()?;
        let Some(order) = state.orders.get_mut(order_id) else {
            return Ok(false);
        };
        let replayed = transaction_id.is_some() && order.last_applied_transaction_id.as_deref() == transaction_id;
        if order.status != expected || replayed {
            return Ok(false);
        }
        order.status = next;
        if let Some(tx) = transaction_id {
            order.last_applied_transaction_id = Some(tx.to_string());
        }
        order.updated_at = Utc::now();
        state.push_audit_event(audit);
        Ok(true)
    }

    async fn mark_orders_swept(&self, order_ids: &[OrderId], now: DateTime<Utc>) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        for id in order_ids {
            state.last_swept.insert(id.clone(), now);
        }
        Ok(())
    }

    async fn append_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        self.simulate_latency().await;
        Ok(self.state()?.push_audit_event(event))
    }

    async fn fetch_audit_events(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, StoreError> {
        self.simulate_latency().await;
        let state = self.state()?;
        Ok(state.audit.iter().filter(|e| &e.order_id == order_id).cloned().collect())
    }
}

impl IdempotencyStore for MemoryDatabase {
    async fn conditional_insert(
        &self,
        key: &LedgerKey,
        digest: &PayloadDigest,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        if state.ledger.contains_key(key) {
            return Ok(false);
        }
        let record = IdempotencyRecord {
            id: state.next_id(),
            gateway: key.gateway,
            gateway_transaction_id: key.transaction_id.clone(),
            payload_digest: digest.clone(),
            state: LedgerState::Reserved,
            applied_order_status: None,
            attempts: 1,
            first_seen_at: now,
            reserved_at: now,
            committed_at: None,
        };
        state.ledger.insert(key.clone(), record);
        Ok(true)
    }

    async fn read(&self, key: &LedgerKey) -> Result<Option<IdempotencyRecord>, StoreError> {
        self.simulate_latency().await;
        Ok(self.state()?.ledger.get(key).cloned())
    }

    async fn reclaim(&self, key: &LedgerKey, observed_attempts: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        match state.ledger.get_mut(key) {
            Some(r) if r.state == LedgerState::Reserved && r.attempts == observed_attempts => {
                r.attempts += 1;
                r.reserved_at = now;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn commit(
        &self,
        key: &LedgerKey,
        attempts: i64,
        applied_status: Option<OrderStatusType>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        match state.ledger.get_mut(key) {
            Some(r) if r.state == LedgerState::Reserved && r.attempts == attempts => {
                r.state = LedgerState::Committed;
                r.applied_order_status = applied_status;
                r.committed_at = Some(now);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &LedgerKey, attempts: i64) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        let reserved =
            state.ledger.get(key).map(|r| r.state == LedgerState::Reserved && r.attempts == attempts).unwrap_or(false);
        if reserved {
            state.ledger.remove(key);
        }
        Ok(reserved)
    }
}
