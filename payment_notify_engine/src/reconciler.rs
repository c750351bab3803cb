//! # Order reconciler
//!
//! Applies a canonical [`PaymentEvent`] to an order. The decision of *what* to do is a pure function of the order and
//! the event ([`decide`]); the write is a compare-and-set on the status observed when the decision was made, so a
//! decision based on stale state is never written.
//!
//! Allowed transitions:
//!
//! | current           | event     | next     |
//! |-------------------|-----------|----------|
//! | Created / Pending | Succeeded | Paid     |
//! | Created / Pending | Failed    | Failed   |
//! | Paid              | Refunded  | Refunded |
//! | Paid              | Closed    | Closed   |
//!
//! Everything else is a no-op. Failed, Closed and Refunded orders never change again.
use std::fmt::Display;

use log::*;
use pns_common::MinorUnits;

use crate::{
    db_types::{AuditEventType, NewAuditEvent, Order, OrderId, OrderStatusType},
    normalizer::{PaymentEvent, PaymentStatus},
    traits::{OrderStore, StoreError},
};

/// How many times a decision is made before giving up on a contended order.
const MAX_DECISION_ROUNDS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    /// This transaction produced the order's current status, which is carried along.
    AlreadyApplied(OrderStatusType),
    AlreadyPaid,
    /// The order is in a terminal status.
    Terminal(OrderStatusType),
    /// The gateway reported a status with no mapping.
    UnknownStatus(String),
    UnknownOrder,
    /// The event does not move an order in this status.
    NotApplicable { current: OrderStatusType, event: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    AmountMismatch { expected: MinorUnits, received: MinorUnits },
    /// The order kept changing underneath the reconciler.
    ConcurrentModification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(OrderStatusType),
    NoOp(NoOpReason),
    Conflict(ConflictReason),
}

impl ReconcileOutcome {
    /// The order status this outcome produced, if any. A transaction that was already applied reports the status it
    /// produced back then.
    pub fn applied_status(&self) -> Option<OrderStatusType> {
        match self {
            ReconcileOutcome::Applied(s) => Some(*s),
            ReconcileOutcome::NoOp(NoOpReason::AlreadyApplied(s)) => Some(*s),
            _ => None,
        }
    }
}

impl Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Applied(s) => write!(f, "applied ({s})"),
            ReconcileOutcome::NoOp(r) => write!(f, "no-op ({r:?})"),
            ReconcileOutcome::Conflict(r) => write!(f, "conflict ({r:?})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Transition(OrderStatusType),
    NoOp(NoOpReason),
    Conflict(ConflictReason),
}

/// Decides what `event` should do to `order`. Pure.
pub fn decide(order: &Order, event: &PaymentEvent) -> Decision {
    use OrderStatusType::*;
    if event.amount() != order.amount {
        return Decision::Conflict(ConflictReason::AmountMismatch { expected: order.amount, received: event.amount() });
    }
    if order.last_applied_transaction_id.as_deref() == Some(event.gateway_transaction_id()) {
        return Decision::NoOp(NoOpReason::AlreadyApplied(order.status));
    }
    match (order.status, event.status()) {
        (_, PaymentStatus::Unknown(raw)) => Decision::NoOp(NoOpReason::UnknownStatus(raw.clone())),
        (current, _) if current.is_terminal() => Decision::NoOp(NoOpReason::Terminal(current)),
        (Created | Pending, PaymentStatus::Succeeded) => Decision::Transition(Paid),
        (Created | Pending, PaymentStatus::Failed) => Decision::Transition(Failed),
        (Paid, PaymentStatus::Refunded) => Decision::Transition(Refunded),
        (Paid, PaymentStatus::Closed) => Decision::Transition(Closed),
        (Paid, PaymentStatus::Succeeded) => Decision::NoOp(NoOpReason::AlreadyPaid),
        (current, status) => Decision::NoOp(NoOpReason::NotApplicable { current, event: status.to_string() }),
    }
}

#[derive(Clone)]
pub struct OrderReconciler<B> {
    store: B,
}

impl<B> OrderReconciler<B> {
    pub fn new(store: B) -> Self {
        Self { store }
    }
}

impl<B> OrderReconciler<B>
where B: OrderStore
{
    /// Applies `event` to the order `order_id`, auditing every status change and every anomaly.
    ///
    /// Audit writes are part of the operation: if one fails, the whole call fails. A status change and its audit entry
    /// are written together, so a failed call leaves the order untouched and can be retried.
    pub async fn apply(&self, order_id: &OrderId, event: &PaymentEvent) -> Result<ReconcileOutcome, StoreError> {
        let mut order = match self.store.fetch_order(order_id).await? {
            Some(o) => o,
            None => {
                warn!("🔄️ {event} refers to an unknown order");
                let detail = format!("Notification for unknown order ({})", event.status());
                self.audit(order_id, AuditEventType::UnknownOrder, detail, event).await?;
                return Ok(ReconcileOutcome::NoOp(NoOpReason::UnknownOrder));
            },
        };
        for _ in 0..MAX_DECISION_ROUNDS {
            match decide(&order, event) {
                Decision::Transition(next) => {
                    let tx = Some(event.gateway_transaction_id());
                    let detail = format!("{} -> {next}", order.status);
                    let entry = audit_entry(order_id, AuditEventType::StatusChanged, detail, event);
                    if self.store.compare_and_set_status(order_id, order.status, next, tx, entry).await? {
                        info!("🔄️ Order {order_id} is now {next} ({event})");
                        return Ok(ReconcileOutcome::Applied(next));
                    }
                    debug!("🔄️ Order {order_id} changed while {event} was being applied. Re-reading.");
                    order = self.store.fetch_order(order_id).await?.ok_or_else(|| {
                        StoreError::InconsistentData(format!("Order {order_id} disappeared during reconciliation"))
                    })?;
                },
                Decision::NoOp(reason) => {
                    if let NoOpReason::UnknownStatus(raw) = &reason {
                        warn!("🔄️ {event} carries an unrecognised status");
                        let detail = format!("Unrecognised gateway status '{raw}' for order in {}", order.status);
                        self.audit(order_id, AuditEventType::UnknownStatus, detail, event).await?;
                    } else {
                        debug!("🔄️ {event} does not change order {order_id}: {reason:?}");
                    }
                    return Ok(ReconcileOutcome::NoOp(reason));
                },
                Decision::Conflict(reason) => {
                    warn!("🔄️ {event} conflicts with order {order_id}: {reason:?}");
                    self.audit(order_id, AuditEventType::ReconcileConflict, format!("{reason:?}"), event).await?;
                    return Ok(ReconcileOutcome::Conflict(reason));
                },
            }
        }
        warn!("🔄️ Gave up applying {event} to contended order {order_id}");
        let reason = ConflictReason::ConcurrentModification;
        self.audit(order_id, AuditEventType::ReconcileConflict, format!("{reason:?}"), event).await?;
        Ok(ReconcileOutcome::Conflict(reason))
    }

    async fn audit(
        &self,
        order_id: &OrderId,
        event_type: AuditEventType,
        detail: String,
        event: &PaymentEvent,
    ) -> Result<(), StoreError> {
        self.store.append_audit_event(audit_entry(order_id, event_type, detail, event)).await?;
        Ok(())
    }
}

fn audit_entry(order_id: &OrderId, event_type: AuditEventType, detail: String, event: &PaymentEvent) -> NewAuditEvent {
    NewAuditEvent::new(order_id.clone(), event_type, detail)
        .with_transaction(event.gateway(), event.gateway_transaction_id())
}
