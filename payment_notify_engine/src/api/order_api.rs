use std::fmt::Debug;

use log::*;

use super::errors::OrderApiError;
use crate::{
    db_types::{AuditEvent, AuditEventType, NewAuditEvent, NewOrder, Order, OrderId, OrderStatusType},
    traits::{GatewayClient, InsertOrderResult, OrderStore, PaymentRedirect, PaymentRequest},
};

/// `OrderApi` is the merchant-facing side of the engine: it registers orders, starts payments for them at a gateway
/// and reports on their state.
pub struct OrderApi<B> {
    db: B,
}

impl<B> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi")
    }
}

impl<B: Clone> Clone for OrderApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> OrderApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderApi<B>
where B: OrderStore
{
    /// Registers the order (if it is new) and creates a payment for it at the requested gateway.
    ///
    /// Calling this again for the same order is allowed while the order is still unpaid, e.g. when the buyer abandoned
    /// the first checkout. The amount and currency must match the stored order.
    pub async fn create_payment<G: GatewayClient>(
        &self,
        client: &G,
        request: PaymentRequest,
    ) -> Result<PaymentRedirect, OrderApiError> {
        if request.amount.value() <= 0 {
            return Err(OrderApiError::InvalidRequest(format!("Amount must be positive, got {}", request.amount)));
        }
        if request.order_id.as_str().trim().is_empty() {
            return Err(OrderApiError::InvalidRequest("Order id cannot be empty".into()));
        }
        let new_order = NewOrder::new(request.order_id.clone(), request.amount, &request.currency);
        let order = match self.db.insert_order(new_order.clone()).await? {
            InsertOrderResult::Inserted(order) => {
                info!("📦️ New order {} for {} {}", order.order_id, order.amount, order.currency);
                order
            },
            InsertOrderResult::AlreadyExists(order) => {
                if order.amount != new_order.amount || order.currency != new_order.currency {
                    warn!("📦️ Payment requested for {} with different terms than the stored order", order.order_id);
                    return Err(OrderApiError::OrderMismatch(order.order_id));
                }
                order
            },
        };
        if !matches!(order.status, OrderStatusType::Created | OrderStatusType::Pending) {
            return Err(OrderApiError::InvalidStatus { order_id: order.order_id, status: order.status });
        }
        let redirect = client.create_payment(&request).await?;
        debug!("💳️ Payment for {} created at {}", order.order_id, request.gateway);
        if order.status == OrderStatusType::Created {
            let detail = format!("Created -> Pending (payment started at {})", request.gateway);
            let entry = NewAuditEvent::new(order.order_id.clone(), AuditEventType::StatusChanged, detail);
            let (from, to) = (OrderStatusType::Created, OrderStatusType::Pending);
            let moved = self.db.compare_and_set_status(&order.order_id, from, to, None, entry).await?;
            if !moved {
                // A notification got there first. The order is already further along.
                debug!("📦️ Order {} moved on before it could be marked Pending", order.order_id);
            }
        }
        Ok(redirect)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderApiError> {
        let order = self.db.fetch_order(order_id).await?;
        Ok(order)
    }

    /// The full audit trail for the order, oldest first.
    pub async fn fetch_audit_trail(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, OrderApiError> {
        let events = self.db.fetch_audit_events(order_id).await?;
        Ok(events)
    }
}
