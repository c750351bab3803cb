use std::fmt::Display;

use chrono::{DateTime, Utc};
use pns_common::MinorUnits;

use crate::db_types::{GatewayId, LedgerKey, OrderId, PayloadDigest};

/// The gateway-independent outcome a notification reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Closed,
    Refunded,
    /// A status the service does not recognise. The raw gateway value is kept for the audit trail.
    Unknown(String),
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Succeeded => write!(f, "Succeeded"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Closed => write!(f, "Closed"),
            PaymentStatus::Refunded => write!(f, "Refunded"),
            PaymentStatus::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// A canonical payment notification. Once built, an event cannot be modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    gateway: GatewayId,
    merchant_order_id: OrderId,
    gateway_transaction_id: String,
    status: PaymentStatus,
    amount: MinorUnits,
    occurred_at: DateTime<Utc>,
    payload_digest: PayloadDigest,
}

impl PaymentEvent {
    pub fn new(
        gateway: GatewayId,
        merchant_order_id: OrderId,
        gateway_transaction_id: String,
        status: PaymentStatus,
        amount: MinorUnits,
        occurred_at: DateTime<Utc>,
        payload_digest: PayloadDigest,
    ) -> Self {
        Self { gateway, merchant_order_id, gateway_transaction_id, status, amount, occurred_at, payload_digest }
    }

    /// Builds an event from the result of a gateway status query rather than a pushed notification.
    ///
    /// Query results live in their own `query:` transaction id namespace, and their digest covers the canonical
    /// fields, so polling the same state twice deduplicates in the ledger.
    pub fn from_gateway_query(
        gateway: GatewayId,
        merchant_order_id: OrderId,
        remote_id: &str,
        status: PaymentStatus,
        amount: MinorUnits,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let gateway_transaction_id = format!("query:{remote_id}:{status}");
        let canonical = format!(
            "{gateway}|{}|{gateway_transaction_id}|{status}|{}",
            merchant_order_id.as_str(),
            amount.value()
        );
        let payload_digest = PayloadDigest::of(canonical.as_bytes());
        Self::new(gateway, merchant_order_id, gateway_transaction_id, status, amount, occurred_at, payload_digest)
    }

    pub fn gateway(&self) -> GatewayId {
        self.gateway
    }

    pub fn merchant_order_id(&self) -> &OrderId {
        &self.merchant_order_id
    }

    pub fn gateway_transaction_id(&self) -> &str {
        &self.gateway_transaction_id
    }

    pub fn status(&self) -> &PaymentStatus {
        &self.status
    }

    pub fn amount(&self) -> MinorUnits {
        self.amount
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload_digest(&self) -> &PayloadDigest {
        &self.payload_digest
    }

    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey::new(self.gateway, self.gateway_transaction_id.clone())
    }
}

impl Display for PaymentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} for order {} ({}, {})",
            self.gateway, self.gateway_transaction_id, self.merchant_order_id, self.status, self.amount
        )
    }
}
