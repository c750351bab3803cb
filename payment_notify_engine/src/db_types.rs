use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use pns_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

//--------------------------------------      GatewayId       ---------------------------------------------------------
/// The payment gateways that can send notifications to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayId {
    Alipay,
    Stripe,
}

impl GatewayId {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Alipay => "alipay",
            GatewayId::Stripe => "stripe",
        }
    }
}

impl Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alipay" => Ok(Self::Alipay),
            "stripe" => Ok(Self::Stripe),
            s => Err(ConversionError(format!("Unknown gateway: {s}"))),
        }
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order exists, but no payment has been started for it.
    Created,
    /// A payment has been created at the gateway and the buyer has been redirected to it.
    Pending,
    /// The gateway has confirmed the payment in full.
    Paid,
    /// The gateway reported that the payment failed.
    Failed,
    /// The trade was closed at the gateway, either unpaid or after a full refund.
    Closed,
    /// The payment was refunded.
    Refunded,
}

impl OrderStatusType {
    /// Terminal orders never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed | Self::Refunded)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Created => write!(f, "Created"),
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Failed => write!(f, "Failed"),
            OrderStatusType::Closed => write!(f, "Closed"),
            OrderStatusType::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            "Closed" => Ok(Self::Closed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The merchant's order identifier. Alipay calls this `out_trade_no`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub amount: MinorUnits,
    pub currency: String,
    pub last_applied_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub amount: MinorUnits,
    pub currency: String,
}

impl NewOrder {
    pub fn new(order_id: OrderId, amount: MinorUnits, currency: &str) -> Self {
        Self { order_id, amount, currency: currency.to_ascii_uppercase() }
    }
}

//--------------------------------------     PayloadDigest     ---------------------------------------------------------
/// Lowercase hex SHA-256 of the authenticated part of a notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PayloadDigest(String);

impl PayloadDigest {
    pub fn of(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        Self(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PayloadDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------       LedgerKey       ---------------------------------------------------------
/// The deduplication key for the idempotency ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub gateway: GatewayId,
    pub transaction_id: String,
}

impl LedgerKey {
    pub fn new<S: Into<String>>(gateway: GatewayId, transaction_id: S) -> Self {
        Self { gateway, transaction_id: transaction_id.into() }
    }
}

impl Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.gateway, self.transaction_id)
    }
}

//--------------------------------------  IdempotencyRecord    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LedgerState {
    /// A handler has claimed the transaction and is applying it.
    Reserved,
    /// The transaction has been applied. The record is immutable from here on.
    Committed,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IdempotencyRecord {
    pub id: i64,
    pub gateway: GatewayId,
    pub gateway_transaction_id: String,
    pub payload_digest: PayloadDigest,
    pub state: LedgerState,
    pub applied_order_status: Option<OrderStatusType>,
    /// Incremented every time a stale reservation is reclaimed. Used as the compare-and-set token for reclaims.
    pub attempts: i64,
    pub first_seen_at: DateTime<Utc>,
    pub reserved_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.gateway, self.gateway_transaction_id.clone())
    }
}

//--------------------------------------      AuditEvent       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditEventType {
    /// The order moved to a new status.
    StatusChanged,
    /// A transaction id was replayed with a different payload.
    LedgerConflict,
    /// An event could not be applied to its order (amount mismatch, lost race).
    ReconcileConflict,
    /// The gateway reported a status the service does not understand.
    UnknownStatus,
    /// An authentic notification referenced an order the service does not know about.
    UnknownOrder,
}

impl Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEvent {
    pub id: i64,
    pub order_id: OrderId,
    pub event_type: AuditEventType,
    pub gateway: Option<GatewayId>,
    pub gateway_transaction_id: Option<String>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEvent {
    pub order_id: OrderId,
    pub event_type: AuditEventType,
    pub gateway: Option<GatewayId>,
    pub gateway_transaction_id: Option<String>,
    pub detail: String,
}

impl NewAuditEvent {
    pub fn new<S: Into<String>>(order_id: OrderId, event_type: AuditEventType, detail: S) -> Self {
        Self { order_id, event_type, gateway: None, gateway_transaction_id: None, detail: detail.into() }
    }

    pub fn with_transaction(mut self, gateway: GatewayId, transaction_id: &str) -> Self {
        self.gateway = Some(gateway);
        self.gateway_transaction_id = Some(transaction_id.to_string());
        self
    }
}
