//! # Notification normalizer
//!
//! Turns a verified gateway payload into a [`PaymentEvent`], the one shape the rest of the engine understands.
//! Normalization is pure. Callers only hand over payloads that have already passed signature verification.
mod alipay;
mod payment_event;
mod stripe;

use chrono::{DateTime, Utc};
pub use alipay::map_trade_status as alipay_trade_status;
pub use payment_event::{PaymentEvent, PaymentStatus};
use thiserror::Error;

use crate::db_types::GatewayId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Maps a gateway payload onto a canonical [`PaymentEvent`].
///
/// `received_at` stands in for the event time when the payload does not carry one.
pub fn normalize(
    gateway: GatewayId,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<PaymentEvent, NormalizationError> {
    match gateway {
        GatewayId::Alipay => alipay::normalize(body, received_at),
        GatewayId::Stripe => stripe::normalize(body, received_at),
    }
}
