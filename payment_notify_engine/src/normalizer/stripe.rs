use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::*;
use pns_common::MinorUnits;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db_types::{GatewayId, OrderId, PayloadDigest},
    normalizer::{NormalizationError, PaymentEvent, PaymentStatus},
};

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    created: Option<i64>,
    data: Option<StripeEventData>,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

/// The subset of PaymentIntent, Checkout Session and Charge fields the service reads.
#[derive(Debug, Default, Deserialize)]
struct StripeObject {
    #[serde(default)]
    metadata: HashMap<String, String>,
    client_reference_id: Option<String>,
    amount_received: Option<i64>,
    amount_total: Option<i64>,
    amount: Option<i64>,
    payment_status: Option<String>,
}

pub fn normalize(body: &[u8], received_at: DateTime<Utc>) -> Result<PaymentEvent, NormalizationError> {
    let event = serde_json::from_slice::<StripeEvent>(body)
        .map_err(|e| NormalizationError::MalformedPayload(e.to_string()))?;
    let transaction_id = event.id.filter(|s| !s.is_empty()).ok_or(NormalizationError::MissingField("id"))?;
    let event_type = event.event_type.filter(|s| !s.is_empty()).ok_or(NormalizationError::MissingField("type"))?;
    let object_value = event.data.map(|d| d.object).ok_or(NormalizationError::MissingField("data.object"))?;
    let object = StripeObject::deserialize(&object_value)
        .map_err(|e| NormalizationError::MalformedPayload(format!("data.object: {e}")))?;
    let order_id = object
        .metadata
        .get("order_id")
        .cloned()
        .or_else(|| object.client_reference_id.clone())
        .filter(|s| !s.is_empty())
        .ok_or(NormalizationError::MissingField("data.object.metadata.order_id"))?;
    let amount = object
        .amount_received
        .or(object.amount_total)
        .or(object.amount)
        .ok_or(NormalizationError::MissingField("data.object.amount"))?;
    if amount < 0 {
        return Err(NormalizationError::InvalidAmount(format!("{amount} is negative")));
    }
    let status = map_event_type(&event_type, object.payment_status.as_deref());
    let occurred_at = event.created.and_then(|t| DateTime::from_timestamp(t, 0)).unwrap_or(received_at);
    let digest = canonical_digest(&transaction_id, &event_type, &object_value);

    let event = PaymentEvent::new(
        GatewayId::Stripe,
        OrderId::from(order_id),
        transaction_id,
        status,
        MinorUnits::from(amount),
        occurred_at,
        digest,
    );
    trace!("🧾️ Normalized Stripe event: {event}");
    Ok(event)
}

/// Stripe redelivers an event with envelope fields (`pending_webhooks`, `request`, `created`) that can differ from the
/// first delivery. Only the event id, type and object snapshot identify what happened.
fn canonical_digest(event_id: &str, event_type: &str, object: &Value) -> PayloadDigest {
    let canonical = json!({ "id": event_id, "type": event_type, "data": { "object": object } });
    PayloadDigest::of(canonical.to_string().as_bytes())
}

fn map_event_type(event_type: &str, payment_status: Option<&str>) -> PaymentStatus {
    match (event_type, payment_status) {
        ("payment_intent.succeeded", _) => PaymentStatus::Succeeded,
        ("checkout.session.completed", Some("paid")) => PaymentStatus::Succeeded,
        ("payment_intent.payment_failed", _) => PaymentStatus::Failed,
        ("payment_intent.canceled", _) | ("checkout.session.expired", _) => PaymentStatus::Closed,
        ("charge.refunded", _) => PaymentStatus::Refunded,
        (other, _) => PaymentStatus::Unknown(other.to_string()),
    }
}
