use std::fmt::Display;

use chrono::Utc;
use payment_notify_engine::{
    ack::{AckDecision, ProcessingResult},
    db_types::{AuditEvent, GatewayId, Order, OrderId},
    AgreementRequest,
    PaymentRequest,
};
use pns_common::MinorUnits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Body of `POST /api/payments`. `amount` is in minor units (fen, cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentParams {
    pub gateway: GatewayId,
    pub order_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
}

impl From<CreatePaymentParams> for PaymentRequest {
    fn from(params: CreatePaymentParams) -> Self {
        let subject = params.subject.unwrap_or_else(|| format!("Order {}", params.order_id));
        PaymentRequest {
            gateway: params.gateway,
            order_id: OrderId::from(params.order_id),
            amount: params.amount,
            currency: params.currency,
            subject,
            return_url: params.return_url,
        }
    }
}

/// Agreements are valid for two years unless the caller asks otherwise.
pub const DEFAULT_AGREEMENT_VALIDITY: &str = "2y";

/// Body of `POST /api/agreements`. Every field is optional. Without an `agreement_no`, one is derived from the
/// current time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAgreementParams {
    #[serde(default)]
    pub gateway: Option<GatewayId>,
    #[serde(default)]
    pub agreement_no: Option<String>,
    #[serde(default)]
    pub validity_period: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
}

impl From<CreateAgreementParams> for AgreementRequest {
    fn from(params: CreateAgreementParams) -> Self {
        let agreement_no = params.agreement_no.unwrap_or_else(|| format!("AGR{}", Utc::now().timestamp_millis()));
        AgreementRequest {
            gateway: params.gateway.unwrap_or(GatewayId::Alipay),
            agreement_no,
            validity_period: params.validity_period.unwrap_or_else(|| DEFAULT_AGREEMENT_VALIDITY.to_string()),
            return_url: params.return_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithHistory {
    pub order: Order,
    pub audit_trail: Vec<AuditEvent>,
}

/// The result of asking a gateway about an order and applying its answer.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub order_id: OrderId,
    pub gateway: GatewayId,
    pub outcome: String,
    pub acknowledged: bool,
}

impl SyncResult {
    pub fn new(order_id: OrderId, gateway: GatewayId, result: &ProcessingResult, decision: AckDecision) -> Self {
        Self { order_id, gateway, outcome: result.to_string(), acknowledged: decision == AckDecision::Acknowledge }
    }
}
