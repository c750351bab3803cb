use pns_common::MinorUnits;
use serde::Serialize;
use thiserror::Error;

use crate::{
    db_types::{GatewayId, OrderId},
    normalizer::PaymentEvent,
};

#[derive(Debug, Clone, Error)]
pub enum GatewayClientError {
    #[error("Gateway {0} is not configured")]
    NotConfigured(GatewayId),
    #[error("Gateway request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
    #[error("The gateway has no transaction for order {0}")]
    NoTransaction(OrderId),
    #[error("Gateway {0} does not support {1}")]
    Unsupported(GatewayId, &'static str),
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub gateway: GatewayId,
    pub order_id: OrderId,
    pub amount: MinorUnits,
    pub currency: String,
    pub subject: String,
    pub return_url: Option<String>,
}

/// Where to send the buyer to complete a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRedirect {
    pub gateway: GatewayId,
    pub order_id: OrderId,
    pub url: String,
}

/// A request to have a buyer sign a recurring-payment agreement.
#[derive(Debug, Clone)]
pub struct AgreementRequest {
    pub gateway: GatewayId,
    pub agreement_no: String,
    /// In the gateway's notation, e.g. `2y`.
    pub validity_period: String,
    pub return_url: Option<String>,
}

/// Where to send the buyer to sign an agreement.
#[derive(Debug, Clone, Serialize)]
pub struct AgreementRedirect {
    pub gateway: GatewayId,
    pub agreement_no: String,
    pub url: String,
}

/// Outbound calls to a payment gateway.
///
/// Inbound notification verification is not part of this trait: it needs no network access and lives in
/// [`crate::verifier`].
#[allow(async_fn_in_trait)]
pub trait GatewayClient {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentRedirect, GatewayClientError>;

    /// Fetches the current state of the payment for `order_id` at `gateway`, as a canonical event.
    async fn query_status(&self, gateway: GatewayId, order_id: &OrderId) -> Result<PaymentEvent, GatewayClientError>;

    /// Creates the page where the buyer signs a recurring-payment agreement. Gateways without agreements keep the
    /// default, which refuses.
    async fn create_agreement(&self, request: &AgreementRequest) -> Result<AgreementRedirect, GatewayClientError> {
        Err(GatewayClientError::Unsupported(request.gateway, "agreements"))
    }
}
