use chrono::{TimeZone, Utc};
use gateway_tools::{
    AgreementSignRequest,
    AlipayApi,
    AlipayTrade,
    CheckoutSessionRequest,
    GatewayApiError,
    PagePayRequest,
    StripeApi,
    StripePaymentIntent,
};
use log::*;
use payment_notify_engine::{
    db_types::{GatewayId, OrderId},
    helpers::parse_china_standard_time,
    normalizer::{alipay_trade_status, PaymentEvent, PaymentStatus},
    AgreementRedirect,
    AgreementRequest,
    GatewayClient,
    GatewayClientError,
    PaymentRedirect,
    PaymentRequest,
};
use pns_common::MinorUnits;

use crate::{config::ServerConfig, errors::ServerError};

/// Alipay only settles page payments in renminbi.
const ALIPAY_CURRENCY: &str = "CNY";

/// The outbound gateway clients the server was configured with. A gateway without credentials is left out, and calls
/// for it fail with [`GatewayClientError::NotConfigured`].
#[derive(Clone, Default)]
pub struct GatewayClients {
    alipay: Option<AlipayApi>,
    stripe: Option<StripeApi>,
}

impl GatewayClients {
    pub fn new(alipay: Option<AlipayApi>, stripe: Option<StripeApi>) -> Self {
        Self { alipay, stripe }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let alipay = if config.alipay.app_private_key.is_empty() {
            info!("💳️ Alipay credentials are not configured. Alipay payments are disabled.");
            None
        } else {
            let api = AlipayApi::new(config.alipay.clone()).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
            Some(api)
        };
        let stripe = if config.stripe.secret_key.is_empty() {
            info!("💳️ Stripe credentials are not configured. Stripe payments are disabled.");
            None
        } else {
            let api = StripeApi::new(config.stripe.clone()).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
            Some(api)
        };
        Ok(Self { alipay, stripe })
    }

    /// The gateways that outbound calls can be made to.
    pub fn configured(&self) -> Vec<GatewayId> {
        let mut result = Vec::with_capacity(2);
        if self.alipay.is_some() {
            result.push(GatewayId::Alipay);
        }
        if self.stripe.is_some() {
            result.push(GatewayId::Stripe);
        }
        result
    }

    fn alipay(&self) -> Result<&AlipayApi, GatewayClientError> {
        self.alipay.as_ref().ok_or(GatewayClientError::NotConfigured(GatewayId::Alipay))
    }

    fn stripe(&self) -> Result<&StripeApi, GatewayClientError> {
        self.stripe.as_ref().ok_or(GatewayClientError::NotConfigured(GatewayId::Stripe))
    }
}

impl GatewayClient for GatewayClients {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentRedirect, GatewayClientError> {
        let url = match request.gateway {
            GatewayId::Alipay => {
                if !request.currency.eq_ignore_ascii_case(ALIPAY_CURRENCY) {
                    let msg = format!("Alipay cannot take payments in {}", request.currency);
                    return Err(GatewayClientError::RequestFailed(msg));
                }
                let page_pay = PagePayRequest {
                    out_trade_no: request.order_id.as_str().to_string(),
                    total_amount: request.amount,
                    subject: request.subject.clone(),
                    return_url: request.return_url.clone(),
                };
                self.alipay()?.page_pay_url(&page_pay).map_err(to_client_error)?
            },
            GatewayId::Stripe => {
                let session_request = CheckoutSessionRequest {
                    order_id: request.order_id.as_str().to_string(),
                    amount: request.amount,
                    currency: request.currency.clone(),
                    product_name: request.subject.clone(),
                };
                let session = self.stripe()?.create_checkout_session(&session_request).await.map_err(to_client_error)?;
                session.url.ok_or_else(|| {
                    GatewayClientError::InvalidResponse(format!("Checkout session {} has no URL", session.id))
                })?
            },
        };
        Ok(PaymentRedirect { gateway: request.gateway, order_id: request.order_id.clone(), url })
    }

    async fn query_status(&self, gateway: GatewayId, order_id: &OrderId) -> Result<PaymentEvent, GatewayClientError> {
        match gateway {
            GatewayId::Alipay => {
                let trade = self.alipay()?.query_trade(order_id.as_str()).await.map_err(to_client_error)?;
                let trade = trade.ok_or_else(|| GatewayClientError::NoTransaction(order_id.clone()))?;
                alipay_trade_to_event(order_id, &trade)
            },
            GatewayId::Stripe => {
                let intent = self.stripe()?.find_payment_intent(order_id.as_str()).await.map_err(to_client_error)?;
                let intent = intent.ok_or_else(|| GatewayClientError::NoTransaction(order_id.clone()))?;
                stripe_intent_to_event(order_id, &intent)
            },
        }
    }

    async fn create_agreement(&self, request: &AgreementRequest) -> Result<AgreementRedirect, GatewayClientError> {
        if request.gateway != GatewayId::Alipay {
            return Err(GatewayClientError::Unsupported(request.gateway, "agreements"));
        }
        let sign_request = AgreementSignRequest {
            external_agreement_no: request.agreement_no.clone(),
            sign_validity_period: request.validity_period.clone(),
            return_url: request.return_url.clone(),
        };
        let url = self.alipay()?.agreement_sign_url(&sign_request).map_err(to_client_error)?;
        Ok(AgreementRedirect { gateway: GatewayId::Alipay, agreement_no: request.agreement_no.clone(), url })
    }
}

fn to_client_error(e: GatewayApiError) -> GatewayClientError {
    match e {
        GatewayApiError::JsonError(_) | GatewayApiError::RestResponseError(_) => {
            GatewayClientError::InvalidResponse(e.to_string())
        },
        _ => GatewayClientError::RequestFailed(e.to_string()),
    }
}

/// A trade the buyer has not paid for yet says nothing about the order, so it is reported as no transaction.
pub(crate) fn alipay_trade_to_event(order_id: &OrderId, trade: &AlipayTrade) -> Result<PaymentEvent, GatewayClientError> {
    if trade.trade_status == "WAIT_BUYER_PAY" {
        return Err(GatewayClientError::NoTransaction(order_id.clone()));
    }
    let amount = MinorUnits::from_major_str(&trade.total_amount)
        .map_err(|e| GatewayClientError::InvalidResponse(format!("Invalid total_amount {}. {e}", trade.total_amount)))?;
    let occurred_at = trade.send_pay_date.as_deref().and_then(parse_china_standard_time).unwrap_or_else(Utc::now);
    let status = alipay_trade_status(&trade.trade_status);
    Ok(PaymentEvent::from_gateway_query(GatewayId::Alipay, order_id.clone(), &trade.trade_no, status, amount, occurred_at))
}

/// Only final intent states map onto an event. Everything else is still in progress at Stripe.
pub(crate) fn stripe_intent_to_event(
    order_id: &OrderId,
    intent: &StripePaymentIntent,
) -> Result<PaymentEvent, GatewayClientError> {
    let (status, amount) = match intent.status.as_str() {
        "succeeded" => (PaymentStatus::Succeeded, intent.amount_received),
        "canceled" => (PaymentStatus::Closed, intent.amount),
        other => {
            trace!("💳️ Payment intent {} for {order_id} is still {other}", intent.id);
            return Err(GatewayClientError::NoTransaction(order_id.clone()));
        },
    };
    let occurred_at = Utc.timestamp_opt(intent.created, 0).single().unwrap_or_else(Utc::now);
    Ok(PaymentEvent::from_gateway_query(
        GatewayId::Stripe,
        order_id.clone(),
        &intent.id,
        status,
        MinorUnits::from(amount),
        occurred_at,
    ))
}
