use std::collections::HashMap;

use pns_common::MinorUnits;
use serde::{Deserialize, Serialize};

//--------------------------------------      Alipay         ---------------------------------------------------------

/// The business parameters of an `alipay.trade.page.pay` request.
#[derive(Debug, Clone)]
pub struct PagePayRequest {
    pub out_trade_no: String,
    pub total_amount: MinorUnits,
    pub subject: String,
    pub return_url: Option<String>,
}

/// The business parameters of an `alipay.user.agreement.page.sign` request, which lets a buyer authorise recurring
/// deductions.
#[derive(Debug, Clone)]
pub struct AgreementSignRequest {
    /// The merchant's own reference for the agreement. Alipay echoes it back in the signing notification.
    pub external_agreement_no: String,
    /// How long the agreement stays valid, in Alipay's notation, e.g. `2y` or `6m`.
    pub sign_validity_period: String,
    pub return_url: Option<String>,
}

/// A trade as reported by `alipay.trade.query`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlipayTrade {
    pub trade_no: String,
    pub out_trade_no: String,
    pub trade_status: String,
    pub total_amount: String,
    #[serde(default)]
    pub send_pay_date: Option<String>,
}

/// The envelope around every Alipay OpenAPI response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AlipayResponseBody {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub sub_code: Option<String>,
    #[serde(default)]
    pub sub_msg: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

//--------------------------------------      Stripe         ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub product_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub created: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSearchResult<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}
