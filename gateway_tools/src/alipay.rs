use std::sync::Arc;

use chrono::Utc;
use log::*;
use reqwest::{Client, Url};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

use crate::{
    config::AlipayConfig,
    data_objects::AlipayResponseBody,
    helpers::{alipay_timestamp, parse_private_key, rsa2_sign, signing_string},
    AgreementSignRequest,
    AlipayTrade,
    GatewayApiError,
    PagePayRequest,
};

const TRADE_NOT_EXIST: &str = "ACQ.TRADE_NOT_EXIST";
/// Periodic deduction without a fixed schedule. The merchant decides when to charge.
const AGREEMENT_PRODUCT_CODE: &str = "CYCLE_GENERAL_AUTH";

#[derive(Clone)]
pub struct AlipayApi {
    config: AlipayConfig,
    private_key: Option<Arc<RsaPrivateKey>>,
    client: Arc<Client>,
}

impl AlipayApi {
    pub fn new(config: AlipayConfig) -> Result<Self, GatewayApiError> {
        let private_key = if config.app_private_key.is_empty() {
            warn!("🔑️ No Alipay app private key configured. Outbound Alipay requests will fail.");
            None
        } else {
            Some(Arc::new(parse_private_key(config.app_private_key.reveal())?))
        };
        let client = Client::builder().build().map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, private_key, client: Arc::new(client) })
    }

    fn signed_params(
        &self,
        method: &str,
        biz_content: Value,
        extra: &[(&str, &str)],
    ) -> Result<Vec<(String, String)>, GatewayApiError> {
        let key = self
            .private_key
            .as_ref()
            .ok_or_else(|| GatewayApiError::SigningError("No Alipay app private key is configured".into()))?;
        let mut params = vec![
            ("app_id".to_string(), self.config.app_id.clone()),
            ("method".to_string(), method.to_string()),
            ("format".to_string(), "JSON".to_string()),
            ("charset".to_string(), "utf-8".to_string()),
            ("sign_type".to_string(), "RSA2".to_string()),
            ("timestamp".to_string(), alipay_timestamp(Utc::now())),
            ("version".to_string(), "1.0".to_string()),
            ("biz_content".to_string(), biz_content.to_string()),
        ];
        params.extend(extra.iter().filter(|(_, v)| !v.is_empty()).map(|(k, v)| (k.to_string(), v.to_string())));
        let sign = rsa2_sign(key, &signing_string(&params))?;
        params.push(("sign".to_string(), sign));
        Ok(params)
    }

    /// Builds the signed `alipay.trade.page.pay` URL the buyer is redirected to. No network call is made.
    pub fn page_pay_url(&self, request: &PagePayRequest) -> Result<String, GatewayApiError> {
        let biz_content = json!({
            "out_trade_no": request.out_trade_no,
            "total_amount": request.total_amount.to_major_string(),
            "subject": request.subject,
            "product_code": "FAST_INSTANT_TRADE_PAY",
        });
        let return_url = request.return_url.as_deref().or(self.config.return_url.as_deref()).unwrap_or_default();
        let extra = [("notify_url", self.config.notify_url.as_str()), ("return_url", return_url)];
        let params = self.signed_params("alipay.trade.page.pay", biz_content, &extra)?;
        let url = Url::parse_with_params(&self.config.gateway_url, &params)
            .map_err(|e| GatewayApiError::RestRequestError(e.to_string()))?;
        debug!("💳️ Created Alipay page pay URL for order {}", request.out_trade_no);
        Ok(url.to_string())
    }

    /// Builds the signed `alipay.user.agreement.page.sign` URL where the buyer authorises recurring deductions. Like
    /// [`Self::page_pay_url`], this makes no network call.
    pub fn agreement_sign_url(&self, request: &AgreementSignRequest) -> Result<String, GatewayApiError> {
        let biz_content = json!({
            "personal_product_code": AGREEMENT_PRODUCT_CODE,
            "external_agreement_no": request.external_agreement_no,
            "sign_validity_period": request.sign_validity_period,
            "access_params": { "channel": "ALIPAYAPP" },
        });
        let return_url = request.return_url.as_deref().or(self.config.return_url.as_deref()).unwrap_or_default();
        let extra = [("notify_url", self.config.notify_url.as_str()), ("return_url", return_url)];
        let params = self.signed_params("alipay.user.agreement.page.sign", biz_content, &extra)?;
        let url = Url::parse_with_params(&self.config.gateway_url, &params)
            .map_err(|e| GatewayApiError::RestRequestError(e.to_string()))?;
        debug!("💳️ Created Alipay agreement signing URL for {}", request.external_agreement_no);
        Ok(url.to_string())
    }

    /// Calls `alipay.trade.query`. Returns `None` when Alipay has no trade for this merchant order id (the buyer never
    /// opened the cashier page).
    pub async fn query_trade(&self, out_trade_no: &str) -> Result<Option<AlipayTrade>, GatewayApiError> {
        let params = self.signed_params("alipay.trade.query", json!({ "out_trade_no": out_trade_no }), &[])?;
        trace!("Sending alipay.trade.query for {out_trade_no}");
        let response = self
            .client
            .post(&self.config.gateway_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
            return Err(GatewayApiError::QueryError { status, message });
        }
        let body = response.json::<Value>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
        let trade = parse_query_response(body)?;
        match &trade {
            Some(t) => debug!("💳️ Alipay reports trade {} for order {out_trade_no} as {}", t.trade_no, t.trade_status),
            None => debug!("💳️ Alipay has no trade for order {out_trade_no}"),
        }
        Ok(trade)
    }
}

fn parse_query_response(mut body: Value) -> Result<Option<AlipayTrade>, GatewayApiError> {
    let inner = body
        .get_mut("alipay_trade_query_response")
        .map(Value::take)
        .ok_or_else(|| GatewayApiError::JsonError("alipay_trade_query_response is missing".into()))?;
    let inner = serde_json::from_value::<AlipayResponseBody>(inner)
        .map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
    if inner.code == "10000" {
        let trade = serde_json::from_value::<AlipayTrade>(Value::Object(inner.fields))
            .map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
        return Ok(Some(trade));
    }
    if inner.sub_code.as_deref() == Some(TRADE_NOT_EXIST) {
        return Ok(None);
    }
    let code = inner.sub_code.unwrap_or(inner.code);
    let message = inner.sub_msg.unwrap_or(inner.msg);
    Err(GatewayApiError::BusinessError { code, message })
}
