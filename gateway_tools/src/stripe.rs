use std::sync::Arc;

use log::*;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;

use crate::{
    config::StripeConfig,
    CheckoutSession,
    CheckoutSessionRequest,
    GatewayApiError,
    StripePaymentIntent,
    StripeSearchResult,
};

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayApiError> {
        if config.secret_key.is_empty() {
            warn!("🔑️ No Stripe secret key configured. Outbound Stripe requests will fail.");
        }
        let client = Client::builder().build().map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Stripe takes form-encoded request bodies and answers in JSON.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, GatewayApiError> {
        if self.config.secret_key.is_empty() {
            return Err(GatewayApiError::RestRequestError("No Stripe secret key is configured".into()));
        }
        let url = self.url(path);
        trace!("Sending Stripe REST query: {method} {url}");
        let mut req = self.client.request(method.clone(), url).bearer_auth(self.config.secret_key.reveal());
        req = if method == Method::GET { req.query(params) } else { req.form(params) };
        let response = req.send().await.map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("Stripe REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
            Err(GatewayApiError::QueryError { status, message })
        }
    }

    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayApiError> {
        let params = checkout_session_params(&self.config, request);
        debug!("💳️ Creating Stripe checkout session for order {}", request.order_id);
        let session = self.rest_query::<CheckoutSession>(Method::POST, "/v1/checkout/sessions", &params).await?;
        info!("💳️ Created Stripe checkout session {} for order {}", session.id, request.order_id);
        Ok(session)
    }

    /// Finds the most recent payment intent tagged with the given merchant order id.
    pub async fn find_payment_intent(&self, order_id: &str) -> Result<Option<StripePaymentIntent>, GatewayApiError> {
        let query = format!("metadata['order_id']:'{}'", order_id.replace('\'', "\\'"));
        let params = vec![("query".to_string(), query)];
        let result = self
            .rest_query::<StripeSearchResult<StripePaymentIntent>>(Method::GET, "/v1/payment_intents/search", &params)
            .await?;
        debug!("💳️ Stripe returned {} payment intent(s) for order {order_id}", result.data.len());
        Ok(result.data.into_iter().max_by_key(|pi| pi.created))
    }
}

fn checkout_session_params(config: &StripeConfig, request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let p = |k: &str, v: String| (k.to_string(), v);
    vec![
        p("mode", "payment".into()),
        p("success_url", config.success_url.clone()),
        p("cancel_url", config.cancel_url.clone()),
        p("client_reference_id", request.order_id.clone()),
        p("metadata[order_id]", request.order_id.clone()),
        p("payment_intent_data[metadata][order_id]", request.order_id.clone()),
        p("line_items[0][quantity]", "1".into()),
        p("line_items[0][price_data][currency]", request.currency.to_ascii_lowercase()),
        p("line_items[0][price_data][unit_amount]", request.amount.value().to_string()),
        p("line_items[0][price_data][product_data][name]", request.product_name.clone()),
    ]
}

#[cfg(test)]
mod test {
    use pns_common::MinorUnits;

    use super::*;

    #[test]
    fn checkout_params_tag_the_order() {
        let config = StripeConfig {
            api_base: "https://api.stripe.com/".into(),
            success_url: "https://shop.example.com/ok".into(),
            cancel_url: "https://shop.example.com/cancel".into(),
            ..Default::default()
        };
        let request = CheckoutSessionRequest {
            order_id: "ORDER-7".into(),
            amount: MinorUnits::from(9900),
            currency: "USD".into(),
            product_name: "Widget".into(),
        };
        let params = checkout_session_params(&config, &request);
        let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("payment_intent_data[metadata][order_id]"), Some("ORDER-7"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("9900"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        let api = StripeApi::new(config).unwrap();
        assert_eq!(api.url("/v1/checkout/sessions"), "https://api.stripe.com/v1/checkout/sessions");
    }

    #[tokio::test]
    async fn missing_secret_key_fails_before_sending() {
        let api = StripeApi::new(StripeConfig::default()).unwrap();
        let err = api.find_payment_intent("ORDER-1").await.unwrap_err();
        assert!(matches!(err, GatewayApiError::RestRequestError(_)));
    }
}
