use log::*;
use pns_common::{helpers::env_or_file, Secret};

pub const ALIPAY_GATEWAY_URL: &str = "https://openapi.alipay.com/gateway.do";
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone, Default)]
pub struct AlipayConfig {
    pub app_id: String,
    pub gateway_url: String,
    /// The merchant's RSA private key, used to sign outbound requests. PEM, or bare base64 DER as issued by the
    /// Alipay console.
    pub app_private_key: Secret<String>,
    pub notify_url: String,
    pub return_url: Option<String>,
}

impl AlipayConfig {
    pub fn new_from_env_or_default() -> Self {
        let app_id = std::env::var("PNS_ALIPAY_APP_ID").unwrap_or_else(|_| {
            warn!("PNS_ALIPAY_APP_ID not set, using (probably useless) default");
            "2021000000000000".to_string()
        });
        let gateway_url = std::env::var("PNS_ALIPAY_GATEWAY_URL").unwrap_or_else(|_| {
            info!("PNS_ALIPAY_GATEWAY_URL not set, using {ALIPAY_GATEWAY_URL}");
            ALIPAY_GATEWAY_URL.to_string()
        });
        let app_private_key = match env_or_file("PNS_ALIPAY_APP_PRIVATE_KEY") {
            Ok(Some(key)) => Secret::new(key),
            Ok(None) => {
                warn!("PNS_ALIPAY_APP_PRIVATE_KEY not set. Alipay payments cannot be created.");
                Secret::default()
            },
            Err(e) => {
                error!("Could not read PNS_ALIPAY_APP_PRIVATE_KEY_FILE. {e}");
                Secret::default()
            },
        };
        let notify_url = std::env::var("PNS_ALIPAY_NOTIFY_URL").unwrap_or_else(|_| {
            warn!("PNS_ALIPAY_NOTIFY_URL not set. Alipay will not know where to send notifications.");
            String::default()
        });
        let return_url = std::env::var("PNS_ALIPAY_RETURN_URL").ok();
        Self { app_id, gateway_url, app_private_key, notify_url, return_url }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: Secret<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_base = std::env::var("PNS_STRIPE_API_BASE").unwrap_or_else(|_| {
            info!("PNS_STRIPE_API_BASE not set, using {STRIPE_API_BASE}");
            STRIPE_API_BASE.to_string()
        });
        let secret_key = match env_or_file("PNS_STRIPE_SECRET_KEY") {
            Ok(Some(key)) => Secret::new(key.trim().to_string()),
            Ok(None) => {
                warn!("PNS_STRIPE_SECRET_KEY not set. Stripe payments cannot be created.");
                Secret::default()
            },
            Err(e) => {
                error!("Could not read PNS_STRIPE_SECRET_KEY_FILE. {e}");
                Secret::default()
            },
        };
        let success_url = std::env::var("PNS_STRIPE_SUCCESS_URL").unwrap_or_else(|_| {
            warn!("PNS_STRIPE_SUCCESS_URL not set, using (probably useless) default");
            "https://example.com/success".to_string()
        });
        let cancel_url = std::env::var("PNS_STRIPE_CANCEL_URL").unwrap_or_else(|_| {
            warn!("PNS_STRIPE_CANCEL_URL not set, using (probably useless) default");
            "https://example.com/cancel".to_string()
        });
        Self { api_base, secret_key, success_url, cancel_url }
    }
}
