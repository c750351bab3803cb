//! Signed notifications for tests. The keys are generated on the fly, so every fixture is only valid against its own
//! [`GatewayKeys`].
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use pns_common::Secret;
use rsa::{
    pkcs1v15::SigningKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
    RsaPublicKey,
};
use serde_json::json;
use sha2::Sha256;

use crate::{
    db_types::GatewayId,
    helpers::FormParams,
    verifier::{
        stripe_signature_header,
        AlipayKeys,
        GatewayKeys,
        RawNotification,
        StripeKeys,
        DEFAULT_STRIPE_TOLERANCE_SECS,
        STRIPE_SIGNATURE_HEADER,
    },
};

pub const STRIPE_TEST_SECRET: &str = "whsec_test_secret";

pub struct GatewayFixture {
    alipay_key: RsaPrivateKey,
    pub keys: GatewayKeys,
}

impl GatewayFixture {
    pub fn new() -> Self {
        let alipay_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("Could not generate RSA key");
        let alipay = AlipayKeys::new(vec![RsaPublicKey::from(&alipay_key)]).expect("Could not create Alipay keys");
        let stripe = StripeKeys::new(
            vec![Secret::new(STRIPE_TEST_SECRET.to_string())],
            Duration::from_secs(DEFAULT_STRIPE_TOLERANCE_SECS),
        )
        .expect("Could not create Stripe keys");
        let keys = GatewayKeys { alipay: Some(alipay), stripe: Some(stripe) };
        Self { alipay_key, keys }
    }

    /// Signs the parameters the way Alipay does and returns the form-encoded body.
    pub fn signed_alipay_body(&self, params: &[(String, String)]) -> String {
        let encoded = serde_urlencoded::to_string(params).expect("Could not encode params");
        let content = FormParams::parse(encoded.as_bytes())
            .expect("Could not parse params")
            .canonical_string(&["sign", "sign_type"]);
        let signature = SigningKey::<Sha256>::new(self.alipay_key.clone()).sign(content.as_bytes());
        let mut all = params.to_vec();
        all.push(("sign".to_string(), STANDARD.encode(signature.to_bytes())));
        all.push(("sign_type".to_string(), "RSA2".to_string()));
        serde_urlencoded::to_string(&all).expect("Could not encode params")
    }

    pub fn alipay_notification(&self, params: &[(String, String)], received_at: DateTime<Utc>) -> RawNotification {
        let body = self.signed_alipay_body(params);
        RawNotification::new(GatewayId::Alipay, body.into_bytes(), received_at)
    }

    pub fn stripe_notification(&self, body: &[u8], received_at: DateTime<Utc>) -> RawNotification {
        let header = stripe_signature_header(STRIPE_TEST_SECRET, received_at.timestamp(), body);
        RawNotification::new(GatewayId::Stripe, body.to_vec(), received_at)
            .with_header(STRIPE_SIGNATURE_HEADER, &header)
    }
}

impl Default for GatewayFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The parameters of an Alipay `TRADE_SUCCESS` notification. `notify_id` varies per delivery, like the real thing.
pub fn alipay_trade_params(order_id: &str, trade_no: &str, trade_status: &str, amount: &str) -> Vec<(String, String)> {
    let p = |k: &str, v: &str| (k.to_string(), v.to_string());
    vec![
        p("notify_type", "trade_status_sync"),
        p("notify_id", &format!("ntf{}", rand::random::<u32>())),
        p("notify_time", "2024-05-02 04:30:01"),
        p("app_id", "2021000123456789"),
        p("charset", "utf-8"),
        p("version", "1.0"),
        p("out_trade_no", order_id),
        p("trade_no", trade_no),
        p("trade_status", trade_status),
        p("total_amount", amount),
        p("gmt_payment", "2024-05-02 04:30:00"),
        p("subject", "Test order"),
    ]
}

pub fn stripe_event_body(event_id: &str, event_type: &str, order_id: &str, amount: i64) -> Vec<u8> {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": "pi_test",
                "object": "payment_intent",
                "amount": amount,
                "amount_received": amount,
                "metadata": { "order_id": order_id }
            }
        }
    })
    .to_string()
    .into_bytes()
}
