//! # Signature verification
//!
//! [`verify`] decides whether an inbound notification really comes from the gateway it claims to. It is a pure function
//! of the raw request and the configured key material: it performs no I/O and takes the receive time as an input, so
//! every result can be reproduced in a test.
//!
//! A notification that fails verification must not touch the ledger or any order.
mod alipay;
mod keys;
mod stripe;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
pub use keys::{AlipayKeys, GatewayKeys, KeyMaterialError, StripeKeys, DEFAULT_STRIPE_TOLERANCE_SECS};
pub use stripe::{sign as stripe_signature_header, SIGNATURE_HEADER as STRIPE_SIGNATURE_HEADER};

use crate::db_types::GatewayId;

/// An inbound notification exactly as it arrived: the unmodified body bytes plus the request headers.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub gateway: GatewayId,
    pub body: Vec<u8>,
    headers: HashMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl RawNotification {
    pub fn new(gateway: GatewayId, body: Vec<u8>, received_at: DateTime<Utc>) -> Self {
        Self { gateway, body, headers: HashMap::new(), received_at }
    }

    /// Header names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub reason: Option<String>,
}

impl VerificationOutcome {
    pub fn valid() -> Self {
        Self { valid: true, reason: None }
    }

    pub fn invalid<S: Into<String>>(reason: S) -> Self {
        Self { valid: false, reason: Some(reason.into()) }
    }
}

pub fn verify(notification: &RawNotification, keys: &GatewayKeys) -> VerificationOutcome {
    match notification.gateway {
        GatewayId::Alipay => match &keys.alipay {
            Some(k) => alipay::verify(&notification.body, k),
            None => VerificationOutcome::invalid("No Alipay public key is configured"),
        },
        GatewayId::Stripe => match &keys.stripe {
            Some(k) => stripe::verify(notification, k),
            None => VerificationOutcome::invalid("No Stripe webhook secret is configured"),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unconfigured_gateways_never_verify() {
        let n =
            RawNotification::new(GatewayId::Stripe, b"{}".to_vec(), Utc::now()).with_header("Stripe-Signature", "t=1");
        let outcome = verify(&n, &GatewayKeys::default());
        assert!(!outcome.valid);
        assert_eq!(n.header("stripe-SIGNATURE"), Some("t=1"));
        let n = RawNotification::new(GatewayId::Alipay, b"a=1".to_vec(), Utc::now());
        assert!(!verify(&n, &GatewayKeys::default()).valid);
    }
}
