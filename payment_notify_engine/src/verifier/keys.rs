use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use pns_common::Secret;
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, RsaPublicKey};
use thiserror::Error;

pub const DEFAULT_STRIPE_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, Clone, Error)]
pub enum KeyMaterialError {
    #[error("Invalid RSA public key: {0}")]
    InvalidPublicKey(String),
    #[error("No key material was supplied")]
    Empty,
}

/// All the key material needed to verify inbound notifications. A gateway with no keys configured rejects every
/// notification.
#[derive(Debug, Clone, Default)]
pub struct GatewayKeys {
    pub alipay: Option<AlipayKeys>,
    pub stripe: Option<StripeKeys>,
}

/// Alipay's RSA public keys. More than one key can be configured while a key is being rotated.
#[derive(Debug, Clone)]
pub struct AlipayKeys {
    pub(crate) public_keys: Vec<RsaPublicKey>,
}

impl AlipayKeys {
    pub fn new(public_keys: Vec<RsaPublicKey>) -> Result<Self, KeyMaterialError> {
        if public_keys.is_empty() {
            return Err(KeyMaterialError::Empty);
        }
        Ok(Self { public_keys })
    }

    /// Parses each entry as an SPKI or PKCS#1 PEM, or as bare base64 SPKI DER (the form the Alipay console shows).
    pub fn from_encoded<S: AsRef<str>>(keys: &[S]) -> Result<Self, KeyMaterialError> {
        let keys = keys.iter().map(|k| parse_public_key(k.as_ref())).collect::<Result<Vec<_>, _>>()?;
        Self::new(keys)
    }

    pub fn len(&self) -> usize {
        self.public_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }
}

/// Stripe webhook endpoint secrets (`whsec_…`). During a secret roll both the old and new secret are valid.
#[derive(Debug, Clone)]
pub struct StripeKeys {
    pub(crate) secrets: Vec<Secret<String>>,
    pub(crate) tolerance: Duration,
}

impl StripeKeys {
    pub fn new(secrets: Vec<Secret<String>>, tolerance: Duration) -> Result<Self, KeyMaterialError> {
        let secrets = secrets.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>();
        if secrets.is_empty() {
            return Err(KeyMaterialError::Empty);
        }
        Ok(Self { secrets, tolerance })
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }
}

fn parse_public_key(material: &str) -> Result<RsaPublicKey, KeyMaterialError> {
    let material = material.trim();
    if material.is_empty() {
        return Err(KeyMaterialError::Empty);
    }
    let result = if material.contains("BEGIN RSA PUBLIC KEY") {
        RsaPublicKey::from_pkcs1_pem(material).map_err(|e| e.to_string())
    } else if material.contains("BEGIN PUBLIC KEY") {
        RsaPublicKey::from_public_key_pem(material).map_err(|e| e.to_string())
    } else {
        STANDARD
            .decode(material.split_whitespace().collect::<String>())
            .map_err(|e| format!("Key is neither PEM nor base64. {e}"))
            .and_then(|der| RsaPublicKey::from_public_key_der(&der).map_err(|e| e.to_string()))
    };
    result.map_err(KeyMaterialError::InvalidPublicKey)
}
