use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use sha2::Sha256;

use crate::GatewayApiError;

/// Alipay timestamps are wall-clock times in China Standard Time.
pub const ALIPAY_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Reads an RSA private key given as PKCS#8 or PKCS#1 PEM, or as bare base64 DER (the format the Alipay console
/// hands out).
pub fn parse_private_key(material: &str) -> Result<RsaPrivateKey, GatewayApiError> {
    let material = material.trim();
    if material.is_empty() {
        return Err(GatewayApiError::InvalidKey("No private key has been configured".into()));
    }
    if material.contains("BEGIN RSA PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs1_pem(material).map_err(|e| GatewayApiError::InvalidKey(e.to_string()));
    }
    if material.contains("BEGIN PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs8_pem(material).map_err(|e| GatewayApiError::InvalidKey(e.to_string()));
    }
    let der = STANDARD
        .decode(material.split_whitespace().collect::<String>())
        .map_err(|e| GatewayApiError::InvalidKey(format!("Key is neither PEM nor base64. {e}")))?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
        .map_err(|e| GatewayApiError::InvalidKey(e.to_string()))
}

/// Builds the string Alipay signs: every parameter except `sign`, with empty values dropped, sorted by key and joined
/// as `k=v&k=v`. Values are used as-is, not URL-encoded.
pub fn signing_string<K: AsRef<str>, V: AsRef<str>>(params: &[(K, V)]) -> String {
    let mut pairs = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, v)| *k != "sign" && !v.is_empty())
        .collect::<Vec<_>>();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

/// Signs `content` with RSA PKCS#1 v1.5 over SHA-256 (Alipay's `RSA2`) and returns the base64 signature.
pub fn rsa2_sign(key: &RsaPrivateKey, content: &str) -> Result<String, GatewayApiError> {
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature =
        signing_key.try_sign(content.as_bytes()).map_err(|e| GatewayApiError::SigningError(e.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

pub fn alipay_timestamp(now: DateTime<Utc>) -> String {
    let local = now.naive_utc() + Duration::seconds(i64::from(ALIPAY_UTC_OFFSET_SECS));
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use rsa::{pkcs1v15::VerifyingKey, signature::Verifier, RsaPublicKey};

    use super::*;

    #[test]
    fn signing_string_sorts_and_skips() {
        let params = [("method", "alipay.trade.query"), ("app_id", "2021"), ("sign", "abc"), ("notify_url", "")];
        assert_eq!(signing_string(&params), "app_id=2021&method=alipay.trade.query");
    }

    #[test]
    fn timestamps_are_in_china_standard_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 20, 30, 0).unwrap();
        assert_eq!(alipay_timestamp(now), "2024-05-02 04:30:00");
    }

    #[test]
    fn sign_and_verify() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let der = rsa::pkcs8::EncodePrivateKey::to_pkcs8_der(&key).unwrap();
        let bare = STANDARD.encode(der.as_bytes());
        let parsed = parse_private_key(&bare).unwrap();
        let sig = rsa2_sign(&parsed, "a=1&b=2").unwrap();
        let sig = rsa::pkcs1v15::Signature::try_from(STANDARD.decode(sig).unwrap().as_slice()).unwrap();
        let verifier = VerifyingKey::<Sha256>::new(RsaPublicKey::from(&key));
        assert!(verifier.verify(b"a=1&b=2", &sig).is_ok());
        assert!(verifier.verify(b"a=1&b=3", &sig).is_err());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(parse_private_key("  "), Err(GatewayApiError::InvalidKey(_))));
        assert!(matches!(parse_private_key("not base64!"), Err(GatewayApiError::InvalidKey(_))));
    }
}
