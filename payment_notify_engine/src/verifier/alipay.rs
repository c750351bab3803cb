use base64::{engine::general_purpose::STANDARD, Engine};
use log::*;
use rsa::{
    pkcs1v15::{Signature, VerifyingKey},
    signature::Verifier,
};
use sha2::Sha256;

use super::{AlipayKeys, VerificationOutcome};
use crate::helpers::FormParams;

/// Checks an Alipay asynchronous notification against the configured Alipay public keys.
///
/// The signed content is every parameter except `sign` and `sign_type`, sorted by key with empty values dropped,
/// joined as `k=v&k=v` over the URL-decoded values. The signature is RSA PKCS#1 v1.5 over SHA-256.
pub fn verify(body: &[u8], keys: &AlipayKeys) -> VerificationOutcome {
    let params = match FormParams::parse(body) {
        Ok(p) => p,
        Err(e) => return VerificationOutcome::invalid(e.to_string()),
    };
    let sign = match params.get("sign") {
        Some(s) => s,
        None => return VerificationOutcome::invalid("The notification is not signed"),
    };
    if let Some(sign_type) = params.get("sign_type") {
        if sign_type != "RSA2" {
            return VerificationOutcome::invalid(format!("Unsupported sign_type {sign_type}"));
        }
    }
    let sig_bytes = match STANDARD.decode(sign.replace(' ', "+")) {
        Ok(b) => b,
        Err(e) => return VerificationOutcome::invalid(format!("Signature is not valid base64. {e}")),
    };
    let signature = match Signature::try_from(sig_bytes.as_slice()) {
        Ok(s) => s,
        Err(e) => return VerificationOutcome::invalid(format!("Malformed signature. {e}")),
    };
    let content = params.canonical_string(&["sign", "sign_type"]);
    let verified = keys
        .public_keys
        .iter()
        .any(|key| VerifyingKey::<Sha256>::new(key.clone()).verify(content.as_bytes(), &signature).is_ok());
    if verified {
        VerificationOutcome::valid()
    } else {
        trace!("🔐️ Alipay signature did not match any of {} configured key(s)", keys.len());
        VerificationOutcome::invalid("Signature does not match")
    }
}
