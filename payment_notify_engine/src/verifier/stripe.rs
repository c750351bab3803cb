use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

use super::{RawNotification, StripeKeys, VerificationOutcome};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, String> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for item in header.split(',') {
        let Some((k, v)) = item.trim().split_once('=') else {
            continue;
        };
        match k {
            "t" => {
                let t = v.parse::<i64>().map_err(|e| format!("Invalid timestamp in signature header. {e}"))?;
                timestamp = Some(t);
            },
            // Signatures that are not hex can never match. Skip them rather than reject the whole header.
            "v1" => signatures.extend(hex::decode(v).ok()),
            _ => {},
        }
    }
    let timestamp = timestamp.ok_or("The signature header has no timestamp")?;
    if signatures.is_empty() {
        return Err("The signature header has no v1 signature".into());
    }
    Ok(SignatureHeader { timestamp, signatures })
}

/// Checks a Stripe webhook against the configured endpoint secrets.
///
/// The expected signature is HMAC-SHA256 over `"{t}.{body}"`, keyed with the endpoint secret. Comparison is constant
/// time. The timestamp must be within the configured tolerance of the receive time, in either direction.
pub fn verify(notification: &RawNotification, keys: &StripeKeys) -> VerificationOutcome {
    let header = match notification.header(SIGNATURE_HEADER) {
        Some(h) => h,
        None => return VerificationOutcome::invalid("Missing Stripe-Signature header"),
    };
    let header = match parse_header(header) {
        Ok(h) => h,
        Err(e) => return VerificationOutcome::invalid(e),
    };
    let age = notification.received_at.timestamp().saturating_sub(header.timestamp).unsigned_abs();
    if age > keys.tolerance.as_secs() {
        return VerificationOutcome::invalid(format!("Timestamp is {age}s away from the receive time"));
    }
    let t = header.timestamp.to_string();
    for secret in &keys.secrets {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.reveal().as_bytes()) else {
            continue;
        };
        mac.update(t.as_bytes());
        mac.update(b".");
        mac.update(&notification.body);
        if header.signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok()) {
            return VerificationOutcome::valid();
        }
    }
    trace!("🔐️ Stripe signature did not match any of {} configured secret(s)", keys.secrets.len());
    VerificationOutcome::invalid("Signature does not match")
}

/// Computes the `Stripe-Signature` header value Stripe would send for `body` at time `t`.
pub fn sign(secret: &str, t: i64, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return format!("t={t}"),
    };
    mac.update(t.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes()))
}
