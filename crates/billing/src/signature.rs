//! Stripe webhook signature verification
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>]...`.
//! Each `v1` entry is hex(HMAC-SHA256(secret, "<t>.<raw body>")); Stripe sends
//! several while a signing secret is being rolled. Verification runs against
//! the raw request body, never a re-serialized one.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (in either direction) of a signed timestamp, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> BillingResult<Self> {
        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        BillingError::WebhookSignatureInvalid("malformed timestamp")
                    })?)
                }
                "v1" => signatures.push(value.to_string()),
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or(BillingError::WebhookSignatureInvalid("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(BillingError::WebhookSignatureInvalid("missing v1 signature"));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Hex-encoded signature Stripe would produce for this payload
pub fn compute_signature(payload: &str, timestamp: i64, secret: &str) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Config("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against the raw payload.
///
/// `now` is the current unix time; the secret is used verbatim as the HMAC key.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> BillingResult<()> {
    let header = SignatureHeader::parse(header)?;

    if (now - header.timestamp).abs() > tolerance_secs {
        tracing::warn!(
            timestamp = header.timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid(
            "timestamp outside tolerance",
        ));
    }

    let expected = compute_signature(payload, header.timestamp, secret)?;
    let matched = header
        .signatures
        .iter()
        .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));

    if !matched {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid("signature mismatch"));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn sign_for_test(payload: &str, secret: &str, timestamp: i64) -> String {
    let sig = compute_signature(payload, timestamp, secret).unwrap();
    format!("t={},v1={}", timestamp, sig)
}
