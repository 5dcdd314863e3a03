use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a Stripe signature timestamp, in seconds.
pub const STRIPE_SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature format")]
    Format,
    #[error("Invalid signature timestamp")]
    Timestamp,
    #[error("Signature timestamp outside tolerance")]
    Expired,
    #[error("Signature verification failed")]
    Mismatch,
    #[error("HMAC error: {0}")]
    Key(String),
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::WebhookVerification(err.to_string())
    }
}

fn hmac_hex(secret: &str, parts: &[&[u8]]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SignatureError::Key(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verifies a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for element in header.split(',') {
        if let Some(t) = element.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = element.trim().strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    let timestamp = timestamp
        .filter(|_| !signatures.is_empty())
        .ok_or(SignatureError::Format)?;

    let signed_at: i64 = timestamp.parse().map_err(|_| SignatureError::Timestamp)?;
    if (now - signed_at).abs() > STRIPE_SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = hmac_hex(secret, &[timestamp.as_bytes(), b".", payload])?;
    if signatures.iter().any(|s| constant_time_eq(s, &expected)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn stripe_signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let ts = timestamp.to_string();
    let signature = hmac_hex(secret, &[ts.as_bytes(), b".", payload])?;
    Ok(format!("t={},v1={}", ts, signature))
}

/// Verifies a `creem-signature` header: hex HMAC-SHA256 of the raw body.
pub fn verify_creem_signature(payload: &[u8], header: &str, secret: &str) -> Result<(), SignatureError> {
    let expected = creem_signature(payload, secret)?;
    if constant_time_eq(header.trim(), &expected) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

pub fn creem_signature(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    hmac_hex(secret, &[payload])
}
