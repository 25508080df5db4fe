//! `t=<unix>,v1=<hex hmac-sha256>` webhook signatures over `"{t}.{payload}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::PaymentError;

type HmacSha256 = Hmac<Sha256>;

pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, PaymentError> {
    let digest = hex::encode(mac_for(payload, secret, timestamp)?.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={digest}"))
}

pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::Signature("missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(PaymentError::Signature("missing v1 signature".into()));
    }
    if (now - timestamp).unsigned_abs() > tolerance_secs {
        return Err(PaymentError::Signature(format!(
            "timestamp {timestamp} outside tolerance"
        )));
    }

    let expected = mac_for(payload, secret, timestamp)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(PaymentError::Signature("signature mismatch".into()))
    }
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::Signature("invalid webhook secret".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}
