//! Signed webhook envelopes.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex hmac>` where
//! the HMAC-SHA256 is computed over `"{t}.{raw body}"` with the shared
//! endpoint secret. Several `v1` entries may be present during secret
//! rotation; any match is accepted.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    TimestampOutsideTolerance,
    #[error("no matching signature")]
    Mismatch,
    #[error("invalid webhook secret")]
    InvalidSecret,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

impl ProcessorEvent {
    /// Id of the object the event is about (`pi_...`, `po_...`).
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(Value::as_str)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a signature header for `payload`. Used by tests and local tooling
/// to produce deliveries the verifier accepts.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signature = mac_for(secret, timestamp, payload)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={},v1={}", timestamp, signature)
}

/// Checks the header against the raw body. Comparison is constant time.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;

    if tolerance_secs > 0 && (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutsideTolerance);
    }

    for candidate in &parsed.signatures {
        let mac = mac_for(secret, parsed.timestamp, payload)?;
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Verifies the delivery and decodes the event envelope.
pub fn construct_event(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<ProcessorEvent, SignatureError> {
    verify_signature(payload, header, secret, tolerance_secs, now)?;
    serde_json::from_slice(payload).map_err(|e| SignatureError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    fn payload() -> Vec<u8> {
        br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123","metadata":{"transactionId":"abc"}}}}"#.to_vec()
    }

    #[test]
    fn accepts_valid_signature_and_decodes_event() {
        let body = payload();
        let header = sign_payload(&body, SECRET, NOW);

        let event = construct_event(&body, &header, SECRET, 300, NOW + 10).unwrap();
        assert_eq!(event.kind, "payment_intent.succeeded");
        assert_eq!(event.object_id(), Some("pi_123"));
        assert_eq!(event.metadata("transactionId"), Some("abc"));
        assert_eq!(event.metadata("walletId"), None);
    }

    #[test]
    fn rejects_tampered_body() {
        let body = payload();
        let header = sign_payload(&body, SECRET, NOW);
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");

        assert_eq!(
            verify_signature(&tampered, &header, SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = payload();
        let header = sign_payload(&body, "other", NOW);
        assert_eq!(
            verify_signature(&body, &header, SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = payload();
        let header = sign_payload(&body, SECRET, NOW - 301);
        assert_eq!(
            verify_signature(&body, &header, SECRET, 300, NOW),
            Err(SignatureError::TimestampOutsideTolerance)
        );
    }

    #[test]
    fn accepts_any_of_several_signatures() {
        let body = payload();
        let good = sign_payload(&body, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), good_sig);
        assert!(verify_signature(&body, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn rejects_malformed_headers() {
        let body = payload();
        for header in ["", "v1=abcd", "t=abc,v1=00", "t=1"] {
            assert_eq!(
                verify_signature(&body, header, SECRET, 300, NOW),
                Err(SignatureError::MalformedHeader),
                "header {header:?}"
            );
        }
    }

    #[test]
    fn valid_signature_over_garbage_is_invalid_payload() {
        let body = b"not json".to_vec();
        let header = sign_payload(&body, SECRET, NOW);
        assert!(matches!(
            construct_event(&body, &header, SECRET, 300, NOW),
            Err(SignatureError::InvalidPayload(_))
        ));
    }
}
