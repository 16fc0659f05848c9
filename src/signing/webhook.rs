//! Webhook payload signing.
//!
//! Flat HMAC-SHA256 over a canonical JSON document, rendered as
//! `sha256=<hex>`. Outbound deliveries always carry a timestamp; inbound
//! verification tolerates a missing one (some senders never adopted it)
//! but applies the max-age window whenever it is present.

use std::sync::Arc;

use serde_json::json;
use subtle::ConstantTimeEq;

use crate::clock::Clock;
use crate::config::schema::DigestAlgorithm;
use crate::signing::canonical::hmac_sign;
use crate::signing::SignatureError;

/// Header-ready webhook signature.
#[derive(Debug, Clone)]
pub struct WebhookSignature {
    /// `sha256=<hex>` value for `X-Webhook-Signature`.
    pub header_value: String,
    pub timestamp: i64,
    pub event_type: String,
}

/// Signs outbound and verifies inbound webhook payloads.
pub struct WebhookSigner {
    secret: Vec<u8>,
    max_age: i64,
    clock: Arc<dyn Clock>,
}

impl WebhookSigner {
    pub fn new(secret: &[u8], max_age: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.to_vec(),
            max_age,
            clock,
        }
    }

    /// Sign an outbound payload. Always timestamps.
    pub fn sign(
        &self,
        payload: &serde_json::Value,
        event_type: &str,
    ) -> Result<WebhookSignature, SignatureError> {
        let timestamp = self.clock.now() as i64;
        let mac = self.compute(payload, event_type, Some(timestamp))?;
        Ok(WebhookSignature {
            header_value: format!("sha256={}", hex::encode(mac)),
            timestamp,
            event_type: event_type.to_string(),
        })
    }

    /// Verify an inbound payload against its signature header.
    pub fn verify(
        &self,
        payload: &serde_json::Value,
        event_type: &str,
        header_value: &str,
        timestamp: Option<i64>,
    ) -> Result<(), SignatureError> {
        let presented = header_value
            .strip_prefix("sha256=")
            .ok_or_else(|| SignatureError::MissingHeader("x-webhook-signature".to_string()))?;

        if let Some(ts) = timestamp {
            if (self.clock.now() as i64 - ts).abs() > self.max_age {
                return Err(SignatureError::TimestampOutOfWindow);
            }
        } else {
            tracing::debug!(event = %event_type, "webhook verified without timestamp");
        }

        let mac = self.compute(payload, event_type, timestamp)?;
        let expected = hex::encode(mac);
        if expected.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() != 1 {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }

    /// Canonical JSON with sorted keys, no extraneous whitespace.
    /// serde_json's default map is ordered, so serialization is stable.
    fn compute(
        &self,
        payload: &serde_json::Value,
        event_type: &str,
        timestamp: Option<i64>,
    ) -> Result<Vec<u8>, SignatureError> {
        let canonical = match timestamp {
            Some(ts) => json!({
                "event_type": event_type,
                "payload": payload,
                "timestamp": ts,
            }),
            None => json!({
                "event_type": event_type,
                "payload": payload,
            }),
        };
        let serialized =
            serde_json::to_string(&canonical).map_err(|_| SignatureError::MalformedUrl)?;
        hmac_sign(DigestAlgorithm::Sha256, &self.secret, serialized.as_bytes())
    }
}
