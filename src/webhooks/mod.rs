//! Inbound gateway webhooks: signature verification and payload types.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::errors::ServiceError;
use crate::gateway::{ChargeOutcome, TransactionData};

type HmacSha512 = Hmac<Sha512>;

pub const CHARGE_SUCCESS: &str = "charge.success";
pub const CHARGE_FAILED: &str = "charge.failed";

/// Verifies a hex HMAC-SHA512 signature over the raw request body.
///
/// The comparison is constant-time. Nothing in the body is parsed before
/// this returns `Ok`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<(), ServiceError> {
    if secret.is_empty() {
        return Err(ServiceError::SignatureMismatch);
    }
    let provided = hex::decode(signature.trim()).map_err(|_| ServiceError::SignatureMismatch)?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook key: {}", e)))?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| ServiceError::SignatureMismatch)
}

/// Produces the signature the gateway would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Webhook envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: TransactionData,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self, ServiceError> {
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))
    }

    /// Charge outcome for events that settle a payment, `None` otherwise.
    pub fn charge_outcome(&self) -> Option<ChargeOutcome> {
        match self.event.as_str() {
            CHARGE_SUCCESS | CHARGE_FAILED => {
                let mut outcome = ChargeOutcome::from(self.data.clone());
                // The event name is authoritative over the embedded status.
                outcome.status = if self.event == CHARGE_SUCCESS {
                    crate::gateway::ChargeStatus::Success
                } else {
                    crate::gateway::ChargeStatus::Failed
                };
                Some(outcome)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChargeStatus;
    use assert_matches::assert_matches;

    const SECRET: &str = "whsec_test";

    fn body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "charge.success",
            "data": {"reference": "PAY-123", "status": "success", "amount": 630000}
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_passes() {
        let body = body();
        let sig = sign(SECRET, &body).unwrap();
        assert!(verify_signature(SECRET, &body, &sig).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let body = body();
        let sig = sign(SECRET, &body).unwrap();
        let mut tampered = body.clone();
        let last = tampered.len() - 2;
        tampered[last] = b'9';
        assert_matches!(
            verify_signature(SECRET, &tampered, &sig),
            Err(ServiceError::SignatureMismatch)
        );
    }

    #[test]
    fn garbage_signature_fails() {
        assert_matches!(
            verify_signature(SECRET, &body(), "not-hex"),
            Err(ServiceError::SignatureMismatch)
        );
        assert_matches!(
            verify_signature("", &body(), "00"),
            Err(ServiceError::SignatureMismatch)
        );
    }

    #[test]
    fn charge_events_yield_outcomes() {
        let payload = WebhookPayload::parse(&body()).unwrap();
        let outcome = payload.charge_outcome().unwrap();
        assert_eq!(outcome.reference, "PAY-123");
        assert_eq!(outcome.status, ChargeStatus::Success);

        let other = WebhookPayload {
            event: "transfer.success".into(),
            data: payload.data.clone(),
        };
        assert!(other.charge_outcome().is_none());
    }
}
