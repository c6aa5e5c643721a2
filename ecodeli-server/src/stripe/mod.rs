//! Stripe integration via REST API (no SDK dependency)
//!
//! Escrow relies on PaymentIntents with `capture_method=manual`: the card
//! is authorized when the client pays, captured when the deliverer picks
//! the package up, and the payout happens on our side once the delivery
//! is validated.

use hmac::{Hmac, Mac};
use sha2::Sha256;

const API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("Stripe transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Stripe API error: {0}")]
    Api(String),
}

/// How the PaymentIntent is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMethod {
    /// Authorize now, capture later (escrowed deliveries)
    Manual,
    /// Capture as soon as the client confirms
    Automatic,
}

impl CaptureMethod {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

/// Extract `field` from a Stripe response, surfacing API errors
fn field(resp: &serde_json::Value, name: &str, op: &str) -> Result<String, StripeError> {
    if let Some(message) = resp["error"]["message"].as_str() {
        return Err(StripeError::Api(format!("{op}: {message}")));
    }
    resp[name]
        .as_str()
        .map(String::from)
        .ok_or_else(|| StripeError::Api(format!("{op} failed: {resp}")))
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
        }
    }

    async fn post(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value, StripeError> {
        let resp = self
            .http
            .post(format!("{API_BASE}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await?
            .json()
            .await?;
        Ok(resp)
    }

    /// Create a PaymentIntent; `amount` is in minor units (cents)
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        capture: CaptureMethod,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, StripeError> {
        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("capture_method".to_string(), capture.as_str().to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let resp = self.post("/payment_intents", &form).await?;
        Ok(PaymentIntent {
            id: field(&resp, "id", "create_payment_intent")?,
            client_secret: resp["client_secret"].as_str().map(String::from),
            status: field(&resp, "status", "create_payment_intent")?,
        })
    }

    /// Capture an authorized PaymentIntent, returns the new status
    pub async fn capture_payment_intent(&self, intent_id: &str) -> Result<String, StripeError> {
        let resp = self
            .post(&format!("/payment_intents/{intent_id}/capture"), &[])
            .await?;
        field(&resp, "status", "capture_payment_intent")
    }

    /// Release an authorization that will never be captured
    pub async fn cancel_payment_intent(&self, intent_id: &str) -> Result<String, StripeError> {
        let resp = self
            .post(&format!("/payment_intents/{intent_id}/cancel"), &[])
            .await?;
        field(&resp, "status", "cancel_payment_intent")
    }

    /// Refund a captured PaymentIntent, in full when `amount` is None
    pub async fn create_refund(
        &self,
        intent_id: &str,
        amount: Option<i64>,
    ) -> Result<String, StripeError> {
        let mut form = vec![("payment_intent".to_string(), intent_id.to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.to_string()));
        }
        let resp = self.post("/refunds", &form).await?;
        field(&resp, "id", "create_refund")
    }
}

/// Verify Stripe webhook signature (HMAC-SHA256)
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    verify_webhook_signature_at(payload, sig_header, secret, chrono::Utc::now().timestamp())
}

fn verify_webhook_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")?;

    // Reject events older than 5 minutes (replay protection)
    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > 300 {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = sign_payload(payload, SECRET, NOW);
        assert!(verify_webhook_signature_at(payload, &header, SECRET, NOW + 10).is_ok());
    }

    #[test]
    fn test_tampered_payload() {
        let header = sign_payload(b"{}", SECRET, NOW);
        assert_eq!(
            verify_webhook_signature_at(b"{ }", &header, SECRET, NOW),
            Err("Webhook signature mismatch")
        );
    }

    #[test]
    fn test_replay_window() {
        let header = sign_payload(b"{}", SECRET, NOW);
        assert_eq!(
            verify_webhook_signature_at(b"{}", &header, SECRET, NOW + 301),
            Err("Webhook timestamp too old")
        );
    }

    #[test]
    fn test_malformed_header() {
        assert_eq!(
            verify_webhook_signature_at(b"{}", "v1=abc", SECRET, NOW),
            Err("Invalid Stripe-Signature header")
        );
        assert_eq!(
            verify_webhook_signature_at(b"{}", "t=1,v1=zz", SECRET, NOW),
            Err("Invalid signature hex")
        );
    }

    #[test]
    fn test_error_body_surfaces_message() {
        let resp = serde_json::json!({"error": {"message": "No such payment_intent"}});
        let err = field(&resp, "id", "capture").unwrap_err();
        assert!(err.to_string().contains("No such payment_intent"));
    }
}
