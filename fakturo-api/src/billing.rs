/// Billing orchestration against the hosted payments API
///
/// Two thin outbound calls (checkout session, billing-portal session) and
/// the webhook signature check. The payments API is form-encoded and
/// authenticated with the account's secret key; organization and plan ride
/// along as metadata so webhook events can be reconciled back onto the
/// organization row.
///
/// # Webhook signatures
///
/// The processor signs each delivery with
/// `Stripe-Signature: t=<unix>,v1=<hex hmac>` where the MAC is
/// HMAC-SHA256 over `"{t}.{raw body}"`. Verification checks the MAC in
/// constant time and rejects timestamps outside a 5 minute tolerance.
/// Signature verification is the only replay guard; every event handler
/// writes absolute values, so a redelivered event is harmless.

use fakturo_shared::models::organization::{OrgPlan, Organization};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How far a webhook timestamp may drift before delivery is rejected
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Billing errors
#[derive(Debug, Error)]
pub enum BillingError {
    /// Payments API unreachable or returned an unexpected response
    #[error("Payments API error: {0}")]
    Api(String),

    /// The requested plan has no purchasable price (Free)
    #[error("Plan {0} cannot be purchased")]
    PlanNotPurchasable(&'static str),

    /// Webhook signature rejected
    #[error("Webhook signature invalid: {0}")]
    Signature(&'static str),
}

/// Configuration for the payments API client
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Payments API base URL
    pub api_base_url: String,

    /// Secret API key
    pub secret_key: String,

    /// Webhook signing secret
    pub webhook_secret: String,

    /// Price id for the Starter plan
    pub starter_price_id: String,

    /// Price id for the Pro plan
    pub pro_price_id: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl BillingConfig {
    /// Loads configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `BILLING_API_BASE_URL`: Payments API base (default: https://api.stripe.com)
    /// - `BILLING_SECRET_KEY`: Secret key (required)
    /// - `BILLING_WEBHOOK_SECRET`: Webhook signing secret (required)
    /// - `BILLING_STARTER_PRICE_ID` / `BILLING_PRO_PRICE_ID`: Price ids (required)
    /// - `BILLING_TIMEOUT_SECONDS`: Request timeout (default: 20)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_base_url = std::env::var("BILLING_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string())
            .trim_end_matches('/')
            .to_string();

        let secret_key = std::env::var("BILLING_SECRET_KEY")
            .map_err(|_| anyhow::anyhow!("BILLING_SECRET_KEY environment variable is required"))?;
        let webhook_secret = std::env::var("BILLING_WEBHOOK_SECRET").map_err(|_| {
            anyhow::anyhow!("BILLING_WEBHOOK_SECRET environment variable is required")
        })?;
        let starter_price_id = std::env::var("BILLING_STARTER_PRICE_ID").map_err(|_| {
            anyhow::anyhow!("BILLING_STARTER_PRICE_ID environment variable is required")
        })?;
        let pro_price_id = std::env::var("BILLING_PRO_PRICE_ID").map_err(|_| {
            anyhow::anyhow!("BILLING_PRO_PRICE_ID environment variable is required")
        })?;

        let timeout_seconds = std::env::var("BILLING_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);

        Ok(Self {
            api_base_url,
            secret_key,
            webhook_secret,
            starter_price_id,
            pro_price_id,
            timeout_seconds,
        })
    }

    /// Price id backing a plan, None for the free tier
    pub fn price_id_for(&self, plan: OrgPlan) -> Option<&str> {
        match plan {
            OrgPlan::Free => None,
            OrgPlan::Starter => Some(&self.starter_price_id),
            OrgPlan::Pro => Some(&self.pro_price_id),
        }
    }
}

/// A created checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session id
    pub id: String,

    /// Hosted checkout URL to redirect the browser to
    pub url: String,
}

/// A created billing-portal session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    /// Hosted portal URL to redirect the browser to
    pub url: String,
}

/// A webhook event envelope
///
/// Only the fields the reconciliation switch needs; the object payload
/// stays as raw JSON because its shape varies per event type.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event id
    pub id: String,

    /// Event type, e.g. "checkout.session.completed"
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload
    pub data: WebhookEventData,
}

/// Payload wrapper inside a webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The object the event describes (session, subscription, invoice)
    pub object: JsonValue,
}

/// Client for the hosted payments API
#[derive(Clone)]
pub struct BillingClient {
    http: reqwest::Client,
    config: BillingConfig,
}

impl BillingClient {
    /// Creates a client from configuration
    pub fn new(config: BillingConfig) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BillingError::Api(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { http, config })
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Creates a subscription checkout session for an organization
    ///
    /// The organization id and target plan are embedded as metadata on both
    /// the session and the subscription it creates, which is what the
    /// webhook switch keys on.
    pub async fn create_checkout_session(
        &self,
        org: &Organization,
        plan: OrgPlan,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        let price_id = self
            .config
            .price_id_for(plan)
            .ok_or(BillingError::PlanNotPurchasable(plan.as_str()))?;

        let org_id = org.id.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("metadata[organization_id]", &org_id),
            ("metadata[plan]", plan.as_str()),
            ("subscription_data[metadata][organization_id]", &org_id),
        ];

        // Reuse the customer when the organization has checked out before.
        if let Some(ref customer_id) = org.stripe_customer_id {
            form.push(("customer", customer_id));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base_url))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BillingError::Api(format!(
                "Checkout session creation returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BillingError::Api(e.to_string()))
    }

    /// Creates a billing-portal session for an existing customer
    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        let form = [("customer", customer_id), ("return_url", return_url)];

        let response = self
            .http
            .post(format!(
                "{}/v1/billing_portal/sessions",
                self.config.api_base_url
            ))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BillingError::Api(format!(
                "Portal session creation returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BillingError::Api(e.to_string()))
    }
}

/// Verifies a webhook delivery's signature header
///
/// # Arguments
///
/// * `payload` - Raw request body, exactly as received
/// * `signature_header` - The `Stripe-Signature` header value
/// * `secret` - Webhook signing secret
/// * `now_unix` - Current time (parameter so tests control the clock)
///
/// # Errors
///
/// Returns `BillingError::Signature` describing which check failed; the
/// handler collapses all of them into one 400.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), BillingError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::Signature("missing timestamp"))?;
    if candidates.is_empty() {
        return Err(BillingError::Signature("missing v1 signature"));
    }

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::Signature("timestamp outside tolerance"));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Signature("invalid secret"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    // Constant-time comparison against every presented v1 candidate.
    let valid = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| bytes.as_slice().ct_eq(&expected))
            .unwrap_or(false)
    });

    if valid {
        Ok(())
    } else {
        Err(BillingError::Signature("signature mismatch"))
    }
}

/// Constant-time byte comparison helper
trait ConstantTimeEq {
    fn ct_eq(&self, other: &[u8]) -> bool;
}

impl ConstantTimeEq for &[u8] {
    fn ct_eq(&self, other: &[u8]) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in self.iter().zip(other.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"id":"evt_1","type":"invoice.payment_failed"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);

        assert!(verify_webhook_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);

        let result = verify_webhook_signature(br#"{"id":"evt_2"}"#, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::Signature("signature mismatch"))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, "whsec_other");

        let result = verify_webhook_signature(payload, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::Signature("signature mismatch"))));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let signed_at = 1_700_000_000;
        let header = sign(payload, signed_at, SECRET);

        let now = signed_at + SIGNATURE_TOLERANCE_SECS + 1;
        let result = verify_webhook_signature(payload, &header, SECRET, now);
        assert!(matches!(
            result,
            Err(BillingError::Signature("timestamp outside tolerance"))
        ));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let payload = br#"{}"#;
        assert!(verify_webhook_signature(payload, "v1=abc", SECRET, 0).is_err());
        assert!(verify_webhook_signature(payload, "t=123", SECRET, 123).is_err());
        assert!(verify_webhook_signature(payload, "", SECRET, 0).is_err());
    }

    #[test]
    fn test_event_envelope_parses() {
        let json = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "customer": "cus_123" } }
        }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object["customer"], "cus_123");
    }

    #[test]
    fn test_price_mapping() {
        let config = BillingConfig {
            api_base_url: "https://api.stripe.test".to_string(),
            secret_key: "sk_test".to_string(),
            webhook_secret: SECRET.to_string(),
            starter_price_id: "price_starter".to_string(),
            pro_price_id: "price_pro".to_string(),
            timeout_seconds: 20,
        };
        assert_eq!(config.price_id_for(OrgPlan::Free), None);
        assert_eq!(config.price_id_for(OrgPlan::Starter), Some("price_starter"));
        assert_eq!(config.price_id_for(OrgPlan::Pro), Some("price_pro"));
    }
}
