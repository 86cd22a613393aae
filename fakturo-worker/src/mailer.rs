/// Transactional email delivery
///
/// The `Mailer` trait is the contract the dispatch loop sends through; the
/// HTTP implementation posts template-rendered sends to the hosted email
/// API, and the mock collects sends in memory for tests.
///
/// Every message carries a List-Unsubscribe header pointing at the
/// recipient's token-keyed unsubscribe endpoint.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Mailer errors
#[derive(Debug, Error)]
pub enum MailerError {
    /// Email API unreachable or returned an unexpected response
    #[error("Email API error: {0}")]
    Api(String),
}

/// Configuration for the email API client
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Email API base URL
    pub api_base_url: String,

    /// API key
    pub api_key: String,

    /// From address for all sends
    pub from_address: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl MailerConfig {
    /// Loads configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `EMAIL_API_BASE_URL`: Email API base URL (required)
    /// - `EMAIL_API_KEY`: API key (required)
    /// - `EMAIL_FROM_ADDRESS`: From address (default: "Fakturo <no-reply@fakturo.ch>")
    /// - `EMAIL_TIMEOUT_SECONDS`: Request timeout (default: 15)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_base_url = std::env::var("EMAIL_API_BASE_URL")
            .map_err(|_| anyhow::anyhow!("EMAIL_API_BASE_URL environment variable is required"))?
            .trim_end_matches('/')
            .to_string();
        let api_key = std::env::var("EMAIL_API_KEY")
            .map_err(|_| anyhow::anyhow!("EMAIL_API_KEY environment variable is required"))?;

        let from_address = std::env::var("EMAIL_FROM_ADDRESS")
            .unwrap_or_else(|_| "Fakturo <no-reply@fakturo.ch>".to_string());

        let timeout_seconds = std::env::var("EMAIL_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        Ok(Self {
            api_base_url,
            api_key,
            from_address,
            timeout_seconds,
        })
    }
}

/// One outbound message, template-addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient address
    pub to: String,

    /// Template id at the email provider
    pub template_id: String,

    /// Template variables
    pub variables: JsonValue,

    /// Unsubscribe URL for the List-Unsubscribe header, if any
    pub unsubscribe_url: Option<String>,
}

/// Delivery contract the dispatch loop sends through
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends one message
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError>;
}

/// Mailer backed by the hosted transactional email API
pub struct HttpMailer {
    http: reqwest::Client,
    config: MailerConfig,
}

impl HttpMailer {
    /// Creates a mailer from configuration
    pub fn new(config: MailerConfig) -> Result<Self, MailerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| MailerError::Api(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        let mut body = serde_json::json!({
            "from": self.config.from_address,
            "to": email.to,
            "template_id": email.template_id,
            "variables": email.variables,
        });

        if let Some(ref url) = email.unsubscribe_url {
            body["headers"] = serde_json::json!({
                "List-Unsubscribe": format!("<{}>", url),
                "List-Unsubscribe-Post": "List-Unsubscribe=One-Click",
            });
        }

        let response = self
            .http
            .post(format!("{}/emails", self.config.api_base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailerError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailerError::Api(format!(
                "Send returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Mailer that records sends in memory
#[derive(Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,

    /// When true, every send fails (for retry tests)
    pub fail_sends: bool,
}

impl MockMailer {
    /// Creates an empty mock mailer
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        if self.fail_sends {
            return Err(MailerError::Api("Simulated send failure".to_string()));
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_mailer_records_sends() {
        let mailer = MockMailer::new();
        let email = OutboundEmail {
            to: "a@b.com".to_string(),
            template_id: "welcome".to_string(),
            variables: serde_json::json!({ "name": "Anna" }),
            unsubscribe_url: Some("https://app.fakturo.ch/unsubscribe?token=t".to_string()),
        };

        mailer.send(&email).await.expect("Send should succeed");

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], email);
    }

    #[tokio::test]
    async fn test_mock_mailer_failure_mode() {
        let mailer = MockMailer {
            fail_sends: true,
            ..Default::default()
        };
        let email = OutboundEmail {
            to: "a@b.com".to_string(),
            template_id: "welcome".to_string(),
            variables: serde_json::json!({}),
            unsubscribe_url: None,
        };

        assert!(mailer.send(&email).await.is_err());
        assert!(mailer.sent().await.is_empty());
    }
}
