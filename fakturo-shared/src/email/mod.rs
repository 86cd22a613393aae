/// Email jobs and the outbox queue
///
/// Handlers never talk to the transactional email API directly: they push
/// an `EmailJob` onto the Redis outbox list and return, and the worker
/// drains the list and performs the actual send. That keeps email-provider
/// latency and failures out of the request path.

pub mod queue;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum delivery attempts before a job is dropped
pub const MAX_ATTEMPTS: u32 = 3;

/// Transactional email templates with their variables
///
/// Each variant maps onto a template id at the email provider; the worker
/// flattens the payload into template variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum EmailTemplate {
    /// Registration verification link (24 h validity)
    VerifyEmail {
        /// Absolute verification URL containing the token
        link: String,
    },

    /// Passwordless sign-in link
    MagicLink {
        /// Provider-issued single-use link
        link: String,
    },

    /// Password-reset link (1 h validity)
    PasswordReset {
        /// Absolute reset URL containing the token
        link: String,
    },

    /// Post-verification welcome message
    Welcome {
        /// Recipient display name, if known
        name: Option<String>,
    },

    /// Subscription payment failed notice
    PaymentFailed {
        /// Organization name for the message body
        organization: String,
    },
}

impl EmailTemplate {
    /// Template id at the email provider
    pub fn template_id(&self) -> &'static str {
        match self {
            EmailTemplate::VerifyEmail { .. } => "verify-email",
            EmailTemplate::MagicLink { .. } => "magic-link",
            EmailTemplate::PasswordReset { .. } => "password-reset",
            EmailTemplate::Welcome { .. } => "welcome",
            EmailTemplate::PaymentFailed { .. } => "payment-failed",
        }
    }

    /// Whether the template is transactional
    ///
    /// Transactional mail ignores marketing opt-outs; everything here is
    /// currently transactional except the welcome message, which honours
    /// the product-updates preference.
    pub fn is_transactional(&self) -> bool {
        !matches!(self, EmailTemplate::Welcome { .. })
    }
}

/// One queued outbound email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    /// Job id (for log correlation)
    pub id: Uuid,

    /// Recipient address
    pub to: String,

    /// Template and variables
    #[serde(flatten)]
    pub template: EmailTemplate,

    /// Delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
}

impl EmailJob {
    /// Creates a fresh job
    pub fn new(to: &str, template: EmailTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            to: to.to_string(),
            template,
            attempts: 0,
        }
    }

    /// Whether the job may be retried after a failure
    pub fn retryable(&self) -> bool {
        self.attempts + 1 < MAX_ATTEMPTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_ids_are_distinct() {
        let templates = [
            EmailTemplate::VerifyEmail {
                link: "https://x".to_string(),
            },
            EmailTemplate::MagicLink {
                link: "https://x".to_string(),
            },
            EmailTemplate::PasswordReset {
                link: "https://x".to_string(),
            },
            EmailTemplate::Welcome { name: None },
            EmailTemplate::PaymentFailed {
                organization: "Muster AG".to_string(),
            },
        ];
        let mut ids: Vec<_> = templates.iter().map(|t| t.template_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), templates.len());
    }

    #[test]
    fn test_welcome_is_not_transactional() {
        assert!(!EmailTemplate::Welcome { name: None }.is_transactional());
        assert!(EmailTemplate::PasswordReset {
            link: "https://x".to_string()
        }
        .is_transactional());
    }

    #[test]
    fn test_job_serializes_flat() {
        let job = EmailJob::new(
            "a@b.com",
            EmailTemplate::VerifyEmail {
                link: "https://app.fakturo.ch/verify?token=abc".to_string(),
            },
        );
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["template"], "verify_email");
        assert_eq!(json["to"], "a@b.com");

        let back: EmailJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.template, job.template);
    }

    #[test]
    fn test_retry_budget() {
        let mut job = EmailJob::new("a@b.com", EmailTemplate::Welcome { name: None });
        assert!(job.retryable());
        job.attempts = MAX_ATTEMPTS - 1;
        assert!(!job.retryable());
    }
}
