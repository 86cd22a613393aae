/// Email dispatch loop
///
/// Drains the Redis outbox: pop a job, check the recipient's preferences,
/// render the template variables, send through the mailer, and requeue on
/// failure until the attempt budget is spent. The loop polls with a short
/// BRPOP timeout so the cancellation token is honoured promptly.

use crate::mailer::{Mailer, OutboundEmail};
use fakturo_shared::email::queue::EmailQueue;
use fakturo_shared::email::{EmailJob, EmailTemplate};
use fakturo_shared::models::email_preferences::EmailPreferences;
use fakturo_shared::tokens::generate_token;
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How long one BRPOP blocks before the loop re-checks for shutdown
const POP_TIMEOUT_SECS: u64 = 5;

/// Outcome of handling one job, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Message went out
    Sent,

    /// Recipient opted out of this category
    SkippedByPreference,

    /// Send failed, job requeued
    Requeued,

    /// Send failed with no attempts left
    Dropped,
}

/// Whether a template may be sent to a recipient with these preferences
///
/// Transactional templates always send. Non-transactional ones honour the
/// product-updates flag; an absent row means nothing was opted out yet.
pub fn should_send(template: &EmailTemplate, prefs: Option<&EmailPreferences>) -> bool {
    if template.is_transactional() {
        return true;
    }
    prefs.map(|p| p.product_updates).unwrap_or(true)
}

/// Flattens a template into the variables the email API expects
///
/// The serde representation carries the template discriminator inline;
/// strip it so only the actual variables remain.
pub fn template_variables(template: &EmailTemplate) -> serde_json::Value {
    let mut value = serde_json::to_value(template).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(map) = value.as_object_mut() {
        map.remove("template");
    }
    value
}

/// The dispatch worker
pub struct Dispatcher {
    db: PgPool,
    queue: EmailQueue,
    mailer: Arc<dyn Mailer>,

    /// Public frontend base URL for unsubscribe links
    app_base_url: String,
}

impl Dispatcher {
    /// Creates a dispatcher
    pub fn new(db: PgPool, queue: EmailQueue, mailer: Arc<dyn Mailer>, app_base_url: &str) -> Self {
        Self {
            db,
            queue,
            mailer,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Runs the loop until the cancellation token fires
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Email dispatcher started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.queue.pop(POP_TIMEOUT_SECS) => match result {
                    Ok(Some(job)) => job,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Outbox pop failed; backing off");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                },
            };

            let outcome = self.handle(job).await;
            tracing::debug!(?outcome, "Email job handled");
        }

        tracing::info!("Email dispatcher stopped");
    }

    /// Handles a single job
    pub async fn handle(&self, job: EmailJob) -> DispatchOutcome {
        // Preference lookup is best-effort: on a database error the message
        // still goes out rather than silently piling up in the queue.
        let prefs = match EmailPreferences::get_or_create(&self.db, &job.to, &generate_token()).await
        {
            Ok(prefs) => Some(prefs),
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Preference lookup failed");
                None
            }
        };

        if !should_send(&job.template, prefs.as_ref()) {
            tracing::info!(
                job_id = %job.id,
                template = job.template.template_id(),
                "Recipient opted out; skipping send"
            );
            return DispatchOutcome::SkippedByPreference;
        }

        let unsubscribe_url = prefs.as_ref().map(|p| {
            format!(
                "{}/unsubscribe?token={}",
                self.app_base_url, p.unsubscribe_token
            )
        });

        let email = OutboundEmail {
            to: job.to.clone(),
            template_id: job.template.template_id().to_string(),
            variables: template_variables(&job.template),
            unsubscribe_url,
        };

        match self.mailer.send(&email).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job.id,
                    template = %email.template_id,
                    "Email sent"
                );
                DispatchOutcome::Sent
            }
            Err(e) if job.retryable() => {
                tracing::warn!(job_id = %job.id, error = %e, "Send failed; requeueing");
                let retry = EmailJob {
                    attempts: job.attempts + 1,
                    ..job
                };
                self.queue.enqueue_best_effort(retry).await;
                DispatchOutcome::Requeued
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Send failed; dropping job");
                DispatchOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn prefs(product_updates: bool) -> EmailPreferences {
        EmailPreferences {
            email: "a@b.com".to_string(),
            marketing: true,
            product_updates,
            unsubscribe_token: "tok".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_transactional_always_sends() {
        let template = EmailTemplate::PasswordReset {
            link: "https://x".to_string(),
        };
        assert!(should_send(&template, Some(&prefs(false))));
        assert!(should_send(&template, None));
    }

    #[test]
    fn test_welcome_honours_opt_out() {
        let template = EmailTemplate::Welcome { name: None };
        assert!(should_send(&template, Some(&prefs(true))));
        assert!(!should_send(&template, Some(&prefs(false))));
        assert!(should_send(&template, None));
    }

    #[test]
    fn test_template_variables_strip_discriminator() {
        let template = EmailTemplate::VerifyEmail {
            link: "https://app.fakturo.ch/verify?token=abc".to_string(),
        };
        let variables = template_variables(&template);
        assert_eq!(
            variables,
            serde_json::json!({ "link": "https://app.fakturo.ch/verify?token=abc" })
        );
    }
}
