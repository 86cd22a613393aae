/// Redis outbox queue for email jobs
///
/// A plain Redis list: producers LPUSH serialized jobs, the worker BRPOP-s
/// with a timeout so shutdown signals are noticed. Enqueueing is treated as
/// secondary from the API's perspective - see `enqueue_best_effort`.

use super::EmailJob;
use crate::redis::client::RedisClient;
use redis::AsyncCommands;
use thiserror::Error;

/// Redis key of the outbox list
pub const OUTBOX_KEY: &str = "emails:outbox";

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis failure
    #[error("Email queue unavailable: {0}")]
    Unavailable(String),

    /// Job failed to (de)serialize
    #[error("Email job corrupt: {0}")]
    Corrupt(String),
}

/// Producer/consumer handle for the outbox list
#[derive(Clone)]
pub struct EmailQueue {
    redis: RedisClient,
}

impl EmailQueue {
    /// Creates a queue handle over an existing Redis client
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    /// Pushes a job onto the outbox
    pub async fn enqueue(&self, job: &EmailJob) -> Result<(), QueueError> {
        let json = serde_json::to_string(job).map_err(|e| QueueError::Corrupt(e.to_string()))?;

        let mut conn = self.redis.get_connection();
        conn.lpush::<_, _, ()>(OUTBOX_KEY, json)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        Ok(())
    }

    /// Pushes a job, logging instead of failing
    ///
    /// Email is secondary to every flow that sends one; a full outbox
    /// outage downgrades to "no email" rather than a failed registration.
    pub async fn enqueue_best_effort(&self, job: EmailJob) {
        if let Err(e) = self.enqueue(&job).await {
            tracing::warn!(
                job_id = %job.id,
                template = job.template.template_id(),
                error = %e,
                "Failed to enqueue email; continuing"
            );
        }
    }

    /// Blocks up to `timeout_secs` for the next job
    ///
    /// Returns None on timeout so the worker loop can check for shutdown.
    pub async fn pop(&self, timeout_secs: u64) -> Result<Option<EmailJob>, QueueError> {
        let mut conn = self.redis.get_connection();

        let raw: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(OUTBOX_KEY)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        match raw {
            Some((_key, json)) => {
                let job =
                    serde_json::from_str(&json).map_err(|e| QueueError::Corrupt(e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Number of jobs currently waiting
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.redis.get_connection();
        conn.llen(OUTBOX_KEY)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailTemplate;
    use crate::redis::client::{RedisClient, RedisConfig};

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_enqueue_pop_roundtrip() {
        let client = RedisClient::new(RedisConfig::default_for_test())
            .await
            .expect("Redis should connect");
        let queue = EmailQueue::new(client);

        let job = EmailJob::new(
            "a@b.com",
            EmailTemplate::PasswordReset {
                link: "https://app.fakturo.ch/reset?token=abc".to_string(),
            },
        );
        queue.enqueue(&job).await.expect("Enqueue should succeed");

        let popped = queue
            .pop(1)
            .await
            .expect("Pop should succeed")
            .expect("Job should be present");
        assert_eq!(popped.id, job.id);
        assert_eq!(popped.to, "a@b.com");
    }
}
