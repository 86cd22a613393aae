/// Fixed-window rate limiting
///
/// Counts requests per (operation, identifier) pair in Redis: the first
/// request of a window INCRs the key to 1 and sets EXPIRE to the window
/// size; later requests INCR the same key; the request is denied once the
/// count exceeds the operation's limit. When the key expires the window
/// starts fresh.
///
/// Rate limiting protects secondary abuse vectors (email flooding, pending-
/// registration spam), not primary authentication, so availability wins:
/// any Redis failure logs a warning and the request is allowed.
///
/// # Storage
///
/// Keys: `ratelimit:{op}:{identifier}`, TTL = window size.
///
/// # Example
///
/// ```no_run
/// use fakturo_shared::redis::client::{RedisClient, RedisConfig};
/// use fakturo_shared::redis::rate_limit::{RateLimiter, RateLimitOp};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// let limiter = RateLimiter::new(client);
///
/// let decision = limiter.check(RateLimitOp::Login, "user@example.com").await;
/// if !decision.allowed {
///     println!("Try again in {} seconds", decision.retry_after);
/// }
/// # Ok(())
/// # }
/// ```

use super::client::RedisClient;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

/// Operations with their own counters and rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitOp {
    /// Registration form submission (identifier: email)
    Register,

    /// Password login attempt (identifier: email)
    Login,

    /// Magic-link request (identifier: email)
    MagicLink,

    /// Password-reset request (identifier: email)
    PasswordReset,

    /// Verification-email resend (identifier: email)
    ResendVerification,

    /// Anonymous consent write (identifier: client IP)
    ConsentWrite,
}

impl RateLimitOp {
    /// Key segment for this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitOp::Register => "register",
            RateLimitOp::Login => "login",
            RateLimitOp::MagicLink => "magic_link",
            RateLimitOp::PasswordReset => "password_reset",
            RateLimitOp::ResendVerification => "resend_verification",
            RateLimitOp::ConsentWrite => "consent_write",
        }
    }

    /// Limit and window for this operation
    pub fn rule(&self) -> RateLimitRule {
        match self {
            RateLimitOp::Register => RateLimitRule {
                limit: 5,
                window_secs: 3600,
            },
            RateLimitOp::Login => RateLimitRule {
                limit: 10,
                window_secs: 900,
            },
            RateLimitOp::MagicLink => RateLimitRule {
                limit: 3,
                window_secs: 3600,
            },
            RateLimitOp::PasswordReset => RateLimitRule {
                limit: 3,
                window_secs: 3600,
            },
            RateLimitOp::ResendVerification => RateLimitRule {
                limit: 3,
                window_secs: 3600,
            },
            RateLimitOp::ConsentWrite => RateLimitRule {
                limit: 30,
                window_secs: 3600,
            },
        }
    }
}

/// Limit/window pair for one operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Requests allowed per window
    pub limit: u32,

    /// Window size in seconds (also the counter TTL)
    pub window_secs: u64,
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Requests left in the current window (0 when denied)
    pub remaining: u32,

    /// Seconds until the window resets (0 when allowed)
    pub retry_after: u64,
}

impl RateLimitDecision {
    fn allow_all(rule: RateLimitRule) -> Self {
        Self {
            allowed: true,
            remaining: rule.limit,
            retry_after: 0,
        }
    }
}

/// Maps a window count onto a decision
///
/// `count` is the counter value *after* this request's INCR, so the first
/// request of a window sees 1. With limit N the N-th request passes and the
/// (N+1)-th is denied.
fn decide(count: u64, rule: RateLimitRule, ttl_secs: u64) -> RateLimitDecision {
    if count <= rule.limit as u64 {
        RateLimitDecision {
            allowed: true,
            remaining: rule.limit - count as u32,
            retry_after: 0,
        }
    } else {
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after: ttl_secs.max(1),
        }
    }
}

/// Redis-backed fixed-window rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
}

impl RateLimiter {
    /// Creates a rate limiter over an existing Redis client
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    /// Counter key for an (operation, identifier) pair
    fn key(op: RateLimitOp, identifier: &str) -> String {
        format!("ratelimit:{}:{}", op.as_str(), identifier.to_lowercase())
    }

    /// Checks and counts one request
    ///
    /// Never returns an error: Redis failures are logged and the request is
    /// allowed (fail open).
    pub async fn check(&self, op: RateLimitOp, identifier: &str) -> RateLimitDecision {
        let rule = op.rule();
        let key = Self::key(op, identifier);
        let mut conn = self.redis.get_connection();

        let count: u64 = match conn.incr(&key, 1u64).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(op = op.as_str(), error = %e, "Rate limit INCR failed; allowing request");
                return RateLimitDecision::allow_all(rule);
            }
        };

        // First request of the window starts the TTL.
        if count == 1 {
            let expire: Result<(), _> = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(rule.window_secs)
                .query_async(&mut conn)
                .await;
            if let Err(e) = expire {
                tracing::warn!(op = op.as_str(), error = %e, "Rate limit EXPIRE failed");
            }
        }

        let ttl_secs = if count > rule.limit as u64 {
            let ttl: Result<i64, _> = redis::cmd("TTL").arg(&key).query_async(&mut conn).await;
            match ttl {
                Ok(ttl) if ttl > 0 => ttl as u64,
                _ => rule.window_secs,
            }
        } else {
            0
        };

        decide(count, rule, ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateLimitRule = RateLimitRule {
        limit: 5,
        window_secs: 3600,
    };

    #[test]
    fn test_first_request_allowed() {
        let decision = decide(1, RULE, 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.retry_after, 0);
    }

    #[test]
    fn test_nth_request_allowed() {
        let decision = decide(5, RULE, 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_n_plus_first_request_denied() {
        let decision = decide(6, RULE, 1200);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, 1200);
    }

    #[test]
    fn test_denied_retry_after_never_zero() {
        let decision = decide(6, RULE, 0);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, 1);
    }

    #[test]
    fn test_key_is_case_insensitive() {
        assert_eq!(
            RateLimiter::key(RateLimitOp::Login, "User@Example.com"),
            RateLimiter::key(RateLimitOp::Login, "user@example.com"),
        );
    }

    #[test]
    fn test_ops_have_distinct_keys() {
        assert_ne!(
            RateLimiter::key(RateLimitOp::Login, "a@b.com"),
            RateLimiter::key(RateLimitOp::Register, "a@b.com"),
        );
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_window_enforced_against_redis() {
        use crate::redis::client::{RedisClient, RedisConfig};

        let client = RedisClient::new(RedisConfig::default_for_test())
            .await
            .expect("Redis should connect");
        let limiter = RateLimiter::new(client);

        let identifier = format!("test-{}@example.com", uuid::Uuid::new_v4());
        let rule = RateLimitOp::MagicLink.rule();

        for _ in 0..rule.limit {
            let decision = limiter.check(RateLimitOp::MagicLink, &identifier).await;
            assert!(decision.allowed);
        }

        let denied = limiter.check(RateLimitOp::MagicLink, &identifier).await;
        assert!(!denied.allowed);
        assert!(denied.retry_after > 0);
    }
}
