/// Opaque one-time tokens
///
/// Password-reset and magic-link flows use opaque random tokens with a
/// server-held expiry: 32 random bytes, hex-encoded, stored in Redis under
/// `token:{kind}:{token}` with TTL = the kind's lifetime. Possession of the
/// string plus out-of-band delivery (email) is the whole security model;
/// there is no cryptographic binding here.
///
/// Validity is a single expiry comparison: even if Redis returns a record
/// (TTL not yet fired), a stored expiry in the past makes the token invalid.
/// `consume` is single-use - the record is deleted before the caller sees it.
///
/// The email-verification token for registration is generated by the same
/// `generate_token`, but lives on the `pending_registrations` row instead of
/// Redis so it shares the row's lifecycle.

use crate::redis::client::RedisClient;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token byte length before hex encoding
const TOKEN_BYTES: usize = 32;

/// Errors from the token store
#[derive(Debug, Error)]
pub enum TokenError {
    /// Redis failure
    #[error("Token store unavailable: {0}")]
    Store(String),

    /// Record failed to (de)serialize
    #[error("Token record corrupt: {0}")]
    Corrupt(String),
}

/// Token families with their lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Email-verification token (row-held on pending_registrations)
    EmailVerification,

    /// Password-reset token
    PasswordReset,

    /// Magic sign-in link token
    MagicLink,
}

impl TokenKind {
    /// Key segment for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
            TokenKind::MagicLink => "magic_link",
        }
    }

    /// How long tokens of this kind stay valid
    pub fn ttl(&self) -> Duration {
        match self {
            TokenKind::EmailVerification => Duration::hours(24),
            TokenKind::PasswordReset => Duration::hours(1),
            TokenKind::MagicLink => Duration::minutes(15),
        }
    }
}

/// Stored payload behind a token string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Who the token was issued for (email address)
    pub subject: String,

    /// When the token was issued
    pub issued_at: DateTime<Utc>,

    /// When the token stops being valid
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the record is still valid at `now`
    ///
    /// The stored expiry is authoritative; a record that outlived its
    /// Redis TTL by clock skew is still rejected here.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Generates an opaque token string (64 hex chars)
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Redis-backed store for short-lived tokens
#[derive(Clone)]
pub struct TokenStore {
    redis: RedisClient,
}

impl TokenStore {
    /// Creates a token store over an existing Redis client
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn key(kind: TokenKind, token: &str) -> String {
        format!("token:{}:{}", kind.as_str(), token)
    }

    /// Issues a fresh token for `subject` and stores its record
    ///
    /// # Returns
    ///
    /// The token string to embed in the emailed link
    pub async fn issue(&self, kind: TokenKind, subject: &str) -> Result<String, TokenError> {
        let token = generate_token();
        let now = Utc::now();

        let record = TokenRecord {
            subject: subject.to_string(),
            issued_at: now,
            expires_at: now + kind.ttl(),
        };

        let json =
            serde_json::to_string(&record).map_err(|e| TokenError::Corrupt(e.to_string()))?;

        let mut conn = self.redis.get_connection();
        redis::cmd("SETEX")
            .arg(Self::key(kind, &token))
            .arg(kind.ttl().num_seconds())
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?;

        Ok(token)
    }

    /// Consumes a token: deletes the record and returns it if still valid
    ///
    /// Single-use by construction - a second consume of the same string
    /// finds nothing. Returns None for unknown, already-used, or expired
    /// tokens; callers present all three as the same invalid-link message.
    pub async fn consume(
        &self,
        kind: TokenKind,
        token: &str,
    ) -> Result<Option<TokenRecord>, TokenError> {
        let key = Self::key(kind, token);
        let mut conn = self.redis.get_connection();

        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?;

        let Some(json) = raw else {
            return Ok(None);
        };

        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?;

        let record: TokenRecord =
            serde_json::from_str(&json).map_err(|e| TokenError::Corrupt(e.to_string()))?;

        Ok(record.is_valid(Utc::now()).then_some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_token_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_kind_ttls() {
        assert_eq!(TokenKind::EmailVerification.ttl(), Duration::hours(24));
        assert_eq!(TokenKind::PasswordReset.ttl(), Duration::hours(1));
        assert_eq!(TokenKind::MagicLink.ttl(), Duration::minutes(15));
    }

    #[test]
    fn test_record_validity_is_expiry_only() {
        let now = Utc::now();
        let record = TokenRecord {
            subject: "a@b.com".to_string(),
            issued_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
        };
        // Expired record is invalid no matter what string it sat behind.
        assert!(!record.is_valid(now));

        let fresh = TokenRecord {
            expires_at: now + Duration::hours(1),
            ..record
        };
        assert!(fresh.is_valid(now));
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_issue_consume_single_use() {
        use crate::redis::client::{RedisClient, RedisConfig};

        let client = RedisClient::new(RedisConfig::default_for_test())
            .await
            .expect("Redis should connect");
        let store = TokenStore::new(client);

        let token = store
            .issue(TokenKind::PasswordReset, "a@b.com")
            .await
            .expect("Issue should succeed");

        let record = store
            .consume(TokenKind::PasswordReset, &token)
            .await
            .expect("Consume should succeed")
            .expect("Token should be valid");
        assert_eq!(record.subject, "a@b.com");

        let again = store
            .consume(TokenKind::PasswordReset, &token)
            .await
            .expect("Consume should succeed");
        assert!(again.is_none(), "Token must be single-use");
    }
}
