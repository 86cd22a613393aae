/// Pending registration model and database operations
///
/// Account creation is deferred until the email address is verified: the
/// registration form only produces a row here, and the identity-provider
/// user is created when the emailed token comes back. This keeps unverified
/// credentials out of the credential store (data minimization) and makes the
/// "pending registration and confirmed user are mutually exclusive"
/// invariant checkable with one provider lookup plus one unique email column.
///
/// The submitted password is hashed (Argon2id) before it is parked here and
/// the row is deleted on verification or expiry, so plaintext never touches
/// disk and unverified hashes have a bounded lifetime.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE pending_registrations (
///     email VARCHAR(255) PRIMARY KEY,
///     verification_token VARCHAR(64) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     metadata JSONB NOT NULL DEFAULT '{}',
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;

/// How long a verification token stays valid
pub const VERIFICATION_TTL_HOURS: i64 = 24;

/// A registration waiting for email verification
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingRegistration {
    /// Email address being registered (primary key)
    pub email: String,

    /// Opaque verification token delivered by email
    pub verification_token: String,

    /// Argon2id hash of the submitted password
    ///
    /// Handed to the identity provider on verification, then deleted with
    /// the row. Never a plaintext password.
    pub password_hash: String,

    /// Registration metadata (display name, company name, locale)
    pub metadata: JsonValue,

    /// When the token stops being valid
    pub expires_at: DateTime<Utc>,

    /// When the registration was submitted
    pub created_at: DateTime<Utc>,
}

impl PendingRegistration {
    /// Whether the verification token has expired
    ///
    /// An expired row is invalid regardless of the token string presented.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for creating a pending registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePendingRegistration {
    /// Email address being registered
    pub email: String,

    /// Opaque verification token
    pub verification_token: String,

    /// Argon2id hash of the submitted password
    pub password_hash: String,

    /// Registration metadata
    pub metadata: JsonValue,
}

impl PendingRegistration {
    /// Creates a pending registration with the default 24 h expiry
    ///
    /// # Errors
    ///
    /// Returns an error if a pending registration for the email already
    /// exists (unique violation) or the database connection fails
    pub async fn create(
        pool: &PgPool,
        data: CreatePendingRegistration,
    ) -> Result<Self, sqlx::Error> {
        let expires_at = Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS);

        let pending = sqlx::query_as::<_, PendingRegistration>(
            r#"
            INSERT INTO pending_registrations
                (email, verification_token, password_hash, metadata, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING email, verification_token, password_hash, metadata,
                      expires_at, created_at
            "#,
        )
        .bind(data.email)
        .bind(data.verification_token)
        .bind(data.password_hash)
        .bind(data.metadata)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        Ok(pending)
    }

    /// Finds a pending registration by email
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let pending = sqlx::query_as::<_, PendingRegistration>(
            r#"
            SELECT email, verification_token, password_hash, metadata,
                   expires_at, created_at
            FROM pending_registrations
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(pending)
    }

    /// Finds a pending registration by its verification token
    pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        let pending = sqlx::query_as::<_, PendingRegistration>(
            r#"
            SELECT email, verification_token, password_hash, metadata,
                   expires_at, created_at
            FROM pending_registrations
            WHERE verification_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(pending)
    }

    /// Deletes a pending registration (on verification or abandonment)
    ///
    /// # Returns
    ///
    /// True if a row was deleted
    pub async fn delete(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_registrations WHERE email = $1")
            .bind(email)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Purges all expired pending registrations
    ///
    /// Run periodically by the worker's sweeper.
    ///
    /// # Returns
    ///
    /// Number of rows removed
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_registrations WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_expiring_at(expires_at: DateTime<Utc>) -> PendingRegistration {
        PendingRegistration {
            email: "a@b.com".to_string(),
            verification_token: "deadbeef".to_string(),
            password_hash: "$argon2id$...".to_string(),
            metadata: serde_json::json!({}),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_not_expired_before_deadline() {
        let now = Utc::now();
        let pending = pending_expiring_at(now + Duration::hours(1));
        assert!(!pending.is_expired(now));
    }

    #[test]
    fn test_expired_after_deadline() {
        let now = Utc::now();
        let pending = pending_expiring_at(now - Duration::seconds(1));
        assert!(pending.is_expired(now));
    }

    #[test]
    fn test_expired_exactly_at_deadline() {
        let now = Utc::now();
        let pending = pending_expiring_at(now);
        assert!(pending.is_expired(now));
    }
}
