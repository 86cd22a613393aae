/// User profile model and database operations
///
/// Credentials and email-verification state live in the identity provider;
/// `user_profiles` is the application-side mirror row keyed by the provider's
/// user UUID. It carries what the application needs without another provider
/// round-trip: display name, locale, and the last-login timestamp.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_profiles (
///     user_id UUID PRIMARY KEY,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     display_name VARCHAR(100),
///     locale VARCHAR(5) NOT NULL DEFAULT 'de-CH',
///     last_login_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Application-side profile for an identity-provider user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    /// Identity-provider user ID
    pub user_id: Uuid,

    /// Email address (mirrors the provider; kept for joins and display)
    pub email: String,

    /// Optional display name
    pub display_name: Option<String>,

    /// UI locale (de-CH, fr-CH, it-CH, en)
    pub locale: String,

    /// When the user last signed in (None if never)
    pub last_login_at: Option<DateTime<Utc>>,

    /// When the profile was created
    pub created_at: DateTime<Utc>,

    /// When the profile was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfile {
    /// Identity-provider user ID
    pub user_id: Uuid,

    /// Email address
    pub email: String,

    /// Optional display name
    pub display_name: Option<String>,

    /// UI locale (defaults to de-CH when None)
    pub locale: Option<String>,
}

impl UserProfile {
    /// Creates a new profile row
    ///
    /// # Errors
    ///
    /// Returns an error if the user_id or email already exists, or the
    /// database connection fails
    pub async fn create(pool: &PgPool, data: CreateProfile) -> Result<Self, sqlx::Error> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (user_id, email, display_name, locale)
            VALUES ($1, $2, $3, COALESCE($4, 'de-CH'))
            RETURNING user_id, email, display_name, locale, last_login_at,
                      created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.email)
        .bind(data.display_name)
        .bind(data.locale)
        .fetch_one(pool)
        .await?;

        Ok(profile)
    }

    /// Finds a profile by the provider user ID
    pub async fn find_by_user_id(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, email, display_name, locale, last_login_at,
                   created_at, updated_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    /// Finds a profile by email address
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, email, display_name, locale, last_login_at,
                   created_at, updated_at
            FROM user_profiles
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    /// Stamps the last-login timestamp
    pub async fn update_last_login(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE user_profiles
            SET last_login_at = NOW(), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
