/// Email preference model and database operations
///
/// Per-email opt-outs for non-transactional mail. Transactional messages
/// (verification, password reset, payment failures) always send; marketing
/// and product-update categories are gated on these flags. The unsubscribe
/// token backs the List-Unsubscribe header on every outbound message.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_preferences (
///     email VARCHAR(255) PRIMARY KEY,
///     marketing BOOLEAN NOT NULL DEFAULT TRUE,
///     product_updates BOOLEAN NOT NULL DEFAULT TRUE,
///     unsubscribe_token VARCHAR(64) NOT NULL UNIQUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Email preferences for one recipient
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailPreferences {
    /// Recipient address (primary key)
    pub email: String,

    /// Marketing mail allowed
    pub marketing: bool,

    /// Product update mail allowed
    pub product_updates: bool,

    /// Token embedded in List-Unsubscribe links
    pub unsubscribe_token: String,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl EmailPreferences {
    /// Fetches preferences, creating the default row on first touch
    ///
    /// # Arguments
    ///
    /// * `unsubscribe_token` - Token to store if the row doesn't exist yet
    pub async fn get_or_create(
        pool: &PgPool,
        email: &str,
        unsubscribe_token: &str,
    ) -> Result<Self, sqlx::Error> {
        let prefs = sqlx::query_as::<_, EmailPreferences>(
            r#"
            INSERT INTO email_preferences (email, unsubscribe_token)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET updated_at = email_preferences.updated_at
            RETURNING email, marketing, product_updates, unsubscribe_token,
                      created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(unsubscribe_token)
        .fetch_one(pool)
        .await?;

        Ok(prefs)
    }

    /// Finds preferences by email, without creating a row
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let prefs = sqlx::query_as::<_, EmailPreferences>(
            r#"
            SELECT email, marketing, product_updates, unsubscribe_token,
                   created_at, updated_at
            FROM email_preferences
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(prefs)
    }

    /// Turns off all non-transactional categories via the unsubscribe token
    ///
    /// # Returns
    ///
    /// True if a row matched the token
    pub async fn unsubscribe_all(pool: &PgPool, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_preferences
            SET marketing = FALSE, product_updates = FALSE, updated_at = NOW()
            WHERE unsubscribe_token = $1
            "#,
        )
        .bind(token)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Updates individual category flags
    pub async fn update(
        pool: &PgPool,
        email: &str,
        marketing: Option<bool>,
        product_updates: Option<bool>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let prefs = sqlx::query_as::<_, EmailPreferences>(
            r#"
            UPDATE email_preferences
            SET marketing = COALESCE($2, marketing),
                product_updates = COALESCE($3, product_updates),
                updated_at = NOW()
            WHERE email = $1
            RETURNING email, marketing, product_updates, unsubscribe_token,
                      created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(marketing)
        .bind(product_updates)
        .fetch_optional(pool)
        .await?;

        Ok(prefs)
    }
}
