/// Consent record model and database operations
///
/// Every consent decision (cookie categories, terms, privacy policy) is an
/// append-only row. Rows are never rewritten, with one exception: withdrawal
/// stamps `withdrawn_at` on the active row so the original grant stays on
/// record. Subjects are either a signed-in user (user_id) or an anonymous
/// visitor (visitor_id from the consent banner cookie).
///
/// The Swiss FADP retention policy caps how long a grant stays valid: a
/// consent older than two years is treated as expired and the banner asks
/// again. Expiry is evaluated at read time; nothing is deleted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE consent_records (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID,
///     visitor_id VARCHAR(64),
///     consent_type VARCHAR(40) NOT NULL,
///     given BOOLEAN NOT NULL,
///     method VARCHAR(20) NOT NULL,
///     withdrawn_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT consent_records_subject_check CHECK (
///         user_id IS NOT NULL OR visitor_id IS NOT NULL
///     )
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// FADP consent retention window, after which a grant must be renewed
pub const RETENTION_DAYS: i64 = 730;

/// Consent categories tracked by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    /// Analytics cookies
    CookiesAnalytics,

    /// Marketing cookies
    CookiesMarketing,

    /// Terms of service acceptance
    Terms,

    /// Privacy policy acceptance
    Privacy,
}

impl ConsentType {
    /// Converts type to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentType::CookiesAnalytics => "cookies_analytics",
            ConsentType::CookiesMarketing => "cookies_marketing",
            ConsentType::Terms => "terms",
            ConsentType::Privacy => "privacy",
        }
    }

    /// Parses type from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cookies_analytics" => Some(ConsentType::CookiesAnalytics),
            "cookies_marketing" => Some(ConsentType::CookiesMarketing),
            "terms" => Some(ConsentType::Terms),
            "privacy" => Some(ConsentType::Privacy),
            _ => None,
        }
    }
}

/// How the decision was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMethod {
    /// Cookie banner on the marketing site
    Banner,

    /// Onboarding wizard
    Onboarding,

    /// Account settings page
    Settings,
}

impl ConsentMethod {
    /// Converts method to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentMethod::Banner => "banner",
            ConsentMethod::Onboarding => "onboarding",
            ConsentMethod::Settings => "settings",
        }
    }
}

/// The subject a consent decision belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentSubject {
    /// A signed-in identity-provider user
    User(Uuid),

    /// An anonymous visitor, keyed by the banner cookie id
    Visitor(String),
}

impl ConsentSubject {
    fn user_id(&self) -> Option<Uuid> {
        match self {
            ConsentSubject::User(id) => Some(*id),
            ConsentSubject::Visitor(_) => None,
        }
    }

    fn visitor_id(&self) -> Option<&str> {
        match self {
            ConsentSubject::User(_) => None,
            ConsentSubject::Visitor(id) => Some(id),
        }
    }
}

/// A single consent decision
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConsentRecord {
    /// Unique record ID
    pub id: Uuid,

    /// Signed-in subject (mutually exclusive with visitor_id)
    pub user_id: Option<Uuid>,

    /// Anonymous subject (mutually exclusive with user_id)
    pub visitor_id: Option<String>,

    /// Consent category
    pub consent_type: String,

    /// Whether consent was given (false records an explicit refusal)
    pub given: bool,

    /// How the decision was captured
    pub method: String,

    /// When the grant was withdrawn (the only in-place update)
    pub withdrawn_at: Option<DateTime<Utc>>,

    /// When the decision was recorded
    pub created_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// Whether this record is an active grant at `now`
    ///
    /// Active means: given, not withdrawn, and younger than the FADP
    /// retention window.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.given
            && self.withdrawn_at.is_none()
            && self.created_at + Duration::days(RETENTION_DAYS) > now
    }

    /// Records a consent decision (append-only)
    pub async fn record(
        pool: &PgPool,
        subject: &ConsentSubject,
        consent_type: ConsentType,
        given: bool,
        method: ConsentMethod,
    ) -> Result<Self, sqlx::Error> {
        let record = sqlx::query_as::<_, ConsentRecord>(
            r#"
            INSERT INTO consent_records (user_id, visitor_id, consent_type, given, method)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, visitor_id, consent_type, given, method,
                      withdrawn_at, created_at
            "#,
        )
        .bind(subject.user_id())
        .bind(subject.visitor_id())
        .bind(consent_type.as_str())
        .bind(given)
        .bind(method.as_str())
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Upserts an onboarding consent grant
    ///
    /// `complete_onboarding` must be idempotent, so terms/privacy grants go
    /// through a partial unique index on (user_id, consent_type) for rows
    /// with no withdrawal; a second completion updates the existing grant
    /// instead of appending a duplicate.
    ///
    /// ```sql
    /// CREATE UNIQUE INDEX consent_records_active_grant_idx
    ///     ON consent_records (user_id, consent_type)
    ///     WHERE given AND withdrawn_at IS NULL;
    /// ```
    pub async fn upsert_grant(
        pool: &PgPool,
        user_id: Uuid,
        consent_type: ConsentType,
        method: ConsentMethod,
    ) -> Result<Self, sqlx::Error> {
        let record = sqlx::query_as::<_, ConsentRecord>(
            r#"
            INSERT INTO consent_records (user_id, consent_type, given, method)
            VALUES ($1, $2, TRUE, $3)
            ON CONFLICT (user_id, consent_type) WHERE given AND withdrawn_at IS NULL
            DO UPDATE SET method = EXCLUDED.method
            RETURNING id, user_id, visitor_id, consent_type, given, method,
                      withdrawn_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(consent_type.as_str())
        .bind(method.as_str())
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Marks the subject's active grant for a category as withdrawn
    ///
    /// # Returns
    ///
    /// True if an active grant existed and was stamped
    pub async fn withdraw(
        pool: &PgPool,
        subject: &ConsentSubject,
        consent_type: ConsentType,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE consent_records
            SET withdrawn_at = NOW()
            WHERE consent_type = $3
              AND given
              AND withdrawn_at IS NULL
              AND (user_id = $1 OR visitor_id = $2)
            "#,
        )
        .bind(subject.user_id())
        .bind(subject.visitor_id())
        .bind(consent_type.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists the subject's active grants (given, not withdrawn, in window)
    pub async fn list_active(
        pool: &PgPool,
        subject: &ConsentSubject,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let records = sqlx::query_as::<_, ConsentRecord>(
            r#"
            SELECT id, user_id, visitor_id, consent_type, given, method,
                   withdrawn_at, created_at
            FROM consent_records
            WHERE given
              AND withdrawn_at IS NULL
              AND created_at > NOW() - make_interval(days => $3)
              AND (user_id = $1 OR visitor_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(subject.user_id())
        .bind(subject.visitor_id())
        .bind(RETENTION_DAYS as i32)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_created_at(created_at: DateTime<Utc>) -> ConsentRecord {
        ConsentRecord {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            visitor_id: None,
            consent_type: "cookies_analytics".to_string(),
            given: true,
            method: "banner".to_string(),
            withdrawn_at: None,
            created_at,
        }
    }

    #[test]
    fn test_consent_type_roundtrip() {
        for t in [
            ConsentType::CookiesAnalytics,
            ConsentType::CookiesMarketing,
            ConsentType::Terms,
            ConsentType::Privacy,
        ] {
            assert_eq!(ConsentType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ConsentType::from_str("newsletter"), None);
    }

    #[test]
    fn test_fresh_grant_is_active() {
        let now = Utc::now();
        assert!(record_created_at(now).is_active(now));
    }

    #[test]
    fn test_withdrawn_grant_is_inactive() {
        let now = Utc::now();
        let mut record = record_created_at(now);
        record.withdrawn_at = Some(now);
        assert!(!record.is_active(now));
    }

    #[test]
    fn test_refusal_is_inactive() {
        let now = Utc::now();
        let mut record = record_created_at(now);
        record.given = false;
        assert!(!record.is_active(now));
    }

    #[test]
    fn test_grant_expires_after_retention_window() {
        let now = Utc::now();
        let record = record_created_at(now - Duration::days(RETENTION_DAYS) - Duration::days(1));
        assert!(!record.is_active(now));

        let still_valid = record_created_at(now - Duration::days(RETENTION_DAYS) + Duration::days(1));
        assert!(still_valid.is_active(now));
    }
}
