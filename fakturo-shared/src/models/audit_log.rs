/// Audit log model
///
/// Append-only rows for security-relevant events (registrations, logins,
/// consent changes, billing updates). The application only ever inserts;
/// reading is for operators. Use the `audit` module's `record` helper from
/// request paths so a failed write never blocks the primary operation.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE audit_logs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     event VARCHAR(60) NOT NULL,
///     actor VARCHAR(255) NOT NULL,
///     org_id UUID,
///     detail JSONB NOT NULL DEFAULT '{}',
///     ip VARCHAR(45),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Event names written to the audit log
///
/// Kept as string constants rather than an enum so operators can add ad-hoc
/// events without a migration.
pub mod events {
    pub const REGISTRATION_STARTED: &str = "registration_started";
    pub const REGISTRATION_VERIFIED: &str = "registration_verified";
    pub const LOGIN_SUCCEEDED: &str = "login_succeeded";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const MAGIC_LINK_REQUESTED: &str = "magic_link_requested";
    pub const PASSWORD_RESET_REQUESTED: &str = "password_reset_requested";
    pub const PASSWORD_RESET_COMPLETED: &str = "password_reset_completed";
    pub const ORGANIZATION_CREATED: &str = "organization_created";
    pub const ONBOARDING_COMPLETED: &str = "onboarding_completed";
    pub const CONSENT_RECORDED: &str = "consent_recorded";
    pub const CONSENT_WITHDRAWN: &str = "consent_withdrawn";
    pub const CHECKOUT_STARTED: &str = "checkout_started";
    pub const SUBSCRIPTION_UPDATED: &str = "subscription_updated";
}

/// A single audit log row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    /// Unique entry ID
    pub id: Uuid,

    /// Event name (see `events`)
    pub event: String,

    /// Who triggered the event (email, user id, or "system")
    pub actor: String,

    /// Organization context, if any
    pub org_id: Option<Uuid>,

    /// Event-specific detail
    pub detail: JsonValue,

    /// Client IP, if known
    pub ip: Option<String>,

    /// When the event happened
    pub created_at: DateTime<Utc>,
}

/// Input for inserting an audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    /// Event name
    pub event: String,

    /// Who triggered the event
    pub actor: String,

    /// Organization context, if any
    pub org_id: Option<Uuid>,

    /// Event-specific detail
    pub detail: JsonValue,

    /// Client IP, if known
    pub ip: Option<String>,
}

impl AuditLogEntry {
    /// Inserts an audit entry
    ///
    /// Request paths should prefer `audit::record`, which swallows errors.
    pub async fn create(pool: &PgPool, data: CreateAuditLogEntry) -> Result<Self, sqlx::Error> {
        let entry = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            INSERT INTO audit_logs (event, actor, org_id, detail, ip)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, event, actor, org_id, detail, ip, created_at
            "#,
        )
        .bind(data.event)
        .bind(data.actor)
        .bind(data.org_id)
        .bind(data.detail)
        .bind(data.ip)
        .fetch_one(pool)
        .await?;

        Ok(entry)
    }
}
