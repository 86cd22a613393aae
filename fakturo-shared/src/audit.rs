/// Best-effort audit logging
///
/// Audit writes are secondary to every primary operation: a registration
/// must not fail because the audit insert did. `record` therefore swallows
/// every error after logging a warning. Call it with `.await` directly from
/// request handlers; it never returns an error.

use crate::models::audit_log::{AuditLogEntry, CreateAuditLogEntry};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Writes an audit entry, swallowing any failure
///
/// # Example
///
/// ```no_run
/// use fakturo_shared::audit;
/// use fakturo_shared::models::audit_log::events;
/// # use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) {
/// audit::record(
///     &pool,
///     events::LOGIN_SUCCEEDED,
///     "user@example.com",
///     None,
///     serde_json::json!({}),
///     Some("203.0.113.7".to_string()),
/// )
/// .await;
/// # }
/// ```
pub async fn record(
    pool: &PgPool,
    event: &str,
    actor: &str,
    org_id: Option<Uuid>,
    detail: JsonValue,
    ip: Option<String>,
) {
    let entry = CreateAuditLogEntry {
        event: event.to_string(),
        actor: actor.to_string(),
        org_id,
        detail,
        ip,
    };

    if let Err(e) = AuditLogEntry::create(pool, entry).await {
        tracing::warn!(event = event, error = %e, "Audit log write failed; continuing");
    }
}
