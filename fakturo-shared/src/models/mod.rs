/// Database models for Fakturo
///
/// This module contains all database models and their CRUD operations.
///
/// # Models
///
/// - `organization`: Tenant entity with plan, billing ids, Swiss invoicing
///   fields, and the onboarding draft blob
/// - `membership`: User-organization join rows (`organization_users`)
/// - `profile`: Mirror rows for identity-provider users (`user_profiles`)
/// - `pending_registration`: Deferred account creation until email verification
/// - `consent`: Append-only consent decisions (GDPR/FADP)
/// - `audit_log`: Append-only security events
/// - `email_preferences`: Per-email marketing opt-outs
///
/// # Example
///
/// ```no_run
/// use fakturo_shared::models::organization::{Organization, CreateOrganization, OrgPlan};
/// use fakturo_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let org = Organization::create(&pool, CreateOrganization {
///     name: "Muster Treuhand AG".to_string(),
///     plan: OrgPlan::Free,
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod audit_log;
pub mod consent;
pub mod email_preferences;
pub mod membership;
pub mod organization;
pub mod pending_registration;
pub mod profile;
