/// Organization model and database operations
///
/// The organization is the tenant entity: every invoicing account belongs to
/// exactly one organization, and users are attached via the
/// `organization_users` membership table.
///
/// Besides plan and billing identifiers, the row carries the Swiss invoicing
/// fields collected during onboarding (IBAN, VAT number, canton) and the
/// onboarding wizard state: a `onboarding_completed` flag that gates
/// dashboard access and a JSONB draft blob that preserves wizard input
/// across steps.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE organizations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     plan VARCHAR(50) NOT NULL DEFAULT 'free',
///     stripe_customer_id VARCHAR(255),
///     stripe_subscription_id VARCHAR(255),
///     subscription_status VARCHAR(50),
///     iban VARCHAR(34),
///     vat_number VARCHAR(32),
///     canton VARCHAR(2),
///     onboarding_completed BOOLEAN NOT NULL DEFAULT FALSE,
///     onboarding_step INTEGER NOT NULL DEFAULT 0,
///     onboarding_draft JSONB NOT NULL DEFAULT '{}',
///     draft_saved_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT organizations_plan_check CHECK (
///         plan IN ('free', 'starter', 'pro')
///     )
/// );
/// ```
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
///
/// // Save wizard input between steps
/// Organization::save_draft(&pool, org.id, 2, serde_json::json!({
///     "company_name": "Muster Treuhand AG",
///     "canton": "ZH",
/// })).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Billing plan types
///
/// Plans determine invoice volume, features, and pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum OrgPlan {
    /// Free plan (3 invoices/month, Fakturo branding)
    #[serde(rename = "free")]
    Free,

    /// Starter plan (CHF 12/month, 50 invoices/month)
    #[serde(rename = "starter")]
    Starter,

    /// Pro plan (CHF 29/month, unlimited invoices, QR-bill automation)
    #[serde(rename = "pro")]
    Pro,
}

impl OrgPlan {
    /// Converts plan to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgPlan::Free => "free",
            OrgPlan::Starter => "starter",
            OrgPlan::Pro => "pro",
        }
    }

    /// Parses plan from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(OrgPlan::Free),
            "starter" => Some(OrgPlan::Starter),
            "pro" => Some(OrgPlan::Pro),
            _ => None,
        }
    }
}

/// Subscription lifecycle status, as reported by the payment processor
///
/// Stored as plain text; values follow the processor's vocabulary so webhook
/// updates can be written through without translation.
pub mod subscription_status {
    pub const ACTIVE: &str = "active";
    pub const PAST_DUE: &str = "past_due";
    pub const CANCELED: &str = "canceled";
}

/// Organization model representing an invoicing account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    /// Unique organization ID (UUID v4)
    pub id: Uuid,

    /// Company/account name
    pub name: String,

    /// Current billing plan
    pub plan: String,

    /// Stripe customer ID (set after first checkout)
    pub stripe_customer_id: Option<String>,

    /// Stripe subscription ID (set while a subscription exists)
    pub stripe_subscription_id: Option<String>,

    /// Subscription status as last reported by webhook
    pub subscription_status: Option<String>,

    /// Payout IBAN printed on invoices (CH/LI format)
    pub iban: Option<String>,

    /// Swiss VAT number (CHE-xxx.xxx.xxx format)
    pub vat_number: Option<String>,

    /// Canton of the registered office (two-letter code, e.g. "ZH")
    pub canton: Option<String>,

    /// Whether the onboarding wizard has been completed
    ///
    /// Once true this is the single source of truth for dashboard access.
    pub onboarding_completed: bool,

    /// Last wizard step the draft was saved from
    pub onboarding_step: i32,

    /// Wizard draft blob, overwritten (shallow-merged) on every save
    pub onboarding_draft: JsonValue,

    /// When the draft was last saved (None if never)
    pub draft_saved_at: Option<DateTime<Utc>>,

    /// When the organization was created
    pub created_at: DateTime<Utc>,

    /// When the organization was last updated
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Gets the parsed plan enum
    pub fn get_plan(&self) -> Option<OrgPlan> {
        OrgPlan::from_str(&self.plan)
    }
}

/// Input for creating a new organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    /// Company/account name
    pub name: String,

    /// Initial billing plan (defaults to Free)
    #[serde(default = "default_plan")]
    pub plan: OrgPlan,
}

fn default_plan() -> OrgPlan {
    OrgPlan::Free
}

/// Absolute billing values applied from a payment-processor webhook
///
/// Every field that is `Some` is written through as-is; webhook redelivery
/// is therefore harmless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingUpdate {
    /// New plan
    pub plan: Option<OrgPlan>,

    /// New Stripe customer ID (`Some(None)` clears it)
    pub stripe_customer_id: Option<Option<String>>,

    /// New Stripe subscription ID (`Some(None)` clears it)
    pub stripe_subscription_id: Option<Option<String>>,

    /// New subscription status
    pub subscription_status: Option<String>,
}

/// Company details persisted when the onboarding wizard completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyDetails {
    /// Payout IBAN
    pub iban: Option<String>,

    /// Swiss VAT number
    pub vat_number: Option<String>,

    /// Canton two-letter code
    pub canton: Option<String>,
}

const ALL_COLUMNS: &str = "id, name, plan, stripe_customer_id, stripe_subscription_id, \
     subscription_status, iban, vat_number, canton, onboarding_completed, \
     onboarding_step, onboarding_draft, draft_saved_at, created_at, updated_at";

impl Organization {
    /// Creates a new organization in the database
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `data` - Organization creation data
    ///
    /// # Errors
    ///
    /// Returns an error if database connection fails
    pub async fn create(pool: &PgPool, data: CreateOrganization) -> Result<Self, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            INSERT INTO organizations (name, plan)
            VALUES ($1, $2)
            RETURNING {ALL_COLUMNS}
            "#,
        ))
        .bind(data.name)
        .bind(data.plan.as_str())
        .fetch_one(pool)
        .await?;

        Ok(org)
    }

    /// Finds an organization by ID
    ///
    /// # Returns
    ///
    /// The organization if found, None otherwise
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            SELECT {ALL_COLUMNS}
            FROM organizations
            WHERE id = $1
            "#,
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }

    /// Finds an organization by its Stripe customer ID
    ///
    /// Used by webhook handlers to resolve events back to an account.
    pub async fn find_by_stripe_customer(
        pool: &PgPool,
        customer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            SELECT {ALL_COLUMNS}
            FROM organizations
            WHERE stripe_customer_id = $1
            "#,
        ))
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }

    /// Finds an organization by its Stripe subscription ID
    pub async fn find_by_stripe_subscription(
        pool: &PgPool,
        subscription_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            SELECT {ALL_COLUMNS}
            FROM organizations
            WHERE stripe_subscription_id = $1
            "#,
        ))
        .bind(subscription_id)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }

    /// Applies absolute billing values from a webhook event
    ///
    /// Only `Some` fields are written. All values are absolute (never
    /// deltas), so reapplying the same update is a no-op in effect.
    ///
    /// # Returns
    ///
    /// The updated organization if found, None if it doesn't exist
    pub async fn apply_billing_update(
        pool: &PgPool,
        id: Uuid,
        data: BillingUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE organizations SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.plan.is_some() {
            bind_count += 1;
            query.push_str(&format!(", plan = ${}", bind_count));
        }
        if data.stripe_customer_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", stripe_customer_id = ${}", bind_count));
        }
        if data.stripe_subscription_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", stripe_subscription_id = ${}", bind_count));
        }
        if data.subscription_status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", subscription_status = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {ALL_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Organization>(&query).bind(id);

        if let Some(plan) = data.plan {
            q = q.bind(plan.as_str());
        }
        if let Some(customer_id) = data.stripe_customer_id {
            q = q.bind(customer_id);
        }
        if let Some(sub_id) = data.stripe_subscription_id {
            q = q.bind(sub_id);
        }
        if let Some(status) = data.subscription_status {
            q = q.bind(status);
        }

        let org = q.fetch_optional(pool).await?;

        Ok(org)
    }

    /// Saves the onboarding wizard draft for an organization
    ///
    /// The submitted blob is shallow-merged over the stored one (jsonb `||`),
    /// so fields from earlier steps survive a save from a later step.
    /// Concurrent saves are last-write-wins; the debounce that collapses
    /// rapid edits lives on the client.
    ///
    /// # Arguments
    ///
    /// * `step` - Wizard step the save originated from
    /// * `patch` - Draft fields to merge over the stored blob
    pub async fn save_draft(
        pool: &PgPool,
        id: Uuid,
        step: i32,
        patch: JsonValue,
    ) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            UPDATE organizations
            SET onboarding_draft = onboarding_draft || $2,
                onboarding_step = $3,
                draft_saved_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ALL_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(patch)
        .bind(step)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }

    /// Clears the onboarding draft back to an empty object
    pub async fn clear_draft(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            UPDATE organizations
            SET onboarding_draft = '{{}}'::jsonb,
                onboarding_step = 0,
                draft_saved_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ALL_COLUMNS}
            "#,
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }

    /// Marks onboarding as completed and persists the company details
    ///
    /// Idempotent: every value written is absolute, so a second call leaves
    /// `onboarding_completed = true` and the same details in place. The
    /// draft is cleared as part of the same statement.
    pub async fn complete_onboarding(
        pool: &PgPool,
        id: Uuid,
        details: CompanyDetails,
    ) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            r#"
            UPDATE organizations
            SET onboarding_completed = TRUE,
                iban = COALESCE($2, iban),
                vat_number = COALESCE($3, vat_number),
                canton = COALESCE($4, canton),
                onboarding_draft = '{{}}'::jsonb,
                onboarding_step = 0,
                draft_saved_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ALL_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(details.iban)
        .bind(details.vat_number)
        .bind(details.canton)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_plan_as_str() {
        assert_eq!(OrgPlan::Free.as_str(), "free");
        assert_eq!(OrgPlan::Starter.as_str(), "starter");
        assert_eq!(OrgPlan::Pro.as_str(), "pro");
    }

    #[test]
    fn test_org_plan_from_str() {
        assert_eq!(OrgPlan::from_str("free"), Some(OrgPlan::Free));
        assert_eq!(OrgPlan::from_str("starter"), Some(OrgPlan::Starter));
        assert_eq!(OrgPlan::from_str("pro"), Some(OrgPlan::Pro));
        assert_eq!(OrgPlan::from_str("enterprise"), None);
    }

    #[test]
    fn test_create_organization_default_plan() {
        let create = CreateOrganization {
            name: "Test AG".to_string(),
            plan: default_plan(),
        };
        assert_eq!(create.plan, OrgPlan::Free);
    }

    #[test]
    fn test_billing_update_default_is_empty() {
        let update = BillingUpdate::default();
        assert!(update.plan.is_none());
        assert!(update.stripe_customer_id.is_none());
        assert!(update.stripe_subscription_id.is_none());
        assert!(update.subscription_status.is_none());
    }

    // Integration tests for database operations require a live Postgres
    // instance and live in fakturo-api/tests.
}
