/// Membership model and database operations
///
/// This module provides the membership rows in `organization_users`, linking
/// identity-provider users to organizations with a role and a status. The
/// session deriver treats a user's single *active* membership as their
/// organization; invited and removed rows never grant access.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE organization_users (
///     org_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL,
///     role VARCHAR(20) NOT NULL DEFAULT 'member',
///     status VARCHAR(20) NOT NULL DEFAULT 'active',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (org_id, user_id),
///     CONSTRAINT organization_users_role_check CHECK (
///         role IN ('owner', 'admin', 'member')
///     ),
///     CONSTRAINT organization_users_status_check CHECK (
///         status IN ('active', 'invited', 'removed')
///     )
/// );
/// ```
///
/// # Roles
///
/// - **owner**: Full control, billing, delete organization
/// - **admin**: Manage members and settings
/// - **member**: Day-to-day invoicing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Roles within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    /// Full control: billing, delete organization, manage all members
    #[serde(rename = "owner")]
    Owner,

    /// Can manage members and organization settings
    #[serde(rename = "admin")]
    Admin,

    /// Day-to-day invoicing access
    #[serde(rename = "member")]
    Member,
}

impl MembershipRole {
    /// Converts role to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
        }
    }

    /// Parses role from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MembershipRole::Owner),
            "admin" => Some(MembershipRole::Admin),
            "member" => Some(MembershipRole::Member),
            _ => None,
        }
    }
}

/// Membership lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// Grants access to the organization
    #[serde(rename = "active")]
    Active,

    /// Invitation sent, not yet accepted
    #[serde(rename = "invited")]
    Invited,

    /// Removed from the organization; row kept for audit
    #[serde(rename = "removed")]
    Removed,
}

impl MembershipStatus {
    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Invited => "invited",
            MembershipStatus::Removed => "removed",
        }
    }
}

/// Membership row linking a user to an organization
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    /// Organization the user belongs to
    pub org_id: Uuid,

    /// Identity-provider user ID
    pub user_id: Uuid,

    /// Role within the organization
    pub role: String,

    /// Lifecycle status (only `active` grants access)
    pub status: String,

    /// When the membership was created
    pub created_at: DateTime<Utc>,

    /// When the membership was last updated
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Gets the parsed role enum
    pub fn get_role(&self) -> Option<MembershipRole> {
        MembershipRole::from_str(&self.role)
    }

    /// Whether this membership currently grants access
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active.as_str()
    }
}

/// Input for creating a new membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    /// Organization ID
    pub org_id: Uuid,

    /// Identity-provider user ID
    pub user_id: Uuid,

    /// Role within the organization
    pub role: MembershipRole,
}

impl Membership {
    /// Creates a new active membership
    ///
    /// # Errors
    ///
    /// Returns an error if the (org, user) pair already exists or the
    /// database connection fails
    pub async fn create(pool: &PgPool, data: CreateMembership) -> Result<Self, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO organization_users (org_id, user_id, role, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING org_id, user_id, role, status, created_at, updated_at
            "#,
        )
        .bind(data.org_id)
        .bind(data.user_id)
        .bind(data.role.as_str())
        .fetch_one(pool)
        .await?;

        Ok(membership)
    }

    /// Finds a user's active membership, if any
    ///
    /// A user holds at most one active membership; the oldest wins if data
    /// ever drifts.
    pub async fn find_active_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT org_id, user_id, role, status, created_at, updated_at
            FROM organization_users
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(membership)
    }

    /// Lists all memberships of an organization
    pub async fn list_by_org(pool: &PgPool, org_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT org_id, user_id, role, status, created_at, updated_at
            FROM organization_users
            WHERE org_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(org_id)
        .fetch_all(pool)
        .await?;

        Ok(memberships)
    }

    /// Marks a membership as removed (row is kept for audit)
    ///
    /// # Returns
    ///
    /// True if a row was updated, false if no such membership existed
    pub async fn remove(pool: &PgPool, org_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE organization_users
            SET status = 'removed', updated_at = NOW()
            WHERE org_id = $1 AND user_id = $2
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [
            MembershipRole::Owner,
            MembershipRole::Admin,
            MembershipRole::Member,
        ] {
            assert_eq!(MembershipRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(MembershipRole::from_str("viewer"), None);
    }

    #[test]
    fn test_is_active() {
        let membership = Membership {
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "owner".to_string(),
            status: "active".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(membership.is_active());

        let removed = Membership {
            status: "removed".to_string(),
            ..membership
        };
        assert!(!removed.is_active());
    }
}
