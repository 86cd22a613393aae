/// Session derivation and access gating
///
/// Composes the identity provider's view of a user with the application's
/// own rows into a single session: verify the bearer token locally, join
/// the profile and the active organization membership (through the
/// read-through cache), and compute three derived flags:
///
/// - `email_verified` - the provider confirmed the address
/// - `has_organization` - an active membership exists
/// - `onboarding_complete` - the organization's flag, the single gate for
///   dashboard access
///
/// Callers state what a route needs via `SessionRequirements`; a failed
/// requirement is not an error condition but a typed redirect target, so
/// handlers can send the browser to `/login`, `/verify-email`, or
/// `/onboarding` without ever throwing.

use crate::identity::jwt::{verify_access_token, JwtError};
use crate::models::membership::Membership;
use crate::models::organization::Organization;
use crate::models::profile::UserProfile;
use crate::redis::cache::{Cache, CacheKind};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Where a request is sent when a requirement fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectTarget {
    /// No (valid) session - sign in first
    Login,

    /// Session exists but the email is unverified
    VerifyEmail,

    /// No organization yet, or the wizard is unfinished
    Onboarding,
}

impl RedirectTarget {
    /// Frontend path for this target
    pub fn as_path(&self) -> &'static str {
        match self {
            RedirectTarget::Login => "/login",
            RedirectTarget::VerifyEmail => "/verify-email",
            RedirectTarget::Onboarding => "/onboarding",
        }
    }
}

/// What a route requires from the session
///
/// All flags default to false; `GET /v1/session` derives with none set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionRequirements {
    /// Require a provider-confirmed email
    pub email_verified: bool,

    /// Require an active organization membership
    pub organization: bool,

    /// Require a completed onboarding wizard
    pub onboarding: bool,
}

impl SessionRequirements {
    /// Requirements for dashboard-grade routes (everything)
    pub fn dashboard() -> Self {
        Self {
            email_verified: true,
            organization: true,
            onboarding: true,
        }
    }

    /// Requirements for the onboarding wizard itself (verified email only)
    pub fn wizard() -> Self {
        Self {
            email_verified: true,
            organization: false,
            onboarding: false,
        }
    }
}

/// The derived flags, separated out so gating is a pure function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    /// Provider confirmed the email address
    pub email_verified: bool,

    /// An active membership exists
    pub has_organization: bool,

    /// The organization finished onboarding
    pub onboarding_complete: bool,
}

/// A derived session: provider identity + application rows + flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Provider user ID
    pub user_id: Uuid,

    /// Email address from the access token
    pub email: String,

    /// Application profile row, if one exists
    pub profile: Option<UserProfile>,

    /// Active membership, if any
    pub membership: Option<Membership>,

    /// The organization behind the active membership
    pub organization: Option<Organization>,

    /// Derived flags
    pub flags: SessionFlags,
}

/// Session derivation failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// A requirement failed; send the browser here
    #[error("Session requirement failed; redirect to {}", .0.as_path())]
    Redirect(RedirectTarget),

    /// The database join failed (unexpected, class-c error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Applies requirements to derived flags
///
/// Order matters: an unverified email redirects to `/verify-email` before
/// any organization check, and a missing organization redirects to
/// `/onboarding` just like an unfinished wizard does.
pub fn enforce(flags: SessionFlags, requirements: SessionRequirements) -> Result<(), RedirectTarget> {
    if requirements.email_verified && !flags.email_verified {
        return Err(RedirectTarget::VerifyEmail);
    }
    if requirements.organization && !flags.has_organization {
        return Err(RedirectTarget::Onboarding);
    }
    if requirements.onboarding && !flags.onboarding_complete {
        return Err(RedirectTarget::Onboarding);
    }
    Ok(())
}

/// Derives a session from a bearer token
///
/// # Arguments
///
/// * `pool` - Database connection pool
/// * `cache` - Read-through cache (failures degrade to database reads)
/// * `jwt_secret` - Shared secret the provider signs access tokens with
/// * `access_token` - Bearer token from the Authorization header
/// * `requirements` - What the calling route needs
///
/// # Errors
///
/// - `SessionError::Redirect(Login)` for a missing/invalid/expired token
/// - `SessionError::Redirect(_)` for a failed requirement
/// - `SessionError::Database` only for genuine database failures
pub async fn derive_session(
    pool: &PgPool,
    cache: &Cache,
    jwt_secret: &str,
    access_token: &str,
    requirements: SessionRequirements,
) -> Result<Session, SessionError> {
    let claims = verify_access_token(access_token, jwt_secret).map_err(|e| {
        if !matches!(e, JwtError::Expired) {
            tracing::debug!(error = %e, "Access token rejected");
        }
        SessionError::Redirect(RedirectTarget::Login)
    })?;

    let user_key = claims.sub.to_string();

    let profile = match cache.get::<UserProfile>(CacheKind::Profile, &user_key).await {
        Some(profile) => Some(profile),
        None => {
            let profile = UserProfile::find_by_user_id(pool, claims.sub).await?;
            if let Some(ref p) = profile {
                cache.put(CacheKind::Profile, &user_key, p).await;
            }
            profile
        }
    };

    let membership = match cache.get::<Membership>(CacheKind::Membership, &user_key).await {
        Some(membership) => Some(membership),
        None => {
            let membership = Membership::find_active_for_user(pool, claims.sub).await?;
            if let Some(ref m) = membership {
                cache.put(CacheKind::Membership, &user_key, m).await;
            }
            membership
        }
    };

    let organization = match membership {
        Some(ref m) => {
            let org_key = m.org_id.to_string();
            match cache
                .get::<Organization>(CacheKind::Organization, &org_key)
                .await
            {
                Some(org) => Some(org),
                None => {
                    let org = Organization::find_by_id(pool, m.org_id).await?;
                    if let Some(ref o) = org {
                        cache.put(CacheKind::Organization, &org_key, o).await;
                    }
                    org
                }
            }
        }
        None => None,
    };

    let flags = SessionFlags {
        email_verified: claims.email_confirmed,
        has_organization: membership.as_ref().map(|m| m.is_active()).unwrap_or(false),
        onboarding_complete: organization
            .as_ref()
            .map(|o| o.onboarding_completed)
            .unwrap_or(false),
    };

    enforce(flags, requirements).map_err(SessionError::Redirect)?;

    Ok(Session {
        user_id: claims.sub,
        email: claims.email,
        profile,
        membership,
        organization,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFIED_NO_ORG: SessionFlags = SessionFlags {
        email_verified: true,
        has_organization: false,
        onboarding_complete: false,
    };

    const FULLY_ONBOARDED: SessionFlags = SessionFlags {
        email_verified: true,
        has_organization: true,
        onboarding_complete: true,
    };

    #[test]
    fn test_no_requirements_always_pass() {
        let unverified = SessionFlags {
            email_verified: false,
            has_organization: false,
            onboarding_complete: false,
        };
        assert!(enforce(unverified, SessionRequirements::default()).is_ok());
    }

    #[test]
    fn test_missing_organization_redirects_to_onboarding() {
        let requirements = SessionRequirements {
            organization: true,
            ..Default::default()
        };
        assert_eq!(
            enforce(VERIFIED_NO_ORG, requirements),
            Err(RedirectTarget::Onboarding)
        );
    }

    #[test]
    fn test_unverified_email_checked_first() {
        let flags = SessionFlags {
            email_verified: false,
            has_organization: false,
            onboarding_complete: false,
        };
        assert_eq!(
            enforce(flags, SessionRequirements::dashboard()),
            Err(RedirectTarget::VerifyEmail)
        );
    }

    #[test]
    fn test_incomplete_onboarding_redirects() {
        let flags = SessionFlags {
            email_verified: true,
            has_organization: true,
            onboarding_complete: false,
        };
        assert_eq!(
            enforce(flags, SessionRequirements::dashboard()),
            Err(RedirectTarget::Onboarding)
        );
    }

    #[test]
    fn test_dashboard_requirements_pass_when_onboarded() {
        assert!(enforce(FULLY_ONBOARDED, SessionRequirements::dashboard()).is_ok());
    }

    #[test]
    fn test_redirect_paths() {
        assert_eq!(RedirectTarget::Login.as_path(), "/login");
        assert_eq!(RedirectTarget::VerifyEmail.as_path(), "/verify-email");
        assert_eq!(RedirectTarget::Onboarding.as_path(), "/onboarding");
    }
}
