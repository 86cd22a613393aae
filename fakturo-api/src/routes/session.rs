/// Session endpoint
///
/// The frontend bootstraps from this one call: the joined session view
/// (identity, profile, organization) plus the derived flags it needs for
/// client-side routing. No requirements are applied here - an unverified
/// or organization-less session still gets its view back; only a missing
/// or invalid token yields the `/login` redirect.
///
/// # Endpoint
///
/// ```text
/// GET /v1/session
/// Authorization: Bearer <access token>
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::HeaderMap, Json};
use fakturo_shared::models::membership::Membership;
use fakturo_shared::models::organization::Organization;
use fakturo_shared::models::profile::UserProfile;
use fakturo_shared::session::{SessionFlags, SessionRequirements};
use serde::Serialize;
use uuid::Uuid;

/// Session view returned to the frontend
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Provider user ID
    pub user_id: Uuid,

    /// Email address
    pub email: String,

    /// Application profile, if one exists
    pub profile: Option<UserProfile>,

    /// Active membership, if any
    pub membership: Option<Membership>,

    /// The organization behind the active membership
    pub organization: Option<Organization>,

    /// Derived flags (email_verified, has_organization, onboarding_complete)
    pub flags: SessionFlags,
}

/// Returns the derived session for the current bearer token
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    let session = state
        .session(&headers, SessionRequirements::default())
        .await?;

    Ok(Json(SessionResponse {
        user_id: session.user_id,
        email: session.email,
        profile: session.profile,
        membership: session.membership,
        organization: session.organization,
        flags: session.flags,
    }))
}
