/// Onboarding wizard endpoints
///
/// The wizard runs between email verification and dashboard access: create
/// the organization, save progress as a draft blob between steps, and
/// finish by persisting the company details and flipping
/// `onboarding_completed` - the single gate for dashboard access.
///
/// Draft saves are last-write-wins. The client debounces rapid field edits
/// into one save every second or two; the server just shallow-merges
/// whatever arrives and stamps `draft_saved_at`.
///
/// # Endpoints
///
/// - `POST /v1/onboarding/organization` - Create the org + owner membership
/// - `GET /v1/onboarding/draft` - Load the draft verbatim
/// - `PUT /v1/onboarding/draft` - Merge-save the draft
/// - `DELETE /v1/onboarding/draft` - Reset the draft to `{}`
/// - `POST /v1/onboarding/complete` - Persist details, flag completion

use crate::{
    app::AppState,
    error::{validation_details, ApiError, ApiResult},
    middleware::rate_limit::client_ip,
};
use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use fakturo_shared::audit;
use fakturo_shared::models::audit_log::events;
use fakturo_shared::models::consent::{ConsentMethod, ConsentRecord, ConsentType};
use fakturo_shared::models::membership::{CreateMembership, Membership, MembershipRole};
use fakturo_shared::models::organization::{
    CompanyDetails, CreateOrganization, OrgPlan, Organization,
};
use fakturo_shared::redis::cache::CacheKind;
use fakturo_shared::session::{Session, SessionRequirements};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Create-organization request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    /// Company/account name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

/// Create-organization response
#[derive(Debug, Serialize)]
pub struct CreateOrganizationResponse {
    /// New organization ID
    pub organization_id: Uuid,
}

/// Draft save request
#[derive(Debug, Deserialize)]
pub struct SaveDraftRequest {
    /// Wizard step the save originated from
    pub step: i32,

    /// Draft fields to merge over the stored blob
    pub data: JsonValue,
}

/// Draft state response
#[derive(Debug, Serialize)]
pub struct DraftResponse {
    /// The stored blob, verbatim
    pub data: JsonValue,

    /// Last step the draft was saved from
    pub step: i32,

    /// When the draft was last saved
    pub saved_at: Option<DateTime<Utc>>,
}

/// Completion request: the company details collected by the wizard
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteRequest {
    /// Payout IBAN (CH/LI format)
    #[validate(length(max = 34, message = "IBAN must be at most 34 characters"))]
    pub iban: Option<String>,

    /// Swiss VAT number
    #[validate(length(max = 32, message = "VAT number must be at most 32 characters"))]
    pub vat_number: Option<String>,

    /// Canton two-letter code
    #[validate(length(equal = 2, message = "Canton must be a two-letter code"))]
    pub canton: Option<String>,
}

/// Completion response
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    /// Always true after this call returns
    pub onboarding_completed: bool,
}

/// The session's organization, or the typed `/onboarding` redirect
///
/// Draft and completion endpoints need an organization but must not be
/// gated on `onboarding` (the wizard is where onboarding happens).
fn require_org(session: &Session) -> Result<&Organization, ApiError> {
    session.organization.as_ref().ok_or(ApiError::Redirect(
        fakturo_shared::session::RedirectTarget::Onboarding,
    ))
}

/// Creates the organization for a session that has none
///
/// The caller becomes the owner; the new organization starts on the free
/// plan with onboarding open.
///
/// # Errors
///
/// - `409 Conflict`: The session already has an active organization
pub async fn create_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateOrganizationRequest>,
) -> ApiResult<Json<CreateOrganizationResponse>> {
    req.validate().map_err(validation_details)?;

    let session = state.session(&headers, SessionRequirements::wizard()).await?;

    if session.flags.has_organization {
        return Err(ApiError::Conflict(
            "You already belong to an organization".to_string(),
        ));
    }

    let org = Organization::create(
        &state.db,
        CreateOrganization {
            name: req.name,
            plan: OrgPlan::Free,
        },
    )
    .await?;

    Membership::create(
        &state.db,
        CreateMembership {
            org_id: org.id,
            user_id: session.user_id,
            role: MembershipRole::Owner,
        },
    )
    .await?;

    // The membership cache may hold a negative result from the lookup above.
    state
        .cache
        .invalidate(CacheKind::Membership, &session.user_id.to_string())
        .await;

    audit::record(
        &state.db,
        events::ORGANIZATION_CREATED,
        &session.email,
        Some(org.id),
        serde_json::json!({ "name": org.name }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(CreateOrganizationResponse {
        organization_id: org.id,
    }))
}

/// Loads the wizard draft verbatim
pub async fn load_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DraftResponse>> {
    let session = state.session(&headers, SessionRequirements::wizard()).await?;
    let org = require_org(&session)?;

    // The cached organization may be minutes old; drafts change every few
    // seconds while someone types, so read through to the database.
    let org = Organization::find_by_id(&state.db, org.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    Ok(Json(DraftResponse {
        data: org.onboarding_draft,
        step: org.onboarding_step,
        saved_at: org.draft_saved_at,
    }))
}

/// Saves the wizard draft (shallow merge, last write wins)
pub async fn save_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SaveDraftRequest>,
) -> ApiResult<Json<DraftResponse>> {
    if !req.data.is_object() {
        return Err(ApiError::BadRequest("Draft data must be an object".to_string()));
    }

    let session = state.session(&headers, SessionRequirements::wizard()).await?;
    let org = require_org(&session)?;

    let updated = Organization::save_draft(&state.db, org.id, req.step, req.data)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    state
        .cache
        .invalidate(CacheKind::Organization, &updated.id.to_string())
        .await;

    Ok(Json(DraftResponse {
        data: updated.onboarding_draft,
        step: updated.onboarding_step,
        saved_at: updated.draft_saved_at,
    }))
}

/// Resets the wizard draft to an empty object
pub async fn clear_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DraftResponse>> {
    let session = state.session(&headers, SessionRequirements::wizard()).await?;
    let org = require_org(&session)?;

    let updated = Organization::clear_draft(&state.db, org.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    state
        .cache
        .invalidate(CacheKind::Organization, &updated.id.to_string())
        .await;

    Ok(Json(DraftResponse {
        data: updated.onboarding_draft,
        step: updated.onboarding_step,
        saved_at: updated.draft_saved_at,
    }))
}

/// Completes onboarding: persists details, upserts consent, clears the draft
///
/// Idempotent end to end - a second call rewrites the same absolute values
/// and the consent upsert updates instead of duplicating.
pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<CompleteResponse>> {
    req.validate().map_err(validation_details)?;

    let session = state.session(&headers, SessionRequirements::wizard()).await?;
    let org = require_org(&session)?;

    let updated = Organization::complete_onboarding(
        &state.db,
        org.id,
        CompanyDetails {
            iban: req.iban,
            vat_number: req.vat_number,
            canton: req.canton.map(|c| c.to_uppercase()),
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    // Completing the wizard implies accepting terms and privacy policy.
    ConsentRecord::upsert_grant(
        &state.db,
        session.user_id,
        ConsentType::Terms,
        ConsentMethod::Onboarding,
    )
    .await?;
    ConsentRecord::upsert_grant(
        &state.db,
        session.user_id,
        ConsentType::Privacy,
        ConsentMethod::Onboarding,
    )
    .await?;

    state
        .cache
        .invalidate(CacheKind::Organization, &updated.id.to_string())
        .await;

    audit::record(
        &state.db,
        events::ONBOARDING_COMPLETED,
        &session.email,
        Some(updated.id),
        serde_json::json!({ "canton": updated.canton }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(CompleteResponse {
        onboarding_completed: updated.onboarding_completed,
    }))
}
