/// Consent endpoints (GDPR/FADP)
///
/// Cookie-banner and policy consent decisions, recorded append-only for
/// signed-in users and anonymous visitors alike. Visitors are keyed by the
/// banner's cookie id and rate limited by client IP; signed-in subjects key
/// on their user id. Withdrawal stamps the active grant and appends the
/// refusal, keeping the full decision history on record.
///
/// # Endpoints
///
/// - `GET  /v1/consent` - Active grants for the subject
/// - `POST /v1/consent` - Record a decision
/// - `POST /v1/consent/withdraw` - Withdraw an active grant

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::rate_limit::{client_ip, enforce},
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use fakturo_shared::audit;
use fakturo_shared::models::audit_log::events;
use fakturo_shared::models::consent::{ConsentMethod, ConsentRecord, ConsentSubject, ConsentType};
use fakturo_shared::redis::rate_limit::RateLimitOp;
use fakturo_shared::session::SessionRequirements;
use serde::{Deserialize, Serialize};

/// Record-consent request
#[derive(Debug, Deserialize)]
pub struct RecordConsentRequest {
    /// Consent category
    pub consent_type: ConsentType,

    /// Whether consent was given (false records an explicit refusal)
    pub given: bool,

    /// How the decision was captured
    pub method: ConsentMethod,

    /// Banner cookie id for anonymous visitors (ignored when signed in)
    pub visitor_id: Option<String>,
}

/// Withdraw request
#[derive(Debug, Deserialize)]
pub struct WithdrawConsentRequest {
    /// Consent category to withdraw
    pub consent_type: ConsentType,

    /// Banner cookie id for anonymous visitors (ignored when signed in)
    pub visitor_id: Option<String>,
}

/// List query for anonymous subjects
#[derive(Debug, Deserialize)]
pub struct ListConsentQuery {
    /// Banner cookie id for anonymous visitors
    pub visitor_id: Option<String>,
}

/// Consent list response
#[derive(Debug, Serialize)]
pub struct ConsentListResponse {
    /// Active grants (given, not withdrawn, within the retention window)
    pub consents: Vec<ConsentRecord>,
}

/// Single-record response
#[derive(Debug, Serialize)]
pub struct ConsentResponse {
    /// The recorded decision
    pub consent: ConsentRecord,
}

/// Withdrawal response
#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    /// Whether an active grant existed and was withdrawn
    pub withdrawn: bool,
}

/// Resolves the request's consent subject
///
/// A valid bearer token wins; otherwise the caller must provide a visitor
/// id, and the write endpoints rate limit by IP to keep the anonymous
/// surface from being flooded.
async fn resolve_subject(
    state: &AppState,
    headers: &HeaderMap,
    visitor_id: Option<String>,
    rate_limited_write: bool,
) -> Result<ConsentSubject, ApiError> {
    match state.session(headers, SessionRequirements::default()).await {
        Ok(session) => return Ok(ConsentSubject::User(session.user_id)),
        // No usable token: fall through to the anonymous path.
        Err(ApiError::Redirect(_)) => {}
        Err(e) => return Err(e),
    }

    let visitor_id = visitor_id
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .ok_or_else(|| {
            ApiError::BadRequest("visitor_id is required without a session".to_string())
        })?;

    if rate_limited_write {
        let ip = client_ip(headers).unwrap_or_else(|| "unknown".to_string());
        enforce(state, RateLimitOp::ConsentWrite, &ip).await?;
    }

    Ok(ConsentSubject::Visitor(visitor_id))
}

fn subject_actor(subject: &ConsentSubject) -> String {
    match subject {
        ConsentSubject::User(id) => id.to_string(),
        ConsentSubject::Visitor(id) => format!("visitor:{}", id),
    }
}

/// Records a consent decision (append-only)
pub async fn record_consent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordConsentRequest>,
) -> ApiResult<Json<ConsentResponse>> {
    let subject = resolve_subject(&state, &headers, req.visitor_id, true).await?;

    let record =
        ConsentRecord::record(&state.db, &subject, req.consent_type, req.given, req.method)
            .await?;

    audit::record(
        &state.db,
        events::CONSENT_RECORDED,
        &subject_actor(&subject),
        None,
        serde_json::json!({
            "consent_type": req.consent_type.as_str(),
            "given": req.given,
            "method": req.method.as_str(),
        }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(ConsentResponse { consent: record }))
}

/// Withdraws an active grant and appends the refusal
pub async fn withdraw_consent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WithdrawConsentRequest>,
) -> ApiResult<Json<WithdrawResponse>> {
    let subject = resolve_subject(&state, &headers, req.visitor_id, true).await?;

    let withdrawn = ConsentRecord::withdraw(&state.db, &subject, req.consent_type).await?;

    // The refusal itself is part of the history.
    ConsentRecord::record(
        &state.db,
        &subject,
        req.consent_type,
        false,
        ConsentMethod::Settings,
    )
    .await?;

    audit::record(
        &state.db,
        events::CONSENT_WITHDRAWN,
        &subject_actor(&subject),
        None,
        serde_json::json!({ "consent_type": req.consent_type.as_str() }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(WithdrawResponse { withdrawn }))
}

/// Lists the subject's active grants
pub async fn list_consents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListConsentQuery>,
) -> ApiResult<Json<ConsentListResponse>> {
    let subject = resolve_subject(&state, &headers, query.visitor_id, false).await?;

    let consents = ConsentRecord::list_active(&state.db, &subject).await?;

    Ok(Json(ConsentListResponse { consents }))
}
