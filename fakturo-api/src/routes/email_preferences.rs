/// Email preference endpoints
///
/// Marketing and product-update opt-outs for the signed-in user, plus the
/// public unsubscribe endpoint backing the List-Unsubscribe header on every
/// outbound message. Transactional mail is unaffected by any of this.
///
/// # Endpoints
///
/// - `GET  /v1/email-preferences` - Current flags (row created on first read)
/// - `PUT  /v1/email-preferences` - Update flags
/// - `POST /v1/email-preferences/unsubscribe` - Token-keyed opt-out, no session

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::HeaderMap, Json};
use fakturo_shared::models::email_preferences::EmailPreferences;
use fakturo_shared::session::SessionRequirements;
use fakturo_shared::tokens::generate_token;
use serde::{Deserialize, Serialize};

/// Preference flags response
#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    /// Recipient address
    pub email: String,

    /// Marketing mail allowed
    pub marketing: bool,

    /// Product update mail allowed
    pub product_updates: bool,
}

/// Preference update request
#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    /// New marketing flag (unchanged when absent)
    pub marketing: Option<bool>,

    /// New product-updates flag (unchanged when absent)
    pub product_updates: Option<bool>,
}

/// Unsubscribe request
#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    /// Token from the List-Unsubscribe link
    pub token: String,
}

/// Plain message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// User-facing outcome message
    pub message: String,
}

fn to_response(prefs: EmailPreferences) -> PreferencesResponse {
    PreferencesResponse {
        email: prefs.email,
        marketing: prefs.marketing,
        product_updates: prefs.product_updates,
    }
}

/// Returns the signed-in user's preferences, creating defaults on first read
pub async fn get_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PreferencesResponse>> {
    let session = state
        .session(&headers, SessionRequirements::default())
        .await?;

    let prefs =
        EmailPreferences::get_or_create(&state.db, &session.email, &generate_token()).await?;

    Ok(Json(to_response(prefs)))
}

/// Updates the signed-in user's preference flags
pub async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdatePreferencesRequest>,
) -> ApiResult<Json<PreferencesResponse>> {
    let session = state
        .session(&headers, SessionRequirements::default())
        .await?;

    // Ensure the row exists before the partial update.
    EmailPreferences::get_or_create(&state.db, &session.email, &generate_token()).await?;

    let prefs =
        EmailPreferences::update(&state.db, &session.email, req.marketing, req.product_updates)
            .await?
            .ok_or_else(|| {
                crate::error::ApiError::InternalError("Preference row vanished mid-update".to_string())
            })?;

    Ok(Json(to_response(prefs)))
}

/// Token-keyed unsubscribe from all non-transactional mail
///
/// Responds identically whether or not the token matched, so the endpoint
/// cannot be used to probe token validity.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<UnsubscribeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let matched = EmailPreferences::unsubscribe_all(&state.db, &req.token).await?;
    if !matched {
        tracing::debug!("Unsubscribe token did not match any row");
    }

    Ok(Json(MessageResponse {
        message: "You have been unsubscribed from marketing emails.".to_string(),
    }))
}
