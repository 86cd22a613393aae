/// Authentication flow endpoints
///
/// Account creation is deferred until email verification: `register` only
/// parks a pending registration and emails a 24 h token; `verify_email`
/// turns the pending row into a provider user plus an application profile.
/// Login, magic links, and password resets delegate credential handling to
/// the identity provider.
///
/// Responses are worded so account existence is never disclosed: the
/// register/magic-link/reset endpoints answer the same way whether or not
/// an account exists. The one deliberate exception is a duplicate
/// registration while a verification is pending, which tells the user to
/// check their inbox.
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Park a pending registration, email the token
/// - `POST /v1/auth/verify-email` - Redeem the token, create the account
/// - `POST /v1/auth/resend-verification` - Re-send the pending token
/// - `POST /v1/auth/login` - Password sign-in via the provider
/// - `POST /v1/auth/logout` - Revoke the provider session
/// - `POST /v1/auth/magic-link` - Email a provider-issued sign-in link
/// - `POST /v1/auth/password-reset` - Email a 1 h reset token
/// - `POST /v1/auth/password-reset/confirm` - Redeem the token, set password

use crate::{
    app::AppState,
    error::{validation_details, ApiError, ApiResult, ValidationErrorDetail},
    middleware::rate_limit::{client_ip, enforce},
};
use axum::{extract::State, http::HeaderMap, Json};
use fakturo_shared::audit;
use fakturo_shared::email::{EmailJob, EmailTemplate};
use fakturo_shared::identity::password::{hash_password, validate_password_strength};
use fakturo_shared::identity::{IdentityError, NewProviderUser};
use fakturo_shared::models::audit_log::events;
use fakturo_shared::models::pending_registration::{
    CreatePendingRegistration, PendingRegistration,
};
use fakturo_shared::models::profile::{CreateProfile, UserProfile};
use fakturo_shared::redis::rate_limit::RateLimitOp;
use fakturo_shared::tokens::{generate_token, TokenKind};
use serde::{Deserialize, Serialize};
use validator::Validate;

const INVALID_LINK_MESSAGE: &str = "This link is invalid or has expired.";
const NEUTRAL_EMAIL_MESSAGE: &str =
    "If an account exists for this address, an email is on its way.";

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (validated for strength separately)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// Optional display name
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    /// Optional company name, pre-filling the onboarding wizard
    #[validate(length(max = 100, message = "Company name must be at most 100 characters"))]
    pub company_name: Option<String>,

    /// Optional UI locale
    #[validate(length(max = 5, message = "Locale must be at most 5 characters"))]
    pub locale: Option<String>,
}

/// Plain message response shared by the flow endpoints
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// User-facing outcome message
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Verify-email request
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    /// Token from the emailed verification link
    pub token: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Provider user ID
    pub user_id: String,

    /// JWT access token
    pub access_token: String,

    /// Opaque refresh token
    pub refresh_token: String,

    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Magic-link / password-reset request (email only)
#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Password-reset confirmation request
#[derive(Debug, Deserialize)]
pub struct ConfirmResetRequest {
    /// Token from the emailed reset link
    pub token: String,

    /// New password
    pub password: String,
}

fn password_field_error(message: String) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: "password".to_string(),
        message,
    }])
}

/// Register a new account (deferred until email verification)
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "a@b.com",
///   "password": "Abcdef1!",
///   "company_name": "Muster Treuhand AG"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: A verification for this email is already pending
/// - `429 Too Many Requests`: Rate limited
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate().map_err(validation_details)?;
    validate_password_strength(&req.password).map_err(password_field_error)?;

    let email = req.email.trim().to_lowercase();
    enforce(&state, RateLimitOp::Register, &email).await?;

    let ip = client_ip(&headers);

    // A confirmed provider user wins over everything; answer neutrally so
    // the form cannot be used to probe for accounts.
    if state.identity.get_user_by_email(&email).await?.is_some() {
        audit::record(
            &state.db,
            events::REGISTRATION_STARTED,
            &email,
            None,
            serde_json::json!({ "outcome": "existing_account" }),
            ip,
        )
        .await;
        return Ok(Json(MessageResponse::new(
            "Check your email to verify your address.",
        )));
    }

    if let Some(pending) = PendingRegistration::find_by_email(&state.db, &email).await? {
        if !pending.is_expired(chrono::Utc::now()) {
            return Err(ApiError::Conflict(
                "Registration already in progress. Check your inbox for the verification email."
                    .to_string(),
            ));
        }
        // Expired leftover; replace it with a fresh registration.
        PendingRegistration::delete(&state.db, &email).await?;
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::InternalError(e.to_string()))?;
    let token = generate_token();

    PendingRegistration::create(
        &state.db,
        CreatePendingRegistration {
            email: email.clone(),
            verification_token: token.clone(),
            password_hash,
            metadata: serde_json::json!({
                "name": req.name,
                "company_name": req.company_name,
                "locale": req.locale,
            }),
        },
    )
    .await?;

    let link = state.config.app_url(&format!("/verify-email?token={}", token));
    state
        .queue
        .enqueue_best_effort(EmailJob::new(&email, EmailTemplate::VerifyEmail { link }))
        .await;

    audit::record(
        &state.db,
        events::REGISTRATION_STARTED,
        &email,
        None,
        serde_json::json!({ "outcome": "pending_created" }),
        ip,
    )
    .await;

    Ok(Json(MessageResponse::new(
        "Check your email to verify your address.",
    )))
}

/// Re-send the verification email for a pending registration
///
/// Re-uses the stored token so earlier emails stay valid. Responds
/// neutrally whether or not a pending registration exists.
pub async fn resend_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate().map_err(validation_details)?;

    let email = req.email.trim().to_lowercase();
    enforce(&state, RateLimitOp::ResendVerification, &email).await?;

    if let Some(pending) = PendingRegistration::find_by_email(&state.db, &email).await? {
        if !pending.is_expired(chrono::Utc::now()) {
            let link = state.config.app_url(&format!(
                "/verify-email?token={}",
                pending.verification_token
            ));
            state
                .queue
                .enqueue_best_effort(EmailJob::new(&email, EmailTemplate::VerifyEmail { link }))
                .await;
        }
    }

    audit::record(
        &state.db,
        events::REGISTRATION_STARTED,
        &email,
        None,
        serde_json::json!({ "outcome": "verification_resent" }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(MessageResponse::new(NEUTRAL_EMAIL_MESSAGE)))
}

/// Redeem a verification token and create the account
///
/// Expired or unknown tokens get one shared message; an expired pending
/// row is also removed so the email can register again.
///
/// # Errors
///
/// - `401 Unauthorized`: Token unknown or expired
pub async fn verify_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let pending = PendingRegistration::find_by_token(&state.db, &req.token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_LINK_MESSAGE.to_string()))?;

    if pending.is_expired(chrono::Utc::now()) {
        PendingRegistration::delete(&state.db, &pending.email).await?;
        return Err(ApiError::Unauthorized(INVALID_LINK_MESSAGE.to_string()));
    }

    let user = match state
        .identity
        .create_user(NewProviderUser {
            email: pending.email.clone(),
            password_hash: pending.password_hash.clone(),
            email_confirmed: true,
            user_metadata: pending.metadata.clone(),
        })
        .await
    {
        Ok(user) => user,
        // The account appeared between registration and verification
        // (e.g. via magic link); fall through to the existing user so the
        // pending row still gets cleaned up.
        Err(IdentityError::Conflict) => state
            .identity
            .get_user_by_email(&pending.email)
            .await?
            .ok_or_else(|| {
                ApiError::InternalError("Provider reported conflict but user is missing".to_string())
            })?,
        Err(e) => return Err(e.into()),
    };

    if UserProfile::find_by_user_id(&state.db, user.id).await?.is_none() {
        let name = pending.metadata["name"].as_str().map(str::to_string);
        let locale = pending.metadata["locale"].as_str().map(str::to_string);
        UserProfile::create(
            &state.db,
            CreateProfile {
                user_id: user.id,
                email: pending.email.clone(),
                display_name: name,
                locale,
            },
        )
        .await?;
    }

    PendingRegistration::delete(&state.db, &pending.email).await?;

    let display_name = pending.metadata["name"].as_str().map(str::to_string);
    state
        .queue
        .enqueue_best_effort(EmailJob::new(
            &pending.email,
            EmailTemplate::Welcome { name: display_name },
        ))
        .await;

    audit::record(
        &state.db,
        events::REGISTRATION_VERIFIED,
        &pending.email,
        None,
        serde_json::json!({ "user_id": user.id }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(MessageResponse::new(
        "Email verified. You can sign in now.",
    )))
}

/// Password login
///
/// # Errors
///
/// - `401 Unauthorized`: One generic "Invalid email or password"
/// - `429 Too Many Requests`: Rate limited
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate().map_err(validation_details)?;

    let email = req.email.trim().to_lowercase();
    enforce(&state, RateLimitOp::Login, &email).await?;

    let ip = client_ip(&headers);

    let session = match state
        .identity
        .sign_in_with_password(&email, &req.password)
        .await
    {
        Ok(session) => session,
        Err(IdentityError::InvalidCredentials) => {
            audit::record(
                &state.db,
                events::LOGIN_FAILED,
                &email,
                None,
                serde_json::json!({}),
                ip,
            )
            .await;
            return Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    UserProfile::update_last_login(&state.db, session.user.id).await?;

    audit::record(
        &state.db,
        events::LOGIN_SUCCEEDED,
        &email,
        None,
        serde_json::json!({ "user_id": session.user.id }),
        ip,
    )
    .await;

    Ok(Json(LoginResponse {
        user_id: session.user.id.to_string(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
    }))
}

/// Revoke the current provider session
///
/// Best-effort: an already-dead session is a success.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if let Err(e) = state.identity.sign_out(token).await {
            tracing::warn!(error = %e, "Provider sign-out failed; continuing");
        }
    }

    Ok(Json(MessageResponse::new("Signed out.")))
}

/// Request a passwordless sign-in link
///
/// The provider issues the single-use link; we only deliver it. The
/// response is identical whether or not the account exists.
pub async fn request_magic_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate().map_err(validation_details)?;

    let email = req.email.trim().to_lowercase();
    enforce(&state, RateLimitOp::MagicLink, &email).await?;

    match state.identity.generate_magic_link(&email).await {
        Ok(link) => {
            state
                .queue
                .enqueue_best_effort(EmailJob::new(&email, EmailTemplate::MagicLink { link }))
                .await;
        }
        Err(IdentityError::UserNotFound) => {
            // Same response as the happy path; nothing to send.
        }
        Err(e) => return Err(e.into()),
    }

    audit::record(
        &state.db,
        events::MAGIC_LINK_REQUESTED,
        &email,
        None,
        serde_json::json!({}),
        client_ip(&headers),
    )
    .await;

    Ok(Json(MessageResponse::new(NEUTRAL_EMAIL_MESSAGE)))
}

/// Request a password-reset token
///
/// Issues a 1 h single-use token and emails the reset link, but only when
/// the account exists; the response never says which.
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate().map_err(validation_details)?;

    let email = req.email.trim().to_lowercase();
    enforce(&state, RateLimitOp::PasswordReset, &email).await?;

    if state.identity.get_user_by_email(&email).await?.is_some() {
        let token = state.tokens.issue(TokenKind::PasswordReset, &email).await?;
        let link = state
            .config
            .app_url(&format!("/reset-password?token={}", token));
        state
            .queue
            .enqueue_best_effort(EmailJob::new(&email, EmailTemplate::PasswordReset { link }))
            .await;
    }

    audit::record(
        &state.db,
        events::PASSWORD_RESET_REQUESTED,
        &email,
        None,
        serde_json::json!({}),
        client_ip(&headers),
    )
    .await;

    Ok(Json(MessageResponse::new(NEUTRAL_EMAIL_MESSAGE)))
}

/// Redeem a password-reset token and set the new password
///
/// The token is consumed before any other check, so a failed attempt
/// still burns it.
///
/// # Errors
///
/// - `401 Unauthorized`: Token unknown, used, or expired
/// - `422 Unprocessable Entity`: Weak password
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConfirmResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    validate_password_strength(&req.password).map_err(password_field_error)?;

    let record = state
        .tokens
        .consume(TokenKind::PasswordReset, &req.token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_LINK_MESSAGE.to_string()))?;

    let user = state
        .identity
        .get_user_by_email(&record.subject)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_LINK_MESSAGE.to_string()))?;

    match state.identity.update_password(user.id, &req.password).await {
        Ok(()) => {}
        Err(IdentityError::UserNotFound) => {
            return Err(ApiError::Unauthorized(INVALID_LINK_MESSAGE.to_string()))
        }
        Err(e) => return Err(e.into()),
    }

    audit::record(
        &state.db,
        events::PASSWORD_RESET_COMPLETED,
        &record.subject,
        None,
        serde_json::json!({ "user_id": user.id }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(MessageResponse::new(
        "Password updated. You can sign in now.",
    )))
}
