/// Identity provider integration
///
/// Credentials, session tokens, magic links, and email-verification state
/// are owned by a hosted identity provider; this module is the application's
/// only way to talk to it. The `IdentityProvider` trait captures the
/// operations the flows need, `HttpIdentityProvider` implements them against
/// the provider's REST admin API, and `MockIdentityProvider` backs tests and
/// local development with an in-memory user map.
///
/// Provider-issued access tokens are JWTs signed with a shared secret; the
/// `jwt` submodule verifies them locally so session derivation does not pay
/// a provider round-trip per request.

pub mod client;
pub mod jwt;
pub mod mock;
pub mod password;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by identity-provider operations
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Email/password pair rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No user for the given id/email
    #[error("User not found")]
    UserNotFound,

    /// A user with this email already exists
    #[error("User already exists")]
    Conflict,

    /// Access token missing, malformed, or expired
    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    /// Provider unreachable or returned an unexpected response
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// A user record as held by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    /// Provider-assigned user ID
    pub id: Uuid,

    /// Email address
    pub email: String,

    /// When the email was confirmed (None = unverified)
    pub email_confirmed_at: Option<DateTime<Utc>>,

    /// Free-form metadata attached at creation
    #[serde(default)]
    pub user_metadata: JsonValue,

    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl ProviderUser {
    /// Whether the provider considers the email verified
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Input for creating a provider user
///
/// The password arrives pre-hashed (Argon2id); the provider stores the hash
/// as-is. `email_confirmed` is set for users created after our own email
/// verification so the provider doesn't re-verify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProviderUser {
    /// Email address
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// Whether to mark the email as already confirmed
    pub email_confirmed: bool,

    /// Free-form metadata (display name, company, locale)
    pub user_metadata: JsonValue,
}

/// A provider-issued session (password or magic-link grant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    /// JWT access token
    pub access_token: String,

    /// Opaque refresh token
    pub refresh_token: String,

    /// Access token lifetime in seconds
    pub expires_in: u64,

    /// The authenticated user
    pub user: ProviderUser,
}

/// Operations the auth flows need from the identity provider
///
/// Implementations must map provider failures onto `IdentityError` variants
/// so handlers can give expected-unhappy outcomes their own responses and
/// treat everything else as a generic failure.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Looks up a user by provider ID
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<ProviderUser>, IdentityError>;

    /// Looks up a user by email
    async fn get_user_by_email(&self, email: &str)
        -> Result<Option<ProviderUser>, IdentityError>;

    /// Creates a user with a pre-hashed password
    async fn create_user(&self, data: NewProviderUser) -> Result<ProviderUser, IdentityError>;

    /// Exchanges email/password for a session
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, IdentityError>;

    /// Revokes the session behind an access token
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Generates a single-use magic sign-in link for an existing user
    async fn generate_magic_link(&self, email: &str) -> Result<String, IdentityError>;

    /// Sets a new password for a user (password-reset completion)
    async fn update_password(&self, user_id: Uuid, password: &str) -> Result<(), IdentityError>;
}
