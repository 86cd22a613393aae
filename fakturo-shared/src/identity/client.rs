/// HTTP client for the hosted identity provider
///
/// Talks to the provider's REST API with the service-role key. Admin
/// endpoints (user lookup/creation, link generation) live under `/admin`;
/// the password grant and sign-out are the same endpoints the provider's
/// own SDKs call.
///
/// Anything that isn't a recognized expected-unhappy status maps to
/// `IdentityError::Unavailable`, which handlers surface as a generic
/// "please try again".

use super::{IdentityError, IdentityProvider, NewProviderUser, ProviderSession, ProviderUser};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for the identity-provider client
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the provider's auth API (e.g. "https://auth.fakturo.ch")
    pub base_url: String,

    /// Service-role key for admin endpoints
    pub service_key: String,

    /// Shared secret the provider signs access tokens with
    pub jwt_secret: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl IdentityConfig {
    /// Loads configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `IDENTITY_BASE_URL`: Provider auth API base URL (required)
    /// - `IDENTITY_SERVICE_KEY`: Service-role key (required)
    /// - `IDENTITY_JWT_SECRET`: Access-token signing secret (required)
    /// - `IDENTITY_TIMEOUT_SECONDS`: Request timeout (default: 10)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("IDENTITY_BASE_URL")
            .map_err(|_| anyhow::anyhow!("IDENTITY_BASE_URL environment variable is required"))?;
        let service_key = std::env::var("IDENTITY_SERVICE_KEY").map_err(|_| {
            anyhow::anyhow!("IDENTITY_SERVICE_KEY environment variable is required")
        })?;
        let jwt_secret = std::env::var("IDENTITY_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("IDENTITY_JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("IDENTITY_JWT_SECRET must be at least 32 characters long");
        }

        let timeout_seconds = std::env::var("IDENTITY_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            base_url,
            service_key,
            jwt_secret,
            timeout_seconds,
        })
    }
}

/// Identity provider backed by the hosted REST API
#[derive(Clone)]
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    users: Vec<ProviderUser>,
}

#[derive(Debug, Deserialize)]
struct GenerateLinkResponse {
    action_link: String,
}

impl HttpIdentityProvider {
    /// Creates a client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| IdentityError::Unavailable(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/admin{}", self.base_url, path)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unavailable(e: reqwest::Error) -> IdentityError {
        IdentityError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<ProviderUser>, IdentityError> {
        let response = self
            .http
            .get(self.admin_url(&format!("/users/{}", id)))
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(Self::unavailable)?;

        match response.status() {
            StatusCode::OK => {
                let user = response.json().await.map_err(Self::unavailable)?;
                Ok(Some(user))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from user lookup",
                status
            ))),
        }
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ProviderUser>, IdentityError> {
        let response = self
            .http
            .get(self.admin_url("/users"))
            .query(&[("email", email)])
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from user search",
                response.status()
            )));
        }

        let list: UserListResponse = response.json().await.map_err(Self::unavailable)?;

        // The provider matches email prefixes; pin to the exact address.
        Ok(list
            .users
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn create_user(&self, data: NewProviderUser) -> Result<ProviderUser, IdentityError> {
        let body = serde_json::json!({
            "email": data.email,
            "password_hash": data.password_hash,
            "email_confirm": data.email_confirmed,
            "user_metadata": data.user_metadata,
        });

        let response = self
            .http
            .post(self.admin_url("/users"))
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                response.json().await.map_err(Self::unavailable)
            }
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(IdentityError::Conflict)
            }
            status => Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from user creation",
                status
            ))),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        let body = serde_json::json!({ "email": email, "password": password });

        let response = self
            .http
            .post(self.url("/token?grant_type=password"))
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(Self::unavailable),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(IdentityError::InvalidCredentials)
            }
            status => Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from password grant",
                status
            ))),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(self.url("/logout"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(Self::unavailable)?;

        // 401 means the session is already gone, which is the desired state.
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from sign-out",
                response.status()
            )))
        }
    }

    async fn generate_magic_link(&self, email: &str) -> Result<String, IdentityError> {
        let body = serde_json::json!({ "type": "magiclink", "email": email });

        let response = self
            .http
            .post(self.admin_url("/generate_link"))
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        match response.status() {
            StatusCode::OK => {
                let link: GenerateLinkResponse =
                    response.json().await.map_err(Self::unavailable)?;
                Ok(link.action_link)
            }
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(IdentityError::UserNotFound)
            }
            status => Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from link generation",
                status
            ))),
        }
    }

    async fn update_password(&self, user_id: Uuid, password: &str) -> Result<(), IdentityError> {
        let body = serde_json::json!({ "password": password });

        let response = self
            .http
            .put(self.admin_url(&format!("/users/{}", user_id)))
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(IdentityError::UserNotFound),
            status => Err(IdentityError::Unavailable(format!(
                "Unexpected status {} from password update",
                status
            ))),
        }
    }
}
