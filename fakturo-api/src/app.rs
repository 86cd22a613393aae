/// Application state and router builder
///
/// This module defines the shared application state and provides a function
/// to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use fakturo_api::{app, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = app::AppState::from_config(config).await?;
/// let router = app::build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, router).await?;
/// # Ok(())
/// # }
/// ```

use crate::{billing::BillingClient, config::Config, error::ApiError, middleware::security::security_headers};
use axum::{
    http::{header, HeaderMap, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use fakturo_shared::db::pool::create_pool;
use fakturo_shared::email::queue::EmailQueue;
use fakturo_shared::identity::client::HttpIdentityProvider;
use fakturo_shared::identity::IdentityProvider;
use fakturo_shared::redis::cache::Cache;
use fakturo_shared::redis::client::RedisClient;
use fakturo_shared::redis::rate_limit::RateLimiter;
use fakturo_shared::session::{derive_session, Session, SessionRequirements};
use fakturo_shared::tokens::TokenStore;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every
/// field is a handle or an Arc, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Redis connection (health checks; the typed wrappers below share it)
    pub redis: RedisClient,

    /// Read-through cache
    pub cache: Cache,

    /// Fixed-window rate limiter
    pub limiter: RateLimiter,

    /// One-time token store
    pub tokens: TokenStore,

    /// Email outbox queue
    pub queue: EmailQueue,

    /// Identity provider (HTTP in production, mock in tests)
    pub identity: Arc<dyn IdentityProvider>,

    /// Payments API client
    pub billing: Arc<BillingClient>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds state with all production backends from configuration
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let db = create_pool(config.database.clone()).await?;
        let redis = RedisClient::new(config.redis.clone()).await?;
        let identity = HttpIdentityProvider::new(&config.identity)?;
        let billing = BillingClient::new(config.billing.clone())?;

        Ok(Self {
            db,
            cache: Cache::new(redis.clone()),
            limiter: RateLimiter::new(redis.clone()),
            tokens: TokenStore::new(redis.clone()),
            queue: EmailQueue::new(redis.clone()),
            redis,
            identity: Arc::new(identity),
            billing: Arc::new(billing),
            config: Arc::new(config),
        })
    }

    /// Builds state over provided backends (tests inject the mock provider)
    pub fn new(
        db: PgPool,
        redis: RedisClient,
        identity: Arc<dyn IdentityProvider>,
        billing: BillingClient,
        config: Config,
    ) -> Self {
        Self {
            db,
            cache: Cache::new(redis.clone()),
            limiter: RateLimiter::new(redis.clone()),
            tokens: TokenStore::new(redis.clone()),
            queue: EmailQueue::new(redis.clone()),
            redis,
            identity,
            billing: Arc::new(billing),
            config: Arc::new(config),
        }
    }

    /// Gets the provider JWT secret for local token verification
    pub fn jwt_secret(&self) -> &str {
        &self.config.identity.jwt_secret
    }

    /// Derives the request's session from its Authorization header
    ///
    /// A missing or malformed header is the same outcome as an invalid
    /// token: a redirect to `/login`.
    pub async fn session(
        &self,
        headers: &HeaderMap,
        requirements: SessionRequirements,
    ) -> Result<Session, ApiError> {
        let token = bearer_token(headers).ok_or(ApiError::Redirect(
            fakturo_shared::session::RedirectTarget::Login,
        ))?;

        let session =
            derive_session(&self.db, &self.cache, self.jwt_secret(), token, requirements).await?;

        Ok(session)
    }
}

/// Extracts the bearer token from an Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/
///     ├── /auth/                       # Authentication flows (public, rate limited per-op)
///     │   ├── POST /register
///     │   ├── POST /verify-email
///     │   ├── POST /resend-verification
///     │   ├── POST /login
///     │   ├── POST /logout
///     │   ├── POST /magic-link
///     │   ├── POST /password-reset
///     │   └── POST /password-reset/confirm
///     ├── GET  /session                # Derived session view
///     ├── /onboarding/                 # Wizard (session gated)
///     │   ├── POST /organization
///     │   ├── GET|PUT|DELETE /draft
///     │   └── POST /complete
///     ├── /billing/
///     │   ├── POST /checkout           # Session gated
///     │   ├── POST /portal             # Session gated
///     │   └── POST /webhook            # Signature verified, no session
///     ├── /consent/                    # Cookie/terms consent (user or visitor)
///     │   ├── GET  /
///     │   ├── POST /
///     │   └── POST /withdraw
///     └── /email-preferences/
///         ├── GET  /                   # Session gated
///         ├── PUT  /                   # Session gated
///         └── POST /unsubscribe        # Public, token keyed
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/verify-email", post(routes::auth::verify_email))
        .route(
            "/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/magic-link", post(routes::auth::request_magic_link))
        .route("/password-reset", post(routes::auth::request_password_reset))
        .route(
            "/password-reset/confirm",
            post(routes::auth::confirm_password_reset),
        );

    let onboarding_routes = Router::new()
        .route("/organization", post(routes::onboarding::create_organization))
        .route(
            "/draft",
            get(routes::onboarding::load_draft)
                .put(routes::onboarding::save_draft)
                .delete(routes::onboarding::clear_draft),
        )
        .route("/complete", post(routes::onboarding::complete));

    let billing_routes = Router::new()
        .route("/checkout", post(routes::billing::create_checkout))
        .route("/portal", post(routes::billing::create_portal))
        .route("/webhook", post(routes::billing::webhook));

    let consent_routes = Router::new()
        .route(
            "/",
            get(routes::consent::list_consents).post(routes::consent::record_consent),
        )
        .route("/withdraw", post(routes::consent::withdraw_consent));

    let email_routes = Router::new()
        .route(
            "/",
            get(routes::email_preferences::get_preferences)
                .put(routes::email_preferences::update_preferences),
        )
        .route("/unsubscribe", post(routes::email_preferences::unsubscribe));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .route("/session", get(routes::session::get_session))
        .nest("/onboarding", onboarding_routes)
        .nest("/billing", billing_routes)
        .nest("/consent", consent_routes)
        .nest("/email-preferences", email_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(axum::middleware::from_fn(move |req, next| async move {
            security_headers(req, next, production).await
        }))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn test_bearer_token_missing_or_malformed() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
