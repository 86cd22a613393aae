/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `REDIS_URL`: Redis connection string (required)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_CORS_ORIGINS`: Comma-separated allowed origins (default: *)
/// - `API_PRODUCTION`: Enables HSTS and strict CORS (default: false)
/// - `APP_BASE_URL`: Public frontend base URL for emailed links (required)
/// - `IDENTITY_*`: See `fakturo_shared::identity::client::IdentityConfig`
/// - `BILLING_*`: See `crate::billing::BillingConfig`
/// - `RUST_LOG`: Log level (default: info)
///
/// # Example
///
/// ```no_run
/// use fakturo_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use crate::billing::BillingConfig;
use fakturo_shared::db::pool::DatabaseConfig;
use fakturo_shared::identity::client::IdentityConfig;
use fakturo_shared::redis::client::RedisConfig;
use std::env;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Identity provider configuration
    pub identity: IdentityConfig,

    /// Payments API configuration
    pub billing: BillingConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins ("*" = permissive, development only)
    pub cors_origins: Vec<String>,

    /// Production hardening (HSTS, strict CORS)
    pub production: bool,

    /// Public frontend base URL, used to build emailed links
    pub app_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let cors_origins = env::var("API_CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let production = env::var("API_PRODUCTION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let app_base_url = env::var("APP_BASE_URL")
            .map_err(|_| anyhow::anyhow!("APP_BASE_URL environment variable is required"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
                app_base_url,
            },
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            identity: IdentityConfig::from_env()?,
            billing: BillingConfig::from_env()?,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Builds a frontend URL from a path and query string
    pub fn app_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.api.app_base_url, path_and_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["https://app.fakturo.ch".to_string()],
                production: true,
                app_base_url: "https://app.fakturo.ch".to_string(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                ..Default::default()
            },
            redis: fakturo_shared::redis::client::RedisConfig {
                url: "redis://localhost:6379".to_string(),
                command_timeout_secs: 10,
            },
            identity: IdentityConfig {
                base_url: "https://auth.test".to_string(),
                service_key: "service-key".to_string(),
                jwt_secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                timeout_seconds: 10,
            },
            billing: BillingConfig {
                api_base_url: "https://api.stripe.test".to_string(),
                secret_key: "sk_test_123".to_string(),
                webhook_secret: "whsec_test".to_string(),
                starter_price_id: "price_starter".to_string(),
                pro_price_id: "price_pro".to_string(),
                timeout_seconds: 20,
            },
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(test_config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_app_url() {
        assert_eq!(
            test_config().app_url("/verify-email?token=abc"),
            "https://app.fakturo.ch/verify-email?token=abc"
        );
    }
}
