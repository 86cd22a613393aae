/// Configuration management for the worker
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `REDIS_URL`: Redis connection string (required)
/// - `APP_BASE_URL`: Public frontend base URL for unsubscribe links (required)
/// - `EMAIL_*`: See `crate::mailer::MailerConfig`
/// - `RUST_LOG`: Log level (default: info)

use crate::mailer::MailerConfig;
use fakturo_shared::db::pool::DatabaseConfig;
use fakturo_shared::redis::client::RedisConfig;
use std::env;

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Email API configuration
    pub mailer: MailerConfig,

    /// Public frontend base URL
    pub app_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let app_base_url = env::var("APP_BASE_URL")
            .map_err(|_| anyhow::anyhow!("APP_BASE_URL environment variable is required"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            mailer: MailerConfig::from_env()?,
            app_base_url,
        })
    }
}
