/// Database layer for Fakturo
///
/// This module provides PostgreSQL connection pooling with health checks.
/// Models live in the `models` module at crate root level.
///
/// # Example
///
/// ```no_run
/// use fakturo_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: std::env::var("DATABASE_URL")?,
///         ..Default::default()
///     };
///
///     let pool = create_pool(config).await?;
///     Ok(())
/// }
/// ```

pub mod pool;
