//! # Fakturo Worker
//!
//! Background companion to the API server: drains the email outbox into
//! the transactional email API and runs periodic expiry sweeps.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p fakturo-worker
//! ```

use fakturo_worker::{config::Config, dispatch::Dispatcher, mailer::HttpMailer, sweeper};
use fakturo_shared::db::pool::create_pool;
use fakturo_shared::email::queue::EmailQueue;
use fakturo_shared::redis::client::RedisClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fakturo_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Fakturo worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let db = create_pool(config.database.clone()).await?;
    let redis = RedisClient::new(config.redis.clone()).await?;
    let queue = EmailQueue::new(redis);
    let mailer = Arc::new(HttpMailer::new(config.mailer.clone())?);

    let cancel = CancellationToken::new();

    let dispatcher = Dispatcher::new(db.clone(), queue, mailer, &config.app_base_url);
    let dispatch_cancel = cancel.clone();
    let dispatch_handle = tokio::spawn(async move {
        dispatcher.run(dispatch_cancel).await;
    });

    let sweeper_cancel = cancel.clone();
    let sweeper_db = db.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper::run(sweeper_db, sweeper_cancel).await;
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping tasks...");
    cancel.cancel();

    let _ = dispatch_handle.await;
    let _ = sweeper_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
