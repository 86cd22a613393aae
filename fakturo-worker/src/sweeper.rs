/// Periodic expiry sweeps
///
/// One slow loop doing housekeeping the request path must not:
///
/// - purge expired `pending_registrations`, which both frees the email
///   address for a fresh registration and upholds the rule that a pending
///   row and a confirmed user never coexist
///
/// The sweep is idempotent and cheap, so the interval is generous and a
/// failed pass just waits for the next one.

use fakturo_shared::models::pending_registration::PendingRegistration;
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Time between sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Runs the sweep loop until the cancellation token fires
pub async fn run(db: PgPool, cancel: CancellationToken) {
    tracing::info!("Expiry sweeper started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
        }

        sweep_once(&db).await;
    }

    tracing::info!("Expiry sweeper stopped");
}

/// One sweep pass
pub async fn sweep_once(db: &PgPool) {
    match PendingRegistration::purge_expired(db).await {
        Ok(0) => tracing::debug!("No expired pending registrations"),
        Ok(count) => tracing::info!(count, "Purged expired pending registrations"),
        Err(e) => tracing::warn!(error = %e, "Pending registration purge failed"),
    }
}
