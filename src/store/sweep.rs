//! Periodic removal of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::traits::Database;

/// How often the sweep runs by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Spawn a background task that deletes expired sessions every `interval`.
///
/// Ledgers are left in place.
pub fn spawn_session_sweep(
    db: Arc<dyn Database>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match db.delete_expired_sessions().await {
                Ok(0) => debug!("Session sweep: nothing expired"),
                Ok(n) => info!(removed = n, "Session sweep removed expired sessions"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}
