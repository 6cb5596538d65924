//! Periodic removal of obsolete lost sessions

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::service::SessionService;

/// Spawn the sweeper. It runs every `interval` until `shutdown` is cancelled.
pub fn spawn_obsolete_sweeper(
    service: Arc<SessionService>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Obsolete session sweeper started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match service.delete_obsolete().await {
                    Ok(0) => debug!("No obsolete lost sessions"),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to delete obsolete sessions: {}", e),
                },
            }
        }

        info!("Obsolete session sweeper stopped");
    })
}
