use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::state::AppState;

/// Sweeps calls that sat `pending` past the configured TTL and tears down
/// any rooms they left behind. Disabled unless `call.pending_ttl_secs` is
/// set; by default a pending call waits forever.
pub fn spawn_pending_sweeper(state: AppState) -> Option<JoinHandle<()>> {
    let ttl_secs = state.settings.call.pending_ttl_secs?;
    let interval_secs = state.settings.call.sweep_interval_secs;
    info!(ttl_secs, interval_secs, "Pending-call sweeper enabled");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match state.calls.sweep_stale_pending(ttl_secs).await {
                Ok(ended) => {
                    for call in ended {
                        state.registry.teardown(&call.room_id, "expired").await;
                    }
                }
                Err(e) => warn!(%e, "Pending-call sweep failed"),
            }
        }
    }))
}
