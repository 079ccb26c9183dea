use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::messenger::SecureMessenger;

/// Periodically evict stale reassembly buffers and idle flood entries.
/// Abort the returned handle to stop it.
pub fn spawn_sweeper(messenger: Arc<SecureMessenger>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_ms = period.as_millis() as u64, "sweeper started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            messenger.run_maintenance();
        }
    })
}
