//! Periodic refresh of the daemon registry.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::registry::DaemonRegistry;
use super::task::TaskHandle;

/// Default time between discovery cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Start refreshing `registry` every `interval`, beginning immediately.
///
/// Discovery failures are logged and otherwise ignored; the registry keeps
/// serving its previous snapshot. Stop the returned handle on shutdown.
pub fn start_polling(registry: Arc<DaemonRegistry>, interval: Duration) -> TaskHandle {
    TaskHandle::spawn("daemon-poller", move |mut shutdown_rx| async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = registry.refresh() => match result {
                            Ok(daemons) => debug!("Daemon poll found {} daemon(s)", daemons.len()),
                            Err(e) => warn!("Daemon poll failed, keeping previous list: {}", e),
                        },
                        _ = shutdown_rx.recv() => break,
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::mock::MockDiscovery;
    use crate::daemon::DaemonRecord;

    #[tokio::test]
    async fn test_polls_until_stopped() {
        let discovery = MockDiscovery::with_daemons(vec![DaemonRecord::new(
            "pc2",
            [10, 0, 0, 2].into(),
            5001,
        )]);
        let registry = Arc::new(DaemonRegistry::new(Arc::new(discovery.clone())));

        let handle = start_polling(Arc::clone(&registry), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.stop().await;

        let calls = discovery.call_count();
        assert!(calls >= 2, "expected several polls, got {}", calls);
        assert_eq!(registry.list().len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(discovery.call_count(), calls, "poller kept running after stop");
    }

    #[tokio::test]
    async fn test_failures_keep_polling_and_snapshot() {
        let discovery = MockDiscovery::with_daemons(vec![DaemonRecord::new(
            "pc2",
            [10, 0, 0, 2].into(),
            5001,
        )]);
        let registry = Arc::new(DaemonRegistry::new(Arc::new(discovery.clone())));
        registry.refresh().await.unwrap();
        discovery.fail_with("offline");

        let handle = start_polling(Arc::clone(&registry), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(90)).await;
        handle.stop().await;

        assert!(discovery.call_count() >= 3);
        assert_eq!(registry.list().len(), 1);
    }
}
