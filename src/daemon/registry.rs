//! The controller's current view of reachable daemons.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::discovery::{Discovery, DiscoveryError};
use super::protocol::DaemonRecord;

/// Cache of the last successful discovery result.
///
/// Readers get the latest snapshot immediately; only [`refresh`] talks to
/// the network.
///
/// [`refresh`]: DaemonRegistry::refresh
pub struct DaemonRegistry {
    discovery: Arc<dyn Discovery>,
    snapshot: RwLock<Arc<Vec<DaemonRecord>>>,
}

impl DaemonRegistry {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            discovery,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Run discovery and replace the snapshot with its result.
    ///
    /// On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<Vec<DaemonRecord>, DiscoveryError> {
        let daemons = self.discovery.discover().await?;
        debug!("Discovered {} daemon(s)", daemons.len());

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(daemons.clone());
        Ok(daemons)
    }

    /// Most recent successful snapshot.
    pub fn list(&self) -> Vec<DaemonRecord> {
        self.current().as_ref().clone()
    }

    /// Find a daemon by nickname in the current snapshot.
    pub fn find(&self, nickname: &str) -> Option<DaemonRecord> {
        self.current()
            .iter()
            .find(|d| d.nickname == nickname)
            .cloned()
    }

    fn current(&self) -> Arc<Vec<DaemonRecord>> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }
}
