//! Scripted daemon transport and discovery for testing.
//!
//! Neither type touches the network. Both are cheap to clone and clones share
//! state, so tests can keep a handle for assertions and scripting.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::client::{DaemonTransport, TransportError};
use super::discovery::{Discovery, DiscoveryError};
use super::protocol::DaemonRecord;
use crate::accounts::AccountRecord;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that answers from a script and records forwarded launches.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    unreachable: Arc<Mutex<HashSet<String>>>,
    launch_rejection: Option<String>,
    heartbeats: Arc<AtomicUsize>,
    launches: Arc<Mutex<Vec<(String, AccountRecord)>>>,
}

impl MockTransport {
    /// Every daemon is reachable and accepts launches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make heartbeats and launches to `nickname` fail as unreachable.
    pub fn unreachable(self, nickname: &str) -> Self {
        self.set_reachable(nickname, false);
        self
    }

    /// Reject every launch with `message`.
    pub fn rejecting_launches(mut self, message: impl Into<String>) -> Self {
        self.launch_rejection = Some(message.into());
        self
    }

    /// Toggle reachability of `nickname` after construction.
    pub fn set_reachable(&self, nickname: &str, reachable: bool) {
        let mut unreachable = lock(&self.unreachable);
        if reachable {
            unreachable.remove(nickname);
        } else {
            unreachable.insert(nickname.to_string());
        }
    }

    /// Number of heartbeat checks made.
    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    /// Accepted launches as `(daemon nickname, account)` pairs.
    pub fn launches(&self) -> Vec<(String, AccountRecord)> {
        lock(&self.launches).clone()
    }

    fn check_reachable(&self, daemon: &DaemonRecord) -> Result<(), TransportError> {
        if lock(&self.unreachable).contains(&daemon.nickname) {
            return Err(TransportError::Unreachable(format!(
                "connection refused ({})",
                daemon.socket_addr()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DaemonTransport for MockTransport {
    async fn heartbeat(&self, daemon: &DaemonRecord) -> Result<(), TransportError> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(daemon)
    }

    async fn launch(
        &self,
        daemon: &DaemonRecord,
        account: &AccountRecord,
    ) -> Result<String, TransportError> {
        self.check_reachable(daemon)?;
        if let Some(ref message) = self.launch_rejection {
            return Err(TransportError::Rejected(message.clone()));
        }
        lock(&self.launches).push((daemon.nickname.clone(), account.clone()));
        Ok("Account launched".to_string())
    }
}

/// Discovery that returns a scripted list, or a scripted failure.
#[derive(Debug, Clone, Default)]
pub struct MockDiscovery {
    daemons: Arc<Mutex<Vec<DaemonRecord>>>,
    failure: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockDiscovery {
    /// Discovery that finds nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_daemons(daemons: Vec<DaemonRecord>) -> Self {
        let discovery = Self::default();
        discovery.set_daemons(daemons);
        discovery
    }

    /// Replace the daemons returned and clear any scripted failure.
    pub fn set_daemons(&self, daemons: Vec<DaemonRecord>) {
        *lock(&self.daemons) = daemons;
        *lock(&self.failure) = None;
    }

    /// Make subsequent discoveries fail.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Number of discovery calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discovery for MockDiscovery {
    async fn discover(&self) -> Result<Vec<DaemonRecord>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.failure).clone() {
            return Err(DiscoveryError::Unavailable(message));
        }
        Ok(lock(&self.daemons).clone())
    }
}
