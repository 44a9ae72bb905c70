//! Finding live daemon agents.
//!
//! Agents announce themselves with `POST /register_daemon`. Each discovery
//! cycle checks every registered agent and reports the ones that answer.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::client::DaemonTransport;
use super::protocol::DaemonRecord;
use crate::error::ErrorKind;

/// Discovery failed as a whole.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("daemon discovery unavailable: {0}")]
    Unavailable(String),
}

impl DiscoveryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DiscoveryError
    }
}

/// Source of the current set of reachable daemons.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Return every daemon reachable right now. Individual unreachable
    /// daemons are left out rather than failing the whole call.
    async fn discover(&self) -> Result<Vec<DaemonRecord>, DiscoveryError>;
}

/// Consecutive missed heartbeats after which a registered agent is forgotten
pub const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 3;

#[derive(Debug, Clone)]
struct Candidate {
    daemon: DaemonRecord,
    missed: u32,
}

/// Discovery over agents that registered themselves with the controller.
///
/// An agent that misses a heartbeat is left out of that cycle but stays a
/// candidate until it has missed `max_missed` heartbeats in a row. Agents
/// re-register on every beacon, so a forgotten agent that comes back is
/// relearned.
pub struct RegistrationDiscovery {
    candidates: Mutex<Vec<Candidate>>,
    transport: Arc<dyn DaemonTransport>,
    max_missed: u32,
}

impl RegistrationDiscovery {
    pub fn new(transport: Arc<dyn DaemonTransport>) -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            transport,
            max_missed: DEFAULT_MAX_MISSED_HEARTBEATS,
        }
    }

    /// Forget agents after `max_missed` consecutive missed heartbeats (minimum 1).
    pub fn with_max_missed(mut self, max_missed: u32) -> Self {
        self.max_missed = max_missed.max(1);
        self
    }

    /// Record an agent. Re-registering a nickname replaces its address but
    /// keeps its position in the list.
    pub fn register(&self, daemon: DaemonRecord) {
        let mut candidates = self.lock();
        match candidates
            .iter_mut()
            .find(|c| c.daemon.nickname == daemon.nickname)
        {
            Some(existing) if existing.daemon == daemon => {
                debug!("Daemon '{}' re-registered", daemon.nickname);
                existing.missed = 0;
            }
            Some(existing) => {
                info!(
                    "Daemon '{}' moved to {}",
                    daemon.nickname,
                    daemon.socket_addr()
                );
                *existing = Candidate { daemon, missed: 0 };
            }
            None => {
                info!(
                    "Registered daemon '{}' at {}",
                    daemon.nickname,
                    daemon.socket_addr()
                );
                candidates.push(Candidate { daemon, missed: 0 });
            }
        }
    }

    /// Every registered agent, reachable or not.
    pub fn candidates(&self) -> Vec<DaemonRecord> {
        self.lock().iter().map(|c| c.daemon.clone()).collect()
    }

    /// Apply one cycle's heartbeat results. Candidates re-registered at a new
    /// address while the heartbeat ran are left alone.
    fn record_heartbeats(&self, answered: &[DaemonRecord], missed: &[DaemonRecord]) {
        let max_missed = self.max_missed;
        let mut candidates = self.lock();
        for candidate in candidates.iter_mut() {
            if answered.contains(&candidate.daemon) {
                candidate.missed = 0;
            } else if missed.contains(&candidate.daemon) {
                candidate.missed += 1;
            }
        }
        candidates.retain(|c| {
            let keep = c.missed < max_missed;
            if !keep {
                info!(
                    "Forgetting daemon '{}' after {} missed heartbeats",
                    c.daemon.nickname, c.missed
                );
            }
            keep
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Candidate>> {
        self.candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Discovery for RegistrationDiscovery {
    async fn discover(&self) -> Result<Vec<DaemonRecord>, DiscoveryError> {
        let candidates = self.candidates();
        let mut pending = JoinSet::new();

        for (index, daemon) in candidates.into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            pending.spawn(async move {
                let result = transport.heartbeat(&daemon).await;
                (index, daemon, result)
            });
        }

        let mut alive = Vec::new();
        let mut missed = Vec::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((index, daemon, Ok(()))) => alive.push((index, daemon)),
                Ok((_, daemon, Err(e))) => {
                    debug!("Daemon '{}' did not answer: {}", daemon.nickname, e);
                    missed.push(daemon);
                }
                Err(e) => debug!("Heartbeat task aborted: {}", e),
            }
        }

        alive.sort_by_key(|(index, _)| *index);
        let alive: Vec<DaemonRecord> = alive.into_iter().map(|(_, daemon)| daemon).collect();
        self.record_heartbeats(&alive, &missed);
        Ok(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::mock::MockTransport;

    fn daemon(name: &str, last_octet: u8) -> DaemonRecord {
        DaemonRecord::new(name, [10, 0, 0, last_octet].into(), 5001)
    }

    #[test]
    fn test_register_replaces_by_nickname() {
        let discovery = RegistrationDiscovery::new(Arc::new(MockTransport::new()));
        discovery.register(daemon("a", 1));
        discovery.register(daemon("b", 2));
        discovery.register(daemon("a", 3));

        let candidates = discovery.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], daemon("a", 3));
        assert_eq!(candidates[1], daemon("b", 2));
    }

    #[tokio::test]
    async fn test_discover_omits_unreachable_and_keeps_order() {
        let transport = MockTransport::new().unreachable("b");
        let discovery = RegistrationDiscovery::new(Arc::new(transport.clone()));
        discovery.register(daemon("a", 1));
        discovery.register(daemon("b", 2));
        discovery.register(daemon("c", 3));

        let found = discovery.discover().await.unwrap();
        let names: Vec<_> = found.iter().map(|d| d.nickname.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(transport.heartbeat_count(), 3);

        // Still a candidate for the next cycle.
        assert_eq!(discovery.candidates().len(), 3);
    }

    #[tokio::test]
    async fn test_forgets_daemon_after_missed_heartbeats() {
        let transport = MockTransport::new().unreachable("b");
        let discovery =
            RegistrationDiscovery::new(Arc::new(transport.clone())).with_max_missed(2);
        discovery.register(daemon("a", 1));
        discovery.register(daemon("b", 2));

        discovery.discover().await.unwrap();
        assert_eq!(discovery.candidates().len(), 2);

        discovery.discover().await.unwrap();
        assert_eq!(discovery.candidates(), vec![daemon("a", 1)]);

        // Coming back means registering again.
        transport.set_reachable("b", true);
        discovery.register(daemon("b", 2));
        let names: Vec<_> = discovery
            .discover()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.nickname)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_answer_resets_missed_count() {
        let transport = MockTransport::new().unreachable("a");
        let discovery =
            RegistrationDiscovery::new(Arc::new(transport.clone())).with_max_missed(2);
        discovery.register(daemon("a", 1));

        discovery.discover().await.unwrap();
        transport.set_reachable("a", true);
        discovery.discover().await.unwrap();
        transport.set_reachable("a", false);
        discovery.discover().await.unwrap();

        assert_eq!(discovery.candidates(), vec![daemon("a", 1)]);
    }

    #[test]
    fn test_reregistering_resets_missed_count() {
        let discovery = RegistrationDiscovery::new(Arc::new(MockTransport::new()));
        discovery.register(daemon("a", 1));
        discovery.record_heartbeats(&[], &[daemon("a", 1)]);
        discovery.record_heartbeats(&[], &[daemon("a", 1)]);
        discovery.register(daemon("a", 1));
        discovery.record_heartbeats(&[], &[daemon("a", 1)]);

        assert_eq!(discovery.candidates(), vec![daemon("a", 1)]);
    }

    #[test]
    fn test_distinct_machines_are_kept_apart() {
        let discovery = RegistrationDiscovery::new(Arc::new(MockTransport::new()));
        let first = crate::daemon::agent::pick_nickname(Vec::new(), [10, 0, 0, 2].into());
        let second = crate::daemon::agent::pick_nickname(Vec::new(), [10, 0, 0, 3].into());
        discovery.register(DaemonRecord::new(first, [10, 0, 0, 2].into(), 5001));
        discovery.register(DaemonRecord::new(second, [10, 0, 0, 3].into(), 5001));

        assert_eq!(discovery.candidates().len(), 2);
    }

    #[tokio::test]
    async fn test_discover_with_no_candidates() {
        let discovery = RegistrationDiscovery::new(Arc::new(MockTransport::new()));
        assert!(discovery.discover().await.unwrap().is_empty());
    }
}
