//! Mock launcher for testing.
//!
//! Records every account it is asked to start instead of spawning RuneLite,
//! and can be told to fail so error paths can be exercised.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;

use super::{LaunchError, LaunchResult, Launcher};
use crate::accounts::AccountRecord;

/// Launcher that records launches without starting a process.
///
/// Clones share the same call log, so a test can keep one clone and hand
/// the other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    launches: Arc<Mutex<Vec<AccountRecord>>>,
    threads: Arc<Mutex<Vec<ThreadId>>>,
    failure: Option<String>,
}

impl MockLauncher {
    /// Create a launcher that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a launcher whose every launch fails with a spawn error
    /// carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Accounts launched so far, in order.
    pub fn launches(&self) -> Vec<AccountRecord> {
        self.log().clone()
    }

    /// Number of successful launches.
    pub fn launch_count(&self) -> usize {
        self.log().len()
    }

    /// Threads that successful launches ran on.
    pub fn launch_threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<AccountRecord>> {
        self.launches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Launcher for MockLauncher {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn launch(&self, account: &AccountRecord) -> LaunchResult<()> {
        if let Some(ref message) = self.failure {
            return Err(LaunchError::Spawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                message.clone(),
            )));
        }
        self.log().push(account.clone());
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(std::thread::current().id());
        Ok(())
    }
}
