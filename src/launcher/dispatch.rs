//! Routing a launch request to the local launcher or a daemon.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{LaunchError, Launcher};
use crate::accounts::AccountStore;
use crate::daemon::{DaemonRegistry, DaemonTransport, HttpDaemonClient, RegistrationDiscovery};
use crate::error::ErrorKind;

/// Daemon nickname that explicitly selects this machine.
pub const LOCAL_TARGET: &str = "local";

/// Errors from a dispatched launch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Account '{0}' not found")]
    AccountNotFound(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl DispatchError {
    /// Category reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::AccountNotFound(_) => ErrorKind::NotFound,
            DispatchError::Launch(e) => e.kind(),
        }
    }
}

/// Where a launch should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// This machine.
    Local,
    /// The daemon registered under this nickname.
    Daemon(String),
}

impl LaunchTarget {
    /// Interpret the optional daemon nickname from a request.
    ///
    /// Missing, blank, or `"local"` (any case) all select this machine.
    pub fn from_daemon_nickname(daemon_nickname: Option<&str>) -> Self {
        match daemon_nickname.map(str::trim) {
            None | Some("") => LaunchTarget::Local,
            Some(name) if name.eq_ignore_ascii_case(LOCAL_TARGET) => LaunchTarget::Local,
            Some(name) => LaunchTarget::Daemon(name.to_string()),
        }
    }
}

impl std::fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchTarget::Local => f.write_str("this machine"),
            LaunchTarget::Daemon(name) => write!(f, "daemon '{}'", name),
        }
    }
}

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub target: LaunchTarget,
    pub message: String,
}

/// Resolves an account and starts it locally or on a daemon.
///
/// A single attempt is made per call; there is no retry.
pub struct LaunchDispatcher {
    accounts: Arc<AccountStore>,
    daemons: Arc<DaemonRegistry>,
    local: Arc<dyn Launcher>,
    transport: Arc<dyn DaemonTransport>,
}

impl LaunchDispatcher {
    pub fn new(
        accounts: Arc<AccountStore>,
        daemons: Arc<DaemonRegistry>,
        local: Arc<dyn Launcher>,
        transport: Arc<dyn DaemonTransport>,
    ) -> Self {
        Self {
            accounts,
            daemons,
            local,
            transport,
        }
    }

    /// Dispatcher for one-shot launches outside the controller.
    ///
    /// No daemons are known, so only local targets can succeed.
    pub fn local_only(accounts: Arc<AccountStore>, local: Arc<dyn Launcher>) -> Self {
        let transport: Arc<dyn DaemonTransport> = Arc::new(HttpDaemonClient::default());
        let discovery = RegistrationDiscovery::new(Arc::clone(&transport));
        let daemons = Arc::new(DaemonRegistry::new(Arc::new(discovery)));
        Self::new(accounts, daemons, local, transport)
    }

    /// Launch the account stored under `nickname`.
    pub async fn launch(
        &self,
        nickname: &str,
        daemon_nickname: Option<&str>,
    ) -> Result<LaunchOutcome, DispatchError> {
        let account = self
            .accounts
            .get(nickname)
            .ok_or_else(|| DispatchError::AccountNotFound(nickname.to_string()))?;

        let target = LaunchTarget::from_daemon_nickname(daemon_nickname);
        info!("Launching account '{}' on {}", nickname, target);

        match target {
            LaunchTarget::Local => {
                debug!("Using local launcher '{}'", self.local.name());
                let local = Arc::clone(&self.local);
                let spawned = account.clone();
                tokio::task::spawn_blocking(move || local.launch(&spawned))
                    .await
                    .map_err(|e| {
                        LaunchError::Spawn(io::Error::new(
                            io::ErrorKind::Other,
                            format!("launch task failed: {}", e),
                        ))
                    })??;
                Ok(LaunchOutcome {
                    message: format!("Launched {} on this machine", account.display_name),
                    target: LaunchTarget::Local,
                })
            }
            LaunchTarget::Daemon(daemon_name) => {
                let daemon = self
                    .daemons
                    .find(&daemon_name)
                    .ok_or_else(|| LaunchError::UnknownDaemon(daemon_name.clone()))?;

                let reply = self
                    .transport
                    .launch(&daemon, &account)
                    .await
                    .map_err(|source| {
                        warn!("Daemon '{}' did not launch: {}", daemon_name, source);
                        LaunchError::Remote {
                            daemon: daemon_name.clone(),
                            source,
                        }
                    })?;
                debug!("Daemon '{}' replied: {}", daemon_name, reply);

                Ok(LaunchOutcome {
                    message: format!("Launched {} on {}", account.display_name, daemon_name),
                    target: LaunchTarget::Daemon(daemon_name),
                })
            }
        }
    }
}
