//! Starting RuneLite as a stored account.
//!
//! A [`Launcher`] starts the game client on this machine; the
//! [`LaunchDispatcher`] decides whether a request runs through the local
//! launcher or is forwarded to a daemon on the network.

mod dispatch;
pub mod mock;

pub use dispatch::{DispatchError, LaunchDispatcher, LaunchOutcome, LaunchTarget};

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

use crate::accounts::AccountRecord;
use crate::daemon::TransportError;
use crate::error::ErrorKind;

/// JVM flags RuneLite is started with unless overridden in config.
pub const DEFAULT_JVM_ARGS: &[&str] = &[
    "-XX:+DisableAttachMechanism",
    "-Xmx2G",
    "-Xss2m",
    "-XX:CompileThreshold=1500",
    "-Dawt.useSystemAAFontSettings=on",
    "-Dswing.aatext=true",
];

/// Error types for launch operations
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("RuneLite install path is not configured")]
    NotConfigured,

    #[error("RuneLite install is incomplete, missing {}", .0.display())]
    MissingInstall(PathBuf),

    #[error("Account data is incomplete: {0}")]
    InvalidAccount(String),

    #[error("Failed to start RuneLite: {0}")]
    Spawn(#[from] io::Error),

    #[error("Daemon not found: {0}")]
    UnknownDaemon(String),

    #[error("Daemon '{daemon}' failed to launch: {source}")]
    Remote {
        daemon: String,
        #[source]
        source: TransportError,
    },
}

impl LaunchError {
    /// Category reported to clients.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::LaunchError
    }
}

/// Result type for launch operations
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Something that can start a game client for an account on this machine.
pub trait Launcher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Start the client. Returns once the process has been spawned; the
    /// client itself is never waited on.
    fn launch(&self, account: &AccountRecord) -> LaunchResult<()>;
}

/// Launches the RuneLite jar bundled with an official RuneLite install.
#[derive(Debug, Clone)]
pub struct RuneLiteLauncher {
    install_path: Option<PathBuf>,
    jvm_args: Vec<String>,
}

impl RuneLiteLauncher {
    /// Create a launcher for the install at `install_path`.
    pub fn new(install_path: Option<PathBuf>) -> Self {
        Self {
            install_path,
            jvm_args: DEFAULT_JVM_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the JVM flags passed before `-jar`.
    pub fn with_jvm_args(mut self, jvm_args: Vec<String>) -> Self {
        self.jvm_args = jvm_args;
        self
    }

    /// Configured install directory, if any.
    pub fn install_path(&self) -> Option<&Path> {
        self.install_path.as_deref()
    }

    /// Path to the bundled JRE's java binary.
    pub fn java_path(install_path: &Path) -> PathBuf {
        let java = if cfg!(windows) { "java.exe" } else { "java" };
        install_path.join("jre").join("bin").join(java)
    }

    /// Path to the RuneLite jar.
    pub fn jar_path(install_path: &Path) -> PathBuf {
        install_path.join("RuneLite.jar")
    }

    /// Build the command that starts RuneLite as `account`.
    ///
    /// Fails without side effects if the account is incomplete or the install
    /// is missing files. Credentials are set on the child only.
    pub fn build_command(&self, account: &AccountRecord) -> LaunchResult<Command> {
        account
            .validate()
            .map_err(|e| LaunchError::InvalidAccount(e.to_string()))?;

        let install_path = self
            .install_path
            .as_deref()
            .ok_or(LaunchError::NotConfigured)?;

        let java = Self::java_path(install_path);
        if !java.is_file() {
            return Err(LaunchError::MissingInstall(java));
        }
        let jar = Self::jar_path(install_path);
        if !jar.is_file() {
            return Err(LaunchError::MissingInstall(jar));
        }

        let mut cmd = Command::new(&java);
        cmd.current_dir(install_path)
            .args(&self.jvm_args)
            .arg("-jar")
            .arg(&jar)
            .envs(account.env_vars())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Ok(cmd)
    }
}

impl Launcher for RuneLiteLauncher {
    fn name(&self) -> &'static str {
        "runelite"
    }

    fn launch(&self, account: &AccountRecord) -> LaunchResult<()> {
        let mut cmd = self.build_command(account)?;
        let mut child = cmd.spawn()?;
        info!(
            "Started RuneLite for {} (pid {})",
            account.display_name,
            child.id()
        );

        // Reap the client when it exits so it does not linger as a zombie.
        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!("RuneLite exited with {}", status),
            Err(e) => debug!("Failed to wait on RuneLite: {}", e),
        });

        Ok(())
    }
}
