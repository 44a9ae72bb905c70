//! Error classification shared across the store, registry and launcher.
//!
//! Each module owns its own `thiserror` enum; this module only defines the
//! coarse [`ErrorKind`] that the HTTP layer reports back to the page.

use serde::{Deserialize, Serialize};

/// Coarse error category reported to clients alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required field was missing or empty.
    ValidationError,
    /// A nickname collided with an existing account.
    DuplicateKey,
    /// An account nickname was not found.
    NotFound,
    /// The account file could not be written.
    PersistenceError,
    /// Daemon discovery failed as a whole.
    DiscoveryError,
    /// A local or remote launch failed.
    LaunchError,
}

impl ErrorKind {
    /// Stable identifier used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PersistenceError => "persistence_error",
            ErrorKind::DiscoveryError => "discovery_error",
            ErrorKind::LaunchError => "launch_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
