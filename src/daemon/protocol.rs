//! Wire types shared by the controller and daemon agents.
//!
//! Everything is JSON over HTTP. Launch requests carry an
//! [`AccountRecord`](crate::accounts::AccountRecord) body unchanged.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::error::ErrorKind;

/// Network location of a daemon agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaemonRecord {
    pub nickname: String,
    pub ip_address: IpAddr,
    pub port: u16,
}

impl DaemonRecord {
    pub fn new(nickname: impl Into<String>, ip_address: IpAddr, port: u16) -> Self {
        Self {
            nickname: nickname.into(),
            ip_address,
            port,
        }
    }

    /// Socket address of the agent's HTTP server.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }

    /// `http://ip:port` base for requests to this agent.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.socket_addr())
    }
}

/// Outcome field of every JSON reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// `{status, message?, kind?}` reply body used by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: Some(message.into()),
            kind: None,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Message text, or an empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}
