//! HTTP client the controller uses to reach daemon agents.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::protocol::{DaemonRecord, StatusResponse};
use crate::accounts::AccountRecord;

/// Default bound on a forwarded launch request
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a heartbeat request
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors talking to a daemon agent
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("daemon unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("daemon rejected the request: {0}")]
    Rejected(String),

    #[error("invalid response from daemon: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::InvalidResponse(e.to_string())
        } else {
            TransportError::Unreachable(e.to_string())
        }
    }
}

/// Requests the controller sends to daemon agents.
#[async_trait]
pub trait DaemonTransport: Send + Sync {
    /// Check that the agent is alive.
    async fn heartbeat(&self, daemon: &DaemonRecord) -> Result<(), TransportError>;

    /// Ask the agent to start RuneLite as `account`. Returns the agent's
    /// message on success.
    async fn launch(
        &self,
        daemon: &DaemonRecord,
        account: &AccountRecord,
    ) -> Result<String, TransportError>;
}

/// [`DaemonTransport`] over HTTP with bounded waits.
#[derive(Debug, Clone)]
pub struct HttpDaemonClient {
    client: reqwest::Client,
    heartbeat_timeout: Duration,
    launch_timeout: Duration,
}

impl HttpDaemonClient {
    pub fn new(heartbeat_timeout: Duration, launch_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            heartbeat_timeout,
            launch_timeout,
        }
    }

    /// Turn a reply into the agent's message or a rejection.
    async fn read_reply(response: reqwest::Response) -> Result<String, TransportError> {
        let http_status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<StatusResponse>(&body) {
            Ok(reply) if http_status.is_success() && reply.is_success() => {
                Ok(reply.message().to_string())
            }
            Ok(reply) => {
                let message = if reply.message().is_empty() {
                    format!("HTTP {}", http_status)
                } else {
                    reply.message().to_string()
                };
                Err(TransportError::Rejected(message))
            }
            Err(_) if !http_status.is_success() => {
                Err(TransportError::Rejected(format!("HTTP {}", http_status)))
            }
            Err(e) => Err(TransportError::InvalidResponse(e.to_string())),
        }
    }
}

impl Default for HttpDaemonClient {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_LAUNCH_TIMEOUT)
    }
}

#[async_trait]
impl DaemonTransport for HttpDaemonClient {
    async fn heartbeat(&self, daemon: &DaemonRecord) -> Result<(), TransportError> {
        let url = format!("{}/heartbeat", daemon.base_url());
        let response = self
            .client
            .get(&url)
            .timeout(self.heartbeat_timeout)
            .send()
            .await?;
        Self::read_reply(response).await.map(|_| ())
    }

    async fn launch(
        &self,
        daemon: &DaemonRecord,
        account: &AccountRecord,
    ) -> Result<String, TransportError> {
        let url = format!("{}/launch_account", daemon.base_url());
        debug!(
            "Forwarding launch of {} to {}",
            account.display_name, url
        );
        let response = self
            .client
            .post(&url)
            .timeout(self.launch_timeout)
            .json(account)
            .send()
            .await?;
        Self::read_reply(response).await
    }
}
