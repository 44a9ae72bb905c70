//! Daemon agents and the controller's view of them.
//!
//! A daemon is a `jxlaunch agent` process on another machine. The controller
//! keeps a [`DaemonRegistry`] of the agents that answered the last heartbeat
//! cycle and forwards launches to them over HTTP.

pub mod agent;
pub mod beacon;
pub mod client;
pub mod discovery;
pub mod mock;
pub mod poller;
pub mod protocol;
pub mod registry;
pub mod task;

pub use client::{DaemonTransport, HttpDaemonClient, TransportError};
pub use discovery::{Discovery, DiscoveryError, RegistrationDiscovery};
pub use poller::{start_polling, DEFAULT_POLL_INTERVAL};
pub use protocol::{DaemonRecord, Status, StatusResponse};
pub use registry::DaemonRegistry;
pub use task::TaskHandle;
