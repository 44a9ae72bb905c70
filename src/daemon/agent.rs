//! Daemon agent: runs on a machine with RuneLite installed and launches
//! accounts on behalf of the controller.
//!
//! The agent serves `/heartbeat` and `/launch_account`, listens for the
//! controller's beacon, and registers itself every time it hears one so a
//! restarted controller learns about it again.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::beacon::{local_ip, BeaconListener};
use super::protocol::{DaemonRecord, StatusResponse};
use super::task::TaskHandle;
use crate::accounts::AccountRecord;
use crate::error::ErrorKind;
use crate::launcher::Launcher;
use crate::server::{find_available_port, shutdown_signal};

/// First port an agent tries to bind
pub const DEFAULT_AGENT_PORT: u16 = 5001;

/// Bound on a registration request to the controller
const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a daemon agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name shown in the controller's daemon list. Derived from the
    /// machine when `None`.
    pub nickname: Option<String>,
    /// First port to try; the next free one is used.
    pub base_port: u16,
    /// Address advertised to the controller. Detected when `None`.
    pub advertise_ip: Option<IpAddr>,
    /// Multicast group the controller's beacon is sent to.
    pub multicast_group: SocketAddrV4,
}

impl AgentConfig {
    pub fn new(nickname: Option<String>) -> Self {
        Self {
            nickname,
            base_port: DEFAULT_AGENT_PORT,
            advertise_ip: None,
            multicast_group: super::beacon::DEFAULT_MULTICAST_GROUP,
        }
    }
}

/// Nickname to use when none is configured.
///
/// Prefers the `HOSTNAME`/`COMPUTERNAME` environment, then the OS hostname.
/// Machines with no usable name are told apart by their advertised address.
pub fn default_nickname(advertise_ip: IpAddr) -> String {
    let from_env = ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok());
    let from_os = gethostname::gethostname().into_string().ok();
    pick_nickname(from_env.chain(from_os), advertise_ip)
}

/// First usable name in `names`, else `daemon-<ip>`.
pub fn pick_nickname<I>(names: I, advertise_ip: IpAddr) -> String
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty() && !name.eq_ignore_ascii_case("localhost"))
        .unwrap_or_else(|| format!("daemon-{}", advertise_ip))
}

/// State shared by the agent's handlers.
pub struct AgentState {
    pub nickname: String,
    pub launcher: Arc<dyn Launcher>,
}

/// Build the agent's router.
pub fn agent_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/heartbeat", get(heartbeat_handler))
        .route("/launch_account", post(launch_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn heartbeat_handler(State(state): State<Arc<AgentState>>) -> Json<StatusResponse> {
    debug!("Answering heartbeat");
    Json(StatusResponse::success(format!(
        "Daemon {} is alive",
        state.nickname
    )))
}

async fn launch_handler(
    State(state): State<Arc<AgentState>>,
    Json(account): Json<AccountRecord>,
) -> Json<StatusResponse> {
    if let Err(e) = account.validate() {
        warn!("Rejecting launch with incomplete account data: {}", e);
        return Json(StatusResponse::error(
            ErrorKind::ValidationError,
            format!("Incomplete account data: {}", e),
        ));
    }

    info!("Launching {} for the controller", account.display_name);
    let launcher = Arc::clone(&state.launcher);
    let result = tokio::task::spawn_blocking(move || launcher.launch(&account)).await;

    match result {
        Ok(Ok(())) => Json(StatusResponse::success("Account launched")),
        Ok(Err(e)) => {
            error!("Launch failed: {}", e);
            Json(StatusResponse::error(e.kind(), e.to_string()))
        }
        Err(e) => {
            error!("Launch task failed: {}", e);
            Json(StatusResponse::error(
                ErrorKind::LaunchError,
                "Launch task failed",
            ))
        }
    }
}

/// Send this agent's record to the controller at `server`.
pub async fn register_with(
    client: &reqwest::Client,
    server: SocketAddr,
    record: &DaemonRecord,
) -> Result<StatusResponse, reqwest::Error> {
    client
        .post(format!("http://{}/register_daemon", server))
        .timeout(REGISTER_TIMEOUT)
        .json(record)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Register with every controller whose beacon is heard.
fn start_registration(record: DaemonRecord, listener: BeaconListener) -> TaskHandle {
    TaskHandle::spawn("agent-registration", move |mut shutdown_rx| async move {
        let client = reqwest::Client::new();
        let mut last_server: Option<SocketAddr> = None;

        loop {
            let server = tokio::select! {
                next = listener.next_server() => match next {
                    Ok(server) => server,
                    Err(e) => {
                        warn!("Beacon receive failed: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
                _ = shutdown_rx.recv() => break,
            };

            match register_with(&client, server, &record).await {
                Ok(reply) if last_server != Some(server) => {
                    info!("Registered with controller at {}: {}", server, reply.message());
                    last_server = Some(server);
                }
                Ok(_) => debug!("Refreshed registration with {}", server),
                Err(e) => warn!("Failed to register with {}: {}", server, e),
            }
        }
    })
}

/// Run an agent until Ctrl+C or SIGTERM.
pub async fn run_agent(config: AgentConfig, launcher: Arc<dyn Launcher>) -> anyhow::Result<()> {
    let port = find_available_port(Ipv4Addr::UNSPECIFIED.into(), config.base_port)
        .ok_or_else(|| anyhow::anyhow!("No available port found from {}", config.base_port))?;
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let advertise_ip = config
        .advertise_ip
        .unwrap_or_else(|| local_ip(config.multicast_group));
    let nickname = config
        .nickname
        .clone()
        .unwrap_or_else(|| default_nickname(advertise_ip));
    let record = DaemonRecord::new(nickname.clone(), advertise_ip, port);

    let state = Arc::new(AgentState {
        nickname: nickname.clone(),
        launcher,
    });
    let app = agent_router(state);
    let listener = TcpListener::bind(bind_addr).await?;

    let beacon_listener = BeaconListener::bind(config.multicast_group).await?;
    let registration = start_registration(record.clone(), beacon_listener);

    info!(
        "Daemon '{}' listening on {} (advertised as {})",
        nickname,
        bind_addr,
        record.socket_addr()
    );
    println!(
        "Daemon '{}' running at http://{}",
        nickname,
        record.socket_addr()
    );
    println!("Waiting for the controller beacon on {}", config.multicast_group);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registration.stop().await;
    println!("\nDaemon stopped");
    Ok(())
}
