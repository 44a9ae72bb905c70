//! Controller web server: the launcher page, the JSON API, and the
//! background tasks that keep the daemon list fresh.

pub mod assets;
pub mod routes;
pub mod templates;

pub use assets::{content_type, StaticAssets};
pub use routes::{build_router, AppState};
pub use templates::{IndexView, PageSettings, TemplateEngine, Templates};

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener as TokioTcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::accounts::AccountStore;
use crate::config::DEFAULT_PORT;
use crate::daemon::beacon::{self, local_ip};
use crate::daemon::client::{DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_LAUNCH_TIMEOUT};
use crate::daemon::{
    start_polling, DaemonRegistry, DaemonTransport, HttpDaemonClient, RegistrationDiscovery,
    DEFAULT_POLL_INTERVAL,
};
use crate::launcher::{LaunchDispatcher, RuneLiteLauncher, DEFAULT_JVM_ARGS};

/// Find an available port starting from the given base port.
///
/// Tries ports sequentially on `ip` until one binds.
pub fn find_available_port(ip: IpAddr, base_port: u16) -> Option<u16> {
    (base_port..=base_port.saturating_add(100)).find(|&port| TcpListener::bind((ip, port)).is_ok())
}

/// Configuration for the controller.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the web server to.
    pub bind_address: IpAddr,
    /// Base port to try binding to (defaults to 5000).
    pub base_port: u16,
    /// Directory holding `accounts.json`.
    pub data_dir: PathBuf,
    /// RuneLite install used for local launches.
    pub install_path: Option<PathBuf>,
    pub jvm_args: Vec<String>,
    /// Time between daemon heartbeat cycles and beacons.
    pub poll_interval: Duration,
    pub notification_timeout_ms: u64,
    pub launch_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub multicast_group: SocketAddrV4,
    /// Whether to open the browser automatically.
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED.into(),
            base_port: DEFAULT_PORT,
            data_dir: crate::config::default_data_dir(),
            install_path: None,
            jvm_args: DEFAULT_JVM_ARGS.iter().map(|s| s.to_string()).collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            notification_timeout_ms: crate::config::DEFAULT_NOTIFICATION_TIMEOUT_MS,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            multicast_group: beacon::DEFAULT_MULTICAST_GROUP,
            open_browser: true,
        }
    }
}

impl ServerConfig {
    fn page_settings(&self) -> PageSettings {
        PageSettings {
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            notification_timeout_ms: self.notification_timeout_ms,
        }
    }
}

/// Wire the controller's components together.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let accounts = Arc::new(AccountStore::open_in(&config.data_dir)?);

    let transport: Arc<dyn DaemonTransport> = Arc::new(HttpDaemonClient::new(
        config.heartbeat_timeout,
        config.launch_timeout,
    ));
    let registrations = Arc::new(RegistrationDiscovery::new(Arc::clone(&transport)));
    let daemons = Arc::new(DaemonRegistry::new(registrations.clone()));

    if config.install_path.is_none() {
        warn!("No RuneLite install path configured; local launches will fail");
    }
    let local = Arc::new(
        RuneLiteLauncher::new(config.install_path.clone()).with_jvm_args(config.jvm_args.clone()),
    );
    let dispatcher = Arc::new(LaunchDispatcher::new(
        Arc::clone(&accounts),
        Arc::clone(&daemons),
        local,
        transport,
    ));

    Ok(Arc::new(AppState {
        accounts,
        daemons,
        registrations,
        dispatcher,
        template_engine: TemplateEngine::new()?,
        settings: config.page_settings(),
    }))
}

/// Run the controller.
///
/// This function will:
/// 1. Find an available port starting from `config.base_port`
/// 2. Start the daemon poller and the multicast beacon
/// 3. Start the axum server and optionally open the browser
/// 4. Wait for Ctrl+C or SIGTERM, then stop the background tasks
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let port = find_available_port(config.bind_address, config.base_port)
        .ok_or_else(|| anyhow::anyhow!("No available port found from {}", config.base_port))?;
    if port != config.base_port {
        warn!("Port {} is busy, using {}", config.base_port, port);
    }

    let addr = SocketAddr::new(config.bind_address, port);
    let advertised = SocketAddr::new(local_ip(config.multicast_group), port);
    let url = format!("http://127.0.0.1:{}", port);

    let state = build_state(&config)?;
    let poller = start_polling(Arc::clone(&state.daemons), config.poll_interval);
    let beacon_task = match beacon::start_beacon(advertised, config.multicast_group, config.poll_interval)
        .await
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Beacon disabled, agents will not find this controller: {}", e);
            None
        }
    };

    let app = build_router(state);
    let listener = TokioTcpListener::bind(addr).await?;

    info!("Controller listening on {} (advertised as {})", addr, advertised);
    println!("Server running at: {}", url);
    println!("Press Ctrl+C to stop");

    if config.open_browser {
        if let Err(e) = webbrowser::open(&url) {
            eprintln!("Failed to open browser: {}", e);
        }
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    poller.stop().await;
    if let Some(beacon_task) = beacon_task {
        beacon_task.stop().await;
    }

    served?;
    println!("\nServer stopped");
    Ok(())
}

/// Wait for the shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
