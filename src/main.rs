use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jxlaunch::accounts::AccountStore;
use jxlaunch::config::{format_config, Config, CONFIG_KEYS};
use jxlaunch::daemon::agent::{run_agent, AgentConfig};
use jxlaunch::daemon::StatusResponse;
use jxlaunch::launcher::{LaunchDispatcher, LaunchTarget, RuneLiteLauncher};
use jxlaunch::logging::{init_logging, LogConfig, Verbosity};
use jxlaunch::server::{run_server, ServerConfig};

#[derive(Parser)]
#[command(name = "jxlaunch")]
#[command(version)]
#[command(about = "Launch Jagex accounts in RuneLite, locally or on LAN daemons")]
#[command(
    long_about = "Stores Jagex account credentials and starts pre-authenticated RuneLite clients, either on this machine or on daemon agents discovered across the local network. Manage accounts from the web page served by `jxlaunch serve`."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write debug logs to this file
    #[arg(long, global = true)]
    log_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller: web page, account API, and daemon discovery
    Serve {
        /// Port to start the server on (default: 5000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding accounts.json
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// RuneLite install directory used for local launches
        #[arg(long)]
        install_path: Option<PathBuf>,

        /// Don't open browser automatically
        #[arg(long)]
        no_browser: bool,
    },
    /// Run a daemon agent that launches accounts for a controller
    Agent {
        /// Name shown in the controller's daemon list
        #[arg(short, long)]
        nickname: Option<String>,

        /// First port to try (default: 5001)
        #[arg(short, long)]
        port: Option<u16>,

        /// RuneLite install directory on this machine
        #[arg(long)]
        install_path: Option<PathBuf>,
    },
    /// Inspect stored accounts
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
    /// Launch a stored account once
    Launch {
        /// Account nickname
        nickname: String,

        /// Daemon to launch on, via the running controller
        #[arg(short, long)]
        daemon: Option<String>,

        /// Directory holding accounts.json
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// RuneLite install directory used for local launches
        #[arg(long)]
        install_path: Option<PathBuf>,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AccountsAction {
    /// List nicknames and display names
    List {
        /// Directory holding accounts.json
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Set a configuration value
    Set {
        /// One of the keys shown by `config show`
        key: String,
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    let _log_guard = init_logging(&LogConfig {
        verbosity: Verbosity::from_flags(cli.verbose, cli.quiet, config.log_level.as_deref()),
        log_file: cli.log_file.clone(),
    });

    match cli.command {
        Commands::Serve {
            port,
            data_dir,
            install_path,
            no_browser,
        } => {
            let server_config = ServerConfig {
                bind_address: config.effective_bind_address(),
                base_port: config.effective_port(port),
                data_dir: config.effective_data_dir(data_dir),
                install_path: config.effective_install_path(install_path),
                jvm_args: config.effective_jvm_args(),
                poll_interval: config.poll_interval(),
                notification_timeout_ms: config.notification_timeout_ms(),
                launch_timeout: config.launch_timeout(),
                heartbeat_timeout: config.heartbeat_timeout(),
                multicast_group: config.multicast_group(),
                open_browser: !no_browser,
            };

            run_server(server_config).await?;
        }
        Commands::Agent {
            nickname,
            port,
            install_path,
        } => {
            let mut agent_config =
                AgentConfig::new(nickname.or_else(|| config.daemon_nickname.clone()));
            agent_config.multicast_group = config.multicast_group();
            if let Some(port) = port {
                agent_config.base_port = port;
            }

            let launcher = RuneLiteLauncher::new(config.effective_install_path(install_path))
                .with_jvm_args(config.effective_jvm_args());
            if launcher.install_path().is_none() {
                anyhow::bail!(
                    "No RuneLite install path set. Pass --install-path or run `jxlaunch config set runelite_install_path <dir>`"
                );
            }

            run_agent(agent_config, Arc::new(launcher)).await?;
        }
        Commands::Accounts {
            action: AccountsAction::List { data_dir },
        } => {
            let store = AccountStore::open_in(&config.effective_data_dir(data_dir))
                .context("Failed to open account store")?;
            let accounts = store.list();
            if accounts.is_empty() {
                println!("No accounts stored in {}", store.path().display());
            }
            for (nickname, record) in &accounts {
                println!("{:<20} {}", nickname, record.display_name);
            }
        }
        Commands::Launch {
            nickname,
            daemon,
            data_dir,
            install_path,
        } => match LaunchTarget::from_daemon_nickname(daemon.as_deref()) {
            LaunchTarget::Local => {
                let store = AccountStore::open_in(&config.effective_data_dir(data_dir))
                    .context("Failed to open account store")?;
                let launcher = RuneLiteLauncher::new(config.effective_install_path(install_path))
                    .with_jvm_args(config.effective_jvm_args());

                let dispatcher = LaunchDispatcher::local_only(Arc::new(store), Arc::new(launcher));
                let outcome = dispatcher
                    .launch(nickname.trim(), None)
                    .await
                    .with_context(|| format!("Failed to launch '{}'", nickname))?;
                println!("{}", outcome.message);
            }
            LaunchTarget::Daemon(daemon) => {
                let reply = launch_via_controller(&config, &nickname, &daemon).await?;
                if !reply.is_success() {
                    anyhow::bail!("{}", reply.message());
                }
                println!("{}", reply.message());
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", format_config(&config));
                println!();
                println!("Config file: {}", Config::config_path()?.display());
            }
            ConfigAction::Set { key, value } => {
                let mut config = config;
                config.set_value(&key, &value).with_context(|| {
                    format!("Valid keys: {}", CONFIG_KEYS.join(", "))
                })?;
                config.save().context("Failed to save configuration")?;
                println!("Set {} = {}", key, value);
            }
        },
    }

    Ok(())
}

/// Ask the running controller to forward a launch to `daemon`.
async fn launch_via_controller(
    config: &Config,
    nickname: &str,
    daemon: &str,
) -> Result<StatusResponse> {
    let url = format!(
        "http://127.0.0.1:{}/launch_account",
        config.effective_port(None)
    );
    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .timeout(config.launch_timeout() + Duration::from_secs(1))
        .json(&serde_json::json!({
            "account_id": nickname,
            "daemon_nickname": daemon,
        }))
        .send()
        .await
        .with_context(|| format!("Could not reach the controller at {}", url))?;

    response
        .json()
        .await
        .context("Controller sent an unexpected reply")
}
