//! Configuration management for jxlaunch
//!
//! Handles loading and saving configuration from ~/.config/jxlaunch/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::daemon::beacon::DEFAULT_MULTICAST_GROUP;
use crate::launcher::DEFAULT_JVM_ARGS;

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Application name for config and data directories
pub const APP_NAME: &str = "jxlaunch";

/// Default controller port
pub const DEFAULT_PORT: u16 = 5000;

/// Default notification lifetime on the page, in milliseconds
pub const DEFAULT_NOTIFICATION_TIMEOUT_MS: u64 = 3000;

/// Keys accepted by `jxlaunch config set`
pub const CONFIG_KEYS: &[&str] = &[
    "port",
    "bind_address",
    "data_dir",
    "runelite_install_path",
    "jvm_args",
    "poll_interval_secs",
    "notification_timeout_ms",
    "launch_timeout_secs",
    "heartbeat_timeout_secs",
    "multicast_group",
    "multicast_port",
    "daemon_nickname",
    "log_level",
];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration
///
/// Every field is optional; the `effective_*` accessors apply defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Port the controller listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Interface the controller binds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<IpAddr>,

    /// Directory holding accounts.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// RuneLite install directory (contains RuneLite.jar and jre/)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runelite_install_path: Option<PathBuf>,

    /// JVM flags passed before `-jar`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_args: Option<Vec<String>>,

    /// Seconds between daemon discovery cycles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,

    /// How long page notifications stay visible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_timeout_ms: Option<u64>,

    /// Bound on a forwarded launch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_timeout_secs: Option<u64>,

    /// Bound on a daemon heartbeat request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout_secs: Option<u64>,

    /// Multicast group for the controller beacon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_group: Option<Ipv4Addr>,

    /// Multicast port for the controller beacon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_port: Option<u16>,

    /// Name this machine uses when running as a daemon agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_nickname: Option<String>,

    /// Default log level when no -v/--quiet flag is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the config file path
    ///
    /// Returns ~/.config/jxlaunch/config.toml on Linux
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Get the config directory path
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME))
    }

    /// Load configuration from the default file
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, defaulting if it doesn't exist
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default file
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check if any configuration is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set a key from its string form, as given on the command line
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T>
        where
            T::Err: std::fmt::Display,
        {
            value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        }

        match key {
            "port" => self.port = Some(parse(key, value)?),
            "bind_address" => self.bind_address = Some(parse(key, value)?),
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "runelite_install_path" => self.runelite_install_path = Some(PathBuf::from(value)),
            "jvm_args" => {
                self.jvm_args = Some(value.split_whitespace().map(str::to_string).collect())
            }
            "poll_interval_secs" => {
                let secs: u64 = parse(key, value)?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                self.poll_interval_secs = Some(secs);
            }
            "notification_timeout_ms" => self.notification_timeout_ms = Some(parse(key, value)?),
            "launch_timeout_secs" => self.launch_timeout_secs = Some(parse(key, value)?),
            "heartbeat_timeout_secs" => self.heartbeat_timeout_secs = Some(parse(key, value)?),
            "multicast_group" => {
                let group: Ipv4Addr = parse(key, value)?;
                if !group.is_multicast() {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("{} is not a multicast address", group),
                    });
                }
                self.multicast_group = Some(group);
            }
            "multicast_port" => self.multicast_port = Some(parse(key, value)?),
            "daemon_nickname" => self.daemon_nickname = Some(value.to_string()),
            "log_level" => self.log_level = Some(value.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Get effective port (CLI argument, then config, then default)
    pub fn effective_port(&self, cli_port: Option<u16>) -> u16 {
        cli_port.or(self.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn effective_bind_address(&self) -> IpAddr {
        self.bind_address
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// Get effective data directory (CLI argument, then config, then default)
    pub fn effective_data_dir(&self, cli_dir: Option<PathBuf>) -> PathBuf {
        cli_dir
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(default_data_dir)
    }

    pub fn effective_install_path(&self, cli_path: Option<PathBuf>) -> Option<PathBuf> {
        cli_path.or_else(|| self.runelite_install_path.clone())
    }

    pub fn effective_jvm_args(&self) -> Vec<String> {
        self.jvm_args
            .clone()
            .unwrap_or_else(|| DEFAULT_JVM_ARGS.iter().map(|s| s.to_string()).collect())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(5).max(1))
    }

    pub fn notification_timeout_ms(&self) -> u64 {
        self.notification_timeout_ms
            .unwrap_or(DEFAULT_NOTIFICATION_TIMEOUT_MS)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs.unwrap_or(5))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.unwrap_or(5))
    }

    pub fn multicast_group(&self) -> SocketAddrV4 {
        SocketAddrV4::new(
            self.multicast_group
                .unwrap_or(*DEFAULT_MULTICAST_GROUP.ip()),
            self.multicast_port
                .unwrap_or(DEFAULT_MULTICAST_GROUP.port()),
        )
    }
}

/// Default data directory (~/.local/share/jxlaunch on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Format the configuration for display
pub fn format_config(config: &Config) -> String {
    fn line<T: std::fmt::Display>(name: &str, value: Option<T>, default: &str) -> String {
        match value {
            Some(v) => format!("  {} = {}", name, v),
            None => format!("  {} = (not set, using {})", name, default),
        }
    }

    let mut lines = vec!["Current configuration:".to_string(), String::new()];

    lines.push(line("port", config.port, &DEFAULT_PORT.to_string()));
    lines.push(line("bind_address", config.bind_address, "0.0.0.0"));
    lines.push(line(
        "data_dir",
        config.data_dir.as_ref().map(|p| p.display()),
        &default_data_dir().display().to_string(),
    ));
    lines.push(match config.runelite_install_path {
        Some(ref path) => format!("  runelite_install_path = {}", path.display()),
        None => "  runelite_install_path = (not set, local launches disabled)".to_string(),
    });
    lines.push(line(
        "jvm_args",
        config.jvm_args.as_ref().map(|args| args.join(" ")),
        "RuneLite defaults",
    ));
    lines.push(line("poll_interval_secs", config.poll_interval_secs, "5"));
    lines.push(line(
        "notification_timeout_ms",
        config.notification_timeout_ms,
        &DEFAULT_NOTIFICATION_TIMEOUT_MS.to_string(),
    ));
    lines.push(line("launch_timeout_secs", config.launch_timeout_secs, "5"));
    lines.push(line("heartbeat_timeout_secs", config.heartbeat_timeout_secs, "5"));
    lines.push(line(
        "multicast_group",
        config.multicast_group,
        &DEFAULT_MULTICAST_GROUP.ip().to_string(),
    ));
    lines.push(line(
        "multicast_port",
        config.multicast_port,
        &DEFAULT_MULTICAST_GROUP.port().to_string(),
    ));
    lines.push(line(
        "daemon_nickname",
        config.daemon_nickname.as_deref(),
        "hostname",
    ));
    lines.push(line("log_level", config.log_level.as_deref(), "info"));

    lines.join("\n")
}
