//! Structured logging for jxlaunch.
//!
//! stderr output follows the chosen verbosity; an optional log file always
//! records debug detail so a misbehaving launch or daemon can be diagnosed
//! after the fact. `RUST_LOG` overrides both.

use std::path::Path;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    /// Normal logging (info level)
    #[default]
    Normal,
    /// Verbose logging (debug level)
    Verbose,
    /// Very verbose logging (trace level)
    Trace,
}

impl Verbosity {
    /// Get the tracing level filter for this verbosity.
    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::ERROR,
            Verbosity::Normal => LevelFilter::INFO,
            Verbosity::Verbose => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }

    /// Resolve command line flags against the configured level.
    ///
    /// `--quiet` wins, then any `-v`, then the config file, then Normal.
    pub fn from_flags(verbose: u8, quiet: bool, configured: Option<&str>) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        match verbose {
            0 => configured
                .and_then(|level| level.parse().ok())
                .unwrap_or_default(),
            1 => Verbosity::Verbose,
            _ => Verbosity::Trace,
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "quiet" => Ok(Verbosity::Quiet),
            "warn" | "warning" | "info" | "normal" => Ok(Verbosity::Normal),
            "debug" | "verbose" => Ok(Verbosity::Verbose),
            "trace" => Ok(Verbosity::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Verbosity level for stderr output.
    pub verbosity: Verbosity,
    /// Optional path to log file.
    pub log_file: Option<String>,
}

/// Guard that must be kept alive for the duration of logging.
///
/// When this guard is dropped, the logging system will flush pending logs.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system.
///
/// Returns a guard that must be kept alive for the duration of logging.
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let stderr_level = config.verbosity.as_level_filter();
    let default_level = if config.log_file.is_some() {
        stderr_level.max(LevelFilter::DEBUG)
    } else {
        stderr_level
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let (file_layer, file_guard) = if let Some(ref log_file_path) = config.log_file {
        let path = Path::new(log_file_path);
        let parent_dir = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("jxlaunch.log");

        let file_appender = tracing_appender::rolling::never(parent_dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking)
            .with_filter(LevelFilter::DEBUG);

        (Some(file_layer), Some(guard))
    } else {
        (None, None)
    };

    let stderr_layer = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_writer(std::io::stderr)
        .with_filter(stderr_level);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    LogGuard {
        _file_guard: file_guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_verbosity_as_level_filter() {
        assert_eq!(Verbosity::Quiet.as_level_filter(), LevelFilter::ERROR);
        assert_eq!(Verbosity::Normal.as_level_filter(), LevelFilter::INFO);
        assert_eq!(Verbosity::Verbose.as_level_filter(), LevelFilter::DEBUG);
        assert_eq!(Verbosity::Trace.as_level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn test_from_flags_precedence() {
        assert_eq!(Verbosity::from_flags(2, true, Some("trace")), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(1, false, Some("error")), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(3, false, None), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(0, false, Some("debug")), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(0, false, Some("bogus")), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(0, false, None), Verbosity::Normal);
    }

    #[test]
    fn test_parse_level_names() {
        assert_eq!("INFO".parse::<Verbosity>(), Ok(Verbosity::Normal));
        assert_eq!("error".parse::<Verbosity>(), Ok(Verbosity::Quiet));
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert!(config.log_file.is_none());
    }
}
