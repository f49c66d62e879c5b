//! Tracing setup for Mapfetch
//!
//! The console gets the level picked on the command line, on stderr so that
//! search listings and download progress on stdout stay readable. A second
//! layer records the whole last run to a file.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::{MapfetchError, Result};

const LOG_FILE: &str = "mapfetch-last-run.log";

/// Overrides the console filter when set, using `EnvFilter` directive syntax.
const LOG_ENV: &str = "MAPFETCH_LOG";

/// HTTP stack crates that are only interesting when something breaks.
const QUIET_CRATES: [&str; 4] = ["hyper", "hyper_util", "reqwest", "h2"];

/// Everything from our own crates, debug and up from dependencies.
const FILE_DIRECTIVES: &str = "debug,mapfetch=trace,mapfetch_core=trace,mapfetch_search=trace";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber and returns the path of the run log.
///
/// The log lives at `logs/mapfetch-last-run.log` unless `logs_dir` is given
/// and is truncated on every run.
///
/// # Errors
/// - `MapfetchError::Io` - Logs directory or file could not be created
/// - `MapfetchError::Configuration` - A global subscriber is already installed
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<PathBuf> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE);
    let log_file = File::create(&log_file_path)?;

    tracing_subscriber::registry()
        .with(vec![console_layer(console_level), file_layer(log_file)])
        .try_init()
        .map_err(|e| MapfetchError::Configuration {
            reason: format!("logging already initialized: {e}"),
        })?;

    tracing::debug!("Writing run log to {}", log_file_path.display());
    Ok(log_file_path)
}

fn console_layer(level: Level) -> BoxedLayer {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| console_filter(level));
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(filter)
        .boxed()
}

fn file_layer(file: File) -> BoxedLayer {
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES))
        .boxed()
}

/// Console filter: `level` for everything, but never chattier than warn for
/// the HTTP stack.
fn console_filter(level: Level) -> EnvFilter {
    EnvFilter::new(console_directives(level))
}

fn console_directives(level: Level) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    for krate in QUIET_CRATES {
        directives.push_str(&format!(",{krate}=warn"));
    }
    directives
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only errors
    Error,
    /// Failed probes, timeouts and errors
    Warn,
    /// Search and download milestones
    Info,
    /// Per-probe and per-phase detail
    Debug,
    /// Everything
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use mapfetch_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(CliLogLevel::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }

    #[test]
    fn test_display_matches_cli_spelling() {
        for level in CliLogLevel::value_variants() {
            let parsed = CliLogLevel::from_str(&level.to_string(), false).unwrap();
            assert_eq!(parsed, *level);
        }
        assert_eq!(CliLogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_console_directives_quiet_http_stack() {
        let directives = console_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("reqwest=warn"));
        assert!(directives.contains("hyper=warn"));
    }

    #[test]
    fn test_second_init_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let first = init_tracing(Level::WARN, Some(dir.path()));
        if let Ok(path) = &first {
            assert!(path.exists());
        }

        let second = init_tracing(Level::WARN, Some(dir.path()));
        assert!(matches!(second, Err(MapfetchError::Configuration { .. })));
    }
}
