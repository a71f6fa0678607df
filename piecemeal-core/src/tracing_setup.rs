//! Tracing setup for Piecemeal binaries
//!
//! Console output at the user's chosen level plus a full trace log on disk,
//! so stalled or cancelled reads can be diagnosed after the fact.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the per-run log file inside the logs directory.
pub const LOG_FILE_NAME: &str = "piecemeal-last-run.log";

/// Filter for the log file: every reader transition and priority change,
/// but only `info` from the HTTP stack underneath.
pub const FILE_LOG_DIRECTIVES: &str =
    "info,piecemeal=trace,piecemeal_core=trace,piecemeal_web=trace";

/// Installs the console and file subscribers and returns the log file path.
///
/// `RUST_LOG` takes precedence over `console_level` for the console layer.
/// The log file lives in `logs_dir` (default `./logs`) and is truncated on
/// every run.
///
/// # Errors
///
/// - `std::io::Error` - If the logs directory or log file cannot be created
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, std::io::Error> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.as_str()));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(FILE_LOG_DIRECTIVES));

    // A second init in the same process (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::debug!(
        "Logging to console at {} and to {}",
        console_level,
        log_file_path.display()
    );

    Ok(log_file_path)
}

/// Console verbosity selectable with `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    /// Stalled and failed reads
    Warn,
    /// One line per served request and registered torrent
    Info,
    /// Reader waits and their outcome
    Debug,
    /// Every state transition and piece priority change
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use piecemeal_core::tracing_setup::CliLogLevel;
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

    /// Name accepted on the command line and by `EnvFilter`.
    pub fn as_str(self) -> &'static str {
        match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_log_file_is_truncated_each_run() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(LOG_FILE_NAME);
        std::fs::write(&stale, "read of file 1 stalled on pieces [3]\n").unwrap();

        let path = init_tracing(Level::WARN, Some(dir.path())).unwrap();

        assert_eq!(path, stale);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stalled on pieces"));
    }

    #[test]
    fn test_missing_logs_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("serve").join("logs");

        let path = init_tracing(Level::INFO, Some(&nested)).unwrap();

        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }

    #[test]
    fn test_file_directives_parse() {
        assert!(EnvFilter::try_new(FILE_LOG_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_cli_level_names_match_tracing() {
        for level in CliLogLevel::value_variants() {
            assert_eq!(
                level.to_string(),
                level.as_tracing_level().to_string().to_lowercase()
            );
            assert_eq!(CliLogLevel::from_str(level.as_str(), false), Ok(*level));
        }
        assert_eq!(
            CliLogLevel::from_str("TRACE", true),
            Ok(CliLogLevel::Trace)
        );
        assert!(CliLogLevel::from_str("verbose", true).is_err());
    }
}
