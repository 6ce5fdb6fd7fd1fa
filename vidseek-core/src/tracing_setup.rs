//! Logging setup shared by the server and the CLI
//!
//! The console follows the level picked on the command line, or `RUST_LOG`
//! when set. A debug log of the last run always goes to disk: per-source
//! fetch failures are logged rather than surfaced, so that file is where a
//! slow or broken upstream shows up after the fact.

use std::fmt;
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt as layer_fmt};

const LOG_FILE_NAME: &str = "vidseek-last-run.log";

/// HTTP plumbing that floods debug output with connection chatter.
const QUIET_TARGETS: [&str; 4] = ["hyper", "hyper_util", "h2", "reqwest"];

/// Filter directives for `level`, with HTTP plumbing capped at `warn`.
pub fn filter_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_lowercase()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// Installs the console and file subscribers and returns the log file path.
///
/// The file lives at `<logs_dir>/vidseek-last-run.log` (default `./logs`)
/// and is truncated on every run.
///
/// # Errors
///
/// - `std::io::Error` - If the log directory or file cannot be created, or a
///   global subscriber is already installed
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<PathBuf, std::io::Error> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_dir)?;
    let log_path = logs_dir.join(LOG_FILE_NAME);
    let log_file = File::create(&log_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(console_level)));
    let console = layer_fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = layer_fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(filter_directives(Level::DEBUG)));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(std::io::Error::other)?;

    tracing::debug!(console = %console_level, file = %log_path.display(), "Logging ready");
    Ok(log_path)
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes per-attempt retry detail
    Trace,
}

impl CliLogLevel {
    /// Maps the flag value onto a tracing level.
    ///
    /// ```
    /// use vidseek_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

impl fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_tracing_level().as_str().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_filter_directives_quiet_http_plumbing() {
        let directives = filter_directives(Level::DEBUG);

        assert_eq!(directives, "debug,hyper=warn,hyper_util=warn,h2=warn,reqwest=warn");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_display_matches_flag_value() {
        for level in CliLogLevel::value_variants() {
            let parsed = CliLogLevel::from_str(&level.to_string(), false).unwrap();
            assert_eq!(parsed, *level);
        }
    }
}
