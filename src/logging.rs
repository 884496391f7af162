//! Logging setup for the gearbox binary.
//!
//! Console output plus two daily-rotating files:
//!
//! - `gearbox.<date>.log`: everything at or above the filter level
//! - `error.<date>.log`: warnings and errors only
//!
//! The level defaults to `info` and can be overridden with `RUST_LOG`.
//!
//! ```no_run
//! gearbox::logging::init(None).expect("Failed to initialize logging");
//! tracing::info!("Job started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const LOG_PREFIX: &str = "gearbox";
const ERROR_PREFIX: &str = "error";
const MAX_LOG_FILES: usize = 10;

/// Default log directory under the platform data directory:
///
/// - Windows: `%APPDATA%/gearbox/logs`
/// - macOS: `~/Library/Application Support/gearbox/logs`
/// - Linux: `~/.local/share/gearbox/logs`
pub fn default_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join("gearbox").join("logs"))
}

/// Resolve and create the log directory.
pub fn log_dir(configured: Option<&Path>) -> Result<PathBuf> {
    let dir = match configured {
        Some(dir) => dir.to_path_buf(),
        None => default_log_dir()?,
    };
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    Ok(dir)
}

/// Install the global subscriber. Call once, at startup.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or the file
/// appenders fail.
pub fn init(configured_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = log_dir(configured_dir)?;

    let all_logs_appender = appender(&log_dir, LOG_PREFIX)?;
    let error_logs_appender = appender(&log_dir, ERROR_PREFIX)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Logging already initialized")?;

    tracing::debug!("Logging initialized, log directory: {}", log_dir.display());
    Ok(log_dir)
}

fn appender(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Path of today's main log file in `dir`.
pub fn current_log_path(dir: &Path) -> PathBuf {
    dated(dir, LOG_PREFIX)
}

/// Path of today's warning/error log file in `dir`.
pub fn current_error_log_path(dir: &Path) -> PathBuf {
    dated(dir, ERROR_PREFIX)
}

fn dated(dir: &Path, prefix: &str) -> PathBuf {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    dir.join(format!("{prefix}.{today}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_dir() {
        let dir = default_log_dir().expect("Failed to get log dir");
        assert!(dir.ends_with("gearbox/logs") || dir.ends_with("gearbox\\logs"));
    }

    #[test]
    fn test_configured_log_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let wanted = tmp.path().join("a").join("logs");
        let dir = log_dir(Some(&wanted)).unwrap();
        assert_eq!(dir, wanted);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_current_log_paths() {
        let dir = Path::new("/tmp/logs");
        let main = current_log_path(dir);
        let errors = current_error_log_path(dir);
        let name = main.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("gearbox.") && name.ends_with(".log"), "{name}");
        assert!(
            errors
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("error.")
        );
    }
}
