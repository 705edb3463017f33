//! Logging Setup
//!
//! Normal runs log to stderr at the configured level so command output stays
//! readable. `--debug` switches to daily-rotated files under the log
//! directory with everything at debug level.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "wasuite.log";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub debug_mode: bool,
    pub log_dir: PathBuf,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Plain (non-rotated) log file, used outside debug mode
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            debug_mode: false,
            log_dir: default_log_dir(),
            level: "warn".to_string(),
            file: None,
        }
    }

    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.debug_mode {
            "wasuite=debug,info"
        } else {
            self.level.as_str()
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }
}

/// ~/.wasuite/logs
pub fn default_log_dir() -> PathBuf {
    crate::config::wasuite_home().join("logs")
}

/// Log directory in effect: `DEBUG_LOGS_LOCATION` or the default.
pub fn log_dir() -> PathBuf {
    std::env::var("DEBUG_LOGS_LOCATION")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_log_dir())
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.filter();

    let appender = if config.debug_mode {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;
        Some(tracing_appender::rolling::daily(
            &config.log_dir,
            LOG_FILE_PREFIX,
        ))
    } else if let Some(file) = &config.file {
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = file
            .file_name()
            .with_context(|| format!("Log file has no file name: {:?}", file))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
        Some(tracing_appender::rolling::never(dir, name))
    } else {
        None
    };

    match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(config.debug_mode)
                .try_init()
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            tracing::debug!("Logging to {:?}", config.log_dir);
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(None)
        }
    }
}

/// Remove rotated log files older than `days` from the log directory.
pub fn cleanup_old_logs(days: u64) -> Result<usize> {
    cleanup_logs_in(&log_dir(), days)
}

pub(crate) fn cleanup_logs_in(dir: &Path, days: u64) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let max_age = Duration::from_secs(days * 24 * 60 * 60);
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory: {:?}", dir))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log || !path.is_file() {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove old log {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}

/// Summary of the log directory: (file count, total bytes)
pub fn log_stats(dir: &Path) -> Result<(usize, u64)> {
    if !dir.exists() {
        return Ok((0, 0));
    }
    let mut count = 0;
    let mut bytes = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            count += 1;
            bytes += meta.len();
        }
    }
    Ok((count, bytes))
}
