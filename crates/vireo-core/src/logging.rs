//! Process-wide logging service.
//!
//! [`init`] must run before any other engine code so that early failures are
//! captured. The log file handle is kept in a process-wide slot: it outlives
//! every GPU object and is flushed by [`crate::fatal::crash`] before the
//! process is aborted.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Name of the per-user log file. It is truncated on every start.
pub const LOG_FILE_NAME: &str = "latest.log";

static LOG_FILE: OnceLock<Arc<File>> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Application name, used to scope the preferences directory.
    pub app_name: String,
    /// Organisation component of the preferences directory.
    pub organization: String,
    /// Explicit log directory, overriding the platform data directory.
    pub directory: Option<PathBuf>,
    /// Console filter used when `RUST_LOG` is not set.
    pub console_filter: String,
    /// Filter for the log file.
    pub file_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "vireo".to_string(),
            organization: "vireo".to_string(),
            directory: None,
            console_filter: if cfg!(debug_assertions) {
                "debug".to_string()
            } else {
                "info".to_string()
            },
            file_filter:
                "info,vireo_core=trace,vireo_gpu=trace,vireo_platform=trace,vireo_app=trace"
                    .to_string(),
        }
    }
}

impl LogConfig {
    /// Create a config for the given application.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Write the log file into `dir` instead of the platform data directory.
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Resolve the directory the log file is written to.
    pub fn log_directory(&self) -> PathBuf {
        if let Some(dir) = &self.directory {
            return dir.clone();
        }

        directories::ProjectDirs::from("", &self.organization, &self.app_name)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Create (or truncate) the log file inside `dir`.
pub fn open_log_file(dir: &Path) -> Result<File> {
    fs::create_dir_all(dir)?;
    Ok(File::create(dir.join(LOG_FILE_NAME))?)
}

/// Install the global subscriber: a console layer and a plain-text file layer.
///
/// Returns the path of the log file.
pub fn init(config: &LogConfig) -> Result<PathBuf> {
    let dir = config.log_directory();
    let file = Arc::new(open_log_file(&dir)?);

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.console_filter));
    let console_layer = fmt::layer().with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(Arc::clone(&file))
        .with_ansi(false)
        .with_filter(EnvFilter::new(&config.file_filter));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    // A second init fails above, so the slot is always empty here.
    let _ = LOG_FILE.set(file);

    let path = dir.join(LOG_FILE_NAME);
    tracing::info!("Logging to {}", path.display());
    Ok(path)
}

/// Flush the log file to disk. Safe to call before [`init`].
pub fn flush() {
    if let Some(file) = LOG_FILE.get() {
        let mut writer: &File = file;
        let _ = writer.flush();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn log_file_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();

        let mut file = open_log_file(dir.path()).unwrap();
        file.write_all(b"previous run").unwrap();
        drop(file);

        let _file = open_log_file(dir.path()).unwrap();
        let mut contents = String::new();
        File::open(dir.path().join(LOG_FILE_NAME))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        open_log_file(&nested).unwrap();
        assert!(nested.join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn explicit_directory_wins() {
        let config = LogConfig::new("demo").with_directory("/tmp/vireo-logs");
        assert_eq!(config.log_directory(), PathBuf::from("/tmp/vireo-logs"));
    }

    #[test]
    fn flush_before_init_is_harmless() {
        flush();
    }
}
