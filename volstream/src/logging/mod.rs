//! Logging setup.
//!
//! The library itself only emits `tracing` events. Binaries call
//! [`init_logging`] once at startup to install a subscriber that writes to
//! stderr and, optionally, to a log file.
//!
//! The filter defaults to `volstream=info` and can be overridden with
//! `RUST_LOG`, e.g. `RUST_LOG=volstream::scheduler=trace`.

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default filter directive.
pub const DEFAULT_FILTER: &str = "volstream=info";

/// Filter directive used by verbose mode.
pub const VERBOSE_FILTER: &str = "volstream=debug";

const TIME_FORMAT: &str = "[hour]:[minute]:[second].[subsecond digits:3]";

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("invalid log time format: {0}")]
    TimeFormat(#[from] time::error::InvalidFormatDescription),

    #[error("failed to create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging options.
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,

    /// Also write logs to this file.
    pub file: Option<PathBuf>,

    /// Use `VERBOSE_FILTER` as the default directive.
    pub verbose: bool,
}

impl LogConfig {
    /// Set an explicit filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Write logs to a file as well.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Enable verbose output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The directive applied when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &str {
        match &self.filter {
            Some(filter) => filter,
            None if self.verbose => VERBOSE_FILTER,
            None => DEFAULT_FILTER,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }
}

/// Keeps the background log writer alive; drop it on shutdown to flush.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if the filter directive is invalid, the log directory cannot be
/// created, or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard, LogError> {
    let filter = config.env_filter()?;
    let format = time::format_description::parse_borrowed::<1>(TIME_FORMAT)?;
    let timer = LocalTime::new(format);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(true);

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&dir).map_err(|source| LogError::Directory {
                path: dir.clone(),
                source,
            })?;
            let file_name = path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("volstream.log"));

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
