//! Logging initialization
//!
//! Logs never go to stdout: with the stdio transport stdout is the protocol
//! channel. `RUST_LOG` takes precedence over [`LoggingConfig::level`].
//!
//! | Output | Guard required |
//! |--------|----------------|
//! | `Stderr` | No |
//! | `File` | **Yes** |
//! | `Both` | **Yes** |
//! | `None` | No |
//!
//! ```rust,no_run
//! use kvmcp_server::{LogOutput, LoggingConfig};
//!
//! let config = LoggingConfig {
//!     output: LogOutput::File,
//!     directory: Some("/var/log/kvmcp".into()),
//!     ..LoggingConfig::default()
//! };
//! // keep the guard alive until exit so buffered records get flushed
//! let _guard = config.init()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogOutput, LogRotation, LoggingConfig};

/// Flushes file logs when dropped; hold it for the lifetime of the process.
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    _stderr_guard: Option<WorkerGuard>,
}

impl LoggingConfig {
    /// Install the global subscriber.
    ///
    /// Returns a guard for file-based outputs and `None` otherwise.
    ///
    /// # Errors
    ///
    /// Fails when file output has no directory, the directory cannot be
    /// created, or a global subscriber is already installed.
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        match self.output {
            LogOutput::None => Ok(None),
            LogOutput::Stderr => {
                install(self.structured, filter, io::stderr)?;
                Ok(None)
            }
            LogOutput::File => {
                let appender = self.appender()?;
                let (writer, guard) = tracing_appender::non_blocking(appender);
                install(self.structured, filter, writer)?;
                Ok(Some(LoggingGuard {
                    _file_guard: guard,
                    _stderr_guard: None,
                }))
            }
            LogOutput::Both => {
                let appender = self.appender()?;
                let (file, file_guard) = tracing_appender::non_blocking(appender);
                let (stderr, stderr_guard) = tracing_appender::non_blocking(io::stderr());
                install(self.structured, filter, file.and(stderr))?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: Some(stderr_guard),
                }))
            }
        }
    }

    fn appender(&self) -> io::Result<RollingFileAppender> {
        let dir = self.directory.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "file logging requires logging.directory",
            )
        })?;
        std::fs::create_dir_all(dir)?;
        Ok(rolling(self.rotation, dir, &self.file_prefix))
    }
}

fn rolling(rotation: LogRotation, dir: &Path, prefix: &str) -> RollingFileAppender {
    match rotation {
        LogRotation::Minute => tracing_appender::rolling::minutely(dir, prefix),
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
    }
}

fn install<W>(structured: bool, filter: EnvFilter, writer: W) -> io::Result<()>
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    let result = if structured {
        registry.with(fmt::layer().json().with_writer(writer)).try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()
    };
    result.map_err(|e| io::Error::other(e.to_string()))
}
