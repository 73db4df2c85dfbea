//! Leveled logging callback supplied by the caller.
//!
//! Everything the sandbox says (standard streams, package installer
//! progress, interpreter debug prints) is reported through a [`Logger`]
//! so the embedding tool can route it wherever it wants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a message forwarded to a [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Interpreter internals and installer progress.
    Debug,
    /// Lines the program wrote to stdout.
    Info,
    /// Lines the program wrote to stderr.
    Warning,
    /// Package installation failures.
    Error,
}

impl LogLevel {
    /// The lowercase name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leveled logging callback.
///
/// Implemented for any `Fn(LogLevel, &str)` closure:
///
/// ```rust
/// use std::sync::Arc;
/// use pyrun::{LogLevel, Logger};
///
/// let logger: Arc<dyn Logger> = Arc::new(|level: LogLevel, message: &str| {
///     eprintln!("[{level}] {message}");
/// });
/// logger.log(LogLevel::Info, "hello");
/// ```
pub trait Logger: Send + Sync {
    /// Record one message.
    fn log(&self, level: LogLevel, message: &str);
}

impl<F> Logger for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message);
    }
}

/// A [`Logger`] that emits `tracing` events under the `pyrun::sandbox` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "pyrun::sandbox", "{message}"),
            LogLevel::Info => tracing::info!(target: "pyrun::sandbox", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "pyrun::sandbox", "{message}"),
            LogLevel::Error => tracing::error!(target: "pyrun::sandbox", "{message}"),
        }
    }
}
