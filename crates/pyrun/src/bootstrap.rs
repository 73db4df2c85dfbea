//! Sandbox creation and stream wiring.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::bridge::LogBridge;
use crate::error::Error;
use crate::interpreter::{HostEvents, Interpreter, Runtime};
use crate::logging::{LogLevel, Logger};

/// Packages installed into every sandbox before preparation runs.
///
/// `micropip` drives dependency installation and `pydantic` provides the
/// JSON serializer used by `dump_json`.
pub const BASE_PACKAGES: &[&str] = &["micropip", "pydantic"];

/// Prefix applied to installer failures recorded in the output log.
pub const INSTALL_ERROR_PREFIX: &str = "install error: ";

/// Prefix applied to installer messages forwarded to the logger.
pub const INSTALLER_LOG_PREFIX: &str = "loadPackage: ";

/// Lines emitted by a sandbox, in emission order.
///
/// Written only by the stream callbacks of the sandbox that owns it.
#[derive(Debug, Clone, Default)]
pub struct OutputLog(Arc<Mutex<Vec<String>>>);

impl OutputLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    /// Copy out the lines recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of lines recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Forwards sandbox notifications to the run's logger and output log.
struct SandboxEvents {
    logger: Arc<dyn Logger>,
    output: OutputLog,
    bridge: Arc<LogBridge>,
}

impl HostEvents for SandboxEvents {
    fn stdout(&self, line: &str) {
        self.logger.log(LogLevel::Info, line);
        self.output.push(line);
    }

    fn stderr(&self, line: &str) {
        self.logger.log(LogLevel::Warning, line);
        self.output.push(line);
    }

    fn package_progress(&self, message: &str) {
        self.logger
            .log(LogLevel::Debug, &format!("{INSTALLER_LOG_PREFIX}{message}"));
    }

    fn package_error(&self, message: &str) {
        self.logger
            .log(LogLevel::Error, &format!("{INSTALLER_LOG_PREFIX}{message}"));
        self.output.push(format!("{INSTALL_ERROR_PREFIX}{message}"));
    }

    fn debug_print(&self, message: &str) {
        self.bridge.print(message);
    }
}

/// A started sandbox together with the output it has produced.
pub struct SandboxHandle {
    interpreter: Box<dyn Interpreter>,
    output: OutputLog,
}

impl fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("output_lines", &self.output.len())
            .finish_non_exhaustive()
    }
}

impl SandboxHandle {
    /// The interpreter instance.
    pub fn interpreter(&mut self) -> &mut dyn Interpreter {
        self.interpreter.as_mut()
    }

    /// Output recorded from the sandbox's standard streams.
    #[must_use]
    pub fn output(&self) -> &OutputLog {
        &self.output
    }
}

/// Start a sandbox and install `base_packages` into it.
///
/// Standard output is logged at `info`, standard error at `warning`, and both
/// are appended to the handle's [`OutputLog`]. Installer messages are logged
/// with a `loadPackage: ` prefix, progress at `debug` and failures at `error`;
/// failures are also recorded in the output log with an `install error: `
/// prefix. Interpreter debug prints go
/// through `bridge`.
///
/// # Errors
///
/// Returns an error if the sandbox cannot be created, or
/// [`Error::BasePackages`] if the base packages cannot be installed.
pub async fn bootstrap(
    runtime: &dyn Runtime,
    logger: Arc<dyn Logger>,
    bridge: Arc<LogBridge>,
    base_packages: &[String],
) -> Result<SandboxHandle, Error> {
    let output = OutputLog::new();
    let events = Arc::new(SandboxEvents {
        logger,
        output: output.clone(),
        bridge,
    });

    let mut interpreter = runtime.instantiate(events).await?;

    tracing::debug!(packages = ?base_packages, "Installing base packages");
    interpreter
        .load_packages(base_packages)
        .await
        .map_err(Error::BasePackages)?;

    Ok(SandboxHandle {
        interpreter,
        output,
    })
}
