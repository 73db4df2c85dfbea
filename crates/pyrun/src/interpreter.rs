//! The boundary between the pipeline and a Python interpreter instance.
//!
//! The pipeline never interprets Python itself. It drives an [`Interpreter`]
//! through a small set of operations, each of which suspends the caller until
//! the sandbox side has finished. Values stay inside the sandbox and are
//! referred to by [`PyObject`] handles; only [`Interpreter::to_json`] brings
//! data back out.
//!
//! [`WasmRuntime`](crate::WasmRuntime) is the production implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;

/// Creates fresh interpreter instances.
///
/// Every call to [`Runtime::instantiate`] must return an instance with its own
/// private filesystem and module state; instances are never reused.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Start a new interpreter whose notifications are delivered to `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be created.
    async fn instantiate(&self, events: Arc<dyn HostEvents>) -> Result<Box<dyn Interpreter>, Error>;
}

/// One live interpreter instance.
#[async_trait]
pub trait Interpreter: Send {
    /// Install packages from the interpreter's package index.
    ///
    /// Progress and failures are also reported through
    /// [`HostEvents::package_progress`] and [`HostEvents::package_error`]
    /// while the call is pending.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if any package could not be
    /// installed.
    async fn load_packages(&mut self, names: &[String]) -> Result<(), String>;

    /// Write `contents` to `path` in the sandbox filesystem, creating parent
    /// directories as needed.
    async fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), RaisedError>;

    /// Append `dir` to the module search path.
    async fn append_sys_path(&mut self, dir: &str) -> Result<(), RaisedError>;

    /// Run `code` as the `__main__` module with a fresh globals namespace.
    ///
    /// `filename` is the name reported in tracebacks. The value of a trailing
    /// expression, or `None`, is returned.
    async fn run(&mut self, code: &str, filename: &str) -> Result<PyObject, RaisedError>;

    /// Import `module` and call `function` with `args`, awaiting the result
    /// if it is awaitable.
    async fn call(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Argument>,
    ) -> Result<PyObject, RaisedError>;

    /// Convert a sandbox value to JSON.
    ///
    /// Raises if the value is not plain data.
    async fn to_json(&mut self, object: PyObject) -> Result<serde_json::Value, RaisedError>;

    /// Flush the sandbox's standard output and error streams.
    async fn flush(&mut self);
}

/// Notifications from a running interpreter to the host.
///
/// Called synchronously from inside interpreter operations, so
/// implementations must not block.
pub trait HostEvents: Send + Sync {
    /// A line was written to standard output.
    fn stdout(&self, line: &str);

    /// A line was written to standard error.
    fn stderr(&self, line: &str);

    /// The package installer reported progress.
    fn package_progress(&self, message: &str);

    /// The package installer reported a failure.
    fn package_error(&self, message: &str);

    /// The interpreter printed an internal diagnostic.
    fn debug_print(&self, message: &str);
}

/// Handle to a value living inside an interpreter instance.
///
/// Only meaningful for the instance that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PyObject(pub u32);

/// An argument passed to [`Interpreter::call`].
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Plain data, converted to native Python values inside the sandbox.
    Json(serde_json::Value),
    /// A value previously returned by the same interpreter.
    Object(PyObject),
}

/// An error raised inside the sandbox, normalized at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RaisedError {
    /// Error class as reported by the runtime (e.g. `PythonError`).
    pub kind: String,
    /// Full message, including any traceback.
    pub message: String,
}

impl RaisedError {
    /// Kind used for exceptions raised by Python code.
    pub const PYTHON: &'static str = "PythonError";

    /// Kind used when the engine itself trapped.
    pub const TRAP: &'static str = "WasmTrap";

    /// Create a raised error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an error for a Python exception with the given traceback text.
    #[must_use]
    pub fn python(message: impl Into<String>) -> Self {
        Self::new(Self::PYTHON, message)
    }
}

impl fmt::Debug for dyn Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<interpreter>")
    }
}

impl fmt::Debug for dyn Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<runtime>")
    }
}
