//! # pyrun
//!
//! Run untrusted, user-supplied Python programs inside a WebAssembly sandbox
//! and report what they did.
//!
//! A run takes a set of [`SourceFile`]s, one of them marked as the entry
//! point, and a leveled [`Logger`]. It:
//!
//! 1. starts a fresh interpreter and installs a small base package set;
//! 2. stages a preparation module that discovers and installs the program's
//!    third-party dependencies;
//! 3. runs the entry file as `__main__`, capturing its return value as JSON;
//! 4. collects any files the program wrote to its working directory;
//! 5. reports everything as a [`RunResult`], which encodes to a
//!    tag-delimited envelope suitable for embedding in a larger message.
//!
//! Program failures are part of the result; only infrastructure failures
//! are returned as [`Error`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pyrun::{Runner, SourceFile, TracingLogger, WasmRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pyrun::Error> {
//!     let runtime = WasmRuntime::from_file("interpreter.wasm")?
//!         .with_python_stdlib("python-stdlib");
//!     let runner = Runner::builder().with_runtime(runtime).build()?;
//!
//!     let files = [SourceFile::active("main.py", "print('hello')\n1 + 1")];
//!     let envelope = runner
//!         .run_to_envelope(&files, Arc::new(TracingLogger))
//!         .await?;
//!
//!     println!("{envelope}");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod artifacts;
mod bootstrap;
mod bridge;
mod config;
mod envelope;
mod error;
mod execute;
mod file;
mod format;
mod interpreter;
mod logging;
mod prepare;
mod runner;
mod wasm;

pub use artifacts::{GeneratedArtifact, LIST_ARTIFACTS_PY, extract_artifacts, is_artifact_name};
pub use bootstrap::{
    BASE_PACKAGES, INSTALL_ERROR_PREFIX, INSTALLER_LOG_PREFIX, OutputLog, SandboxHandle, bootstrap,
};
pub use bridge::{LogBridge, Redirect};
pub use config::RunnerConfig;
pub use envelope::{RunResult, RunStatus, encode};
pub use error::Error;
pub use execute::{ExecutionOutcome, execute};
pub use file::{SourceFile, entry_file};
pub use format::{format_error, sanitize};
pub use interpreter::{Argument, HostEvents, Interpreter, PyObject, RaisedError, Runtime};
pub use logging::{LogLevel, Logger, TracingLogger};
pub use prepare::{PREPARE_ENV_PY, PreparationOutcome, prepare};
pub use runner::{Runner, RunnerBuilder};
pub use wasm::WasmRuntime;
