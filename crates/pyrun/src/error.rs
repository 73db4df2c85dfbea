//! Error types for the execution pipeline.
//!
//! Only failures that prevent a structured [`RunResult`](crate::RunResult)
//! from being produced are represented here. A user program that fails to
//! install its dependencies or raises while running is not an error at this
//! level; it is reported through the result envelope instead.

/// Errors that escape [`Runner::run`](crate::Runner::run).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The wasmtime engine or linker could not be configured.
    #[error("failed to configure wasm engine: {0}")]
    WasmEngine(String),

    /// The interpreter component could not be loaded.
    #[error("failed to load wasm component: {0}")]
    WasmComponent(wasmtime::Error),

    /// A fresh interpreter instance could not be created.
    #[error("failed to initialize sandbox: {0}")]
    Initialization(String),

    /// The fixed base package set could not be installed.
    #[error("failed to install base packages: {0}")]
    BasePackages(String),

    /// The preparation module could not be staged inside the sandbox.
    #[error("failed to stage preparation module: {0}")]
    Bootstrap(String),

    /// A sandbox-side helper replied with a value outside its contract.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// No source files were submitted.
    #[error("no source files were submitted")]
    NoSourceFiles,

    /// A value could not be serialized or deserialized at the boundary.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
