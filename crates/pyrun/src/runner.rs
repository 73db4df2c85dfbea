//! The execution pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::artifacts::extract_artifacts;
use crate::bootstrap::bootstrap;
use crate::bridge::LogBridge;
use crate::config::RunnerConfig;
use crate::envelope::{RunResult, encode};
use crate::error::Error;
use crate::execute::{ExecutionOutcome, execute};
use crate::file::{SourceFile, entry_file};
use crate::format::sanitize;
use crate::interpreter::Runtime;
use crate::logging::Logger;
use crate::prepare::{PreparationOutcome, prepare};

/// Runs submitted Python programs, one fresh sandbox per run.
///
/// Runs sharing a [`LogBridge`] (by default, every runner in the process)
/// are serialized.
pub struct Runner {
    runtime: Arc<dyn Runtime>,
    config: RunnerConfig,
    bridge: Arc<LogBridge>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Create a runner builder.
    #[must_use]
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    /// The runner's configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `files` in a fresh sandbox.
    ///
    /// The active file (or the first file, if none is active) is executed;
    /// the others are importable from it. Sandbox output is reported to
    /// `logger` as it happens and collected into the result.
    ///
    /// Dependency and runtime failures of the program are reported as
    /// [`RunResult::InstallError`] and [`RunResult::RunError`].
    ///
    /// # Errors
    ///
    /// Returns an error if `files` is empty, the sandbox cannot be started,
    /// the base packages cannot be installed, or a sandbox-side helper
    /// breaks its contract.
    pub async fn run(
        &self,
        files: &[SourceFile],
        logger: Arc<dyn Logger>,
    ) -> Result<RunResult, Error> {
        let entry = entry_file(files)?;
        let _redirect = self.bridge.redirect(logger.clone()).await;
        self.run_redirected(files, entry, logger).await
    }

    /// Run `files` and encode the result as an envelope.
    ///
    /// Encoding happens before the run's critical section is released.
    ///
    /// # Errors
    ///
    /// See [`Runner::run`].
    pub async fn run_to_envelope(
        &self,
        files: &[SourceFile],
        logger: Arc<dyn Logger>,
    ) -> Result<String, Error> {
        let entry = entry_file(files)?;
        let _redirect = self.bridge.redirect(logger.clone()).await;
        let result = self.run_redirected(files, entry, logger).await?;
        Ok(encode(&result))
    }

    async fn run_redirected(
        &self,
        files: &[SourceFile],
        entry: &SourceFile,
        logger: Arc<dyn Logger>,
    ) -> Result<RunResult, Error> {
        let start = Instant::now();

        let mut handle = bootstrap(
            self.runtime.as_ref(),
            logger,
            self.bridge.clone(),
            &self.config.base_packages,
        )
        .await?;

        let result = match prepare(&mut handle, files, &self.config).await? {
            PreparationOutcome::Failure { message } => {
                handle.interpreter().flush().await;
                RunResult::InstallError {
                    output: handle.output().snapshot(),
                    error: sanitize(&message),
                }
            }
            PreparationOutcome::Success { dependencies } => {
                tracing::debug!(?dependencies, "Environment prepared");
                match execute(&mut handle, entry, &self.config).await {
                    ExecutionOutcome::Success { return_value_json } => {
                        let generated_files = extract_artifacts(&mut handle).await;
                        RunResult::Success {
                            output: handle.output().snapshot(),
                            dependencies,
                            return_value_json,
                            generated_files,
                        }
                    }
                    ExecutionOutcome::Failure { error } => RunResult::RunError {
                        output: handle.output().snapshot(),
                        dependencies,
                        error,
                    },
                }
            }
        };

        tracing::info!(
            status = %result.status(),
            output_lines = result.output().len(),
            artifacts = result.artifacts().len(),
            duration = ?start.elapsed(),
            "Run finished"
        );
        Ok(result)
    }
}

/// Builder for constructing a [`Runner`].
#[derive(Default)]
pub struct RunnerBuilder {
    runtime: Option<Arc<dyn Runtime>>,
    config: RunnerConfig,
    bridge: Option<Arc<LogBridge>>,
}

impl fmt::Debug for RunnerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerBuilder")
            .field("has_runtime", &self.runtime.is_some())
            .field("config", &self.config)
            .field("has_bridge", &self.bridge.is_some())
            .finish()
    }
}

impl RunnerBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interpreter runtime.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Runtime + 'static) -> Self {
        self.runtime = Some(Arc::new(runtime));
        self
    }

    /// Set an interpreter runtime shared with other runners.
    #[must_use]
    pub fn with_shared_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the packages installed before preparation.
    #[must_use]
    pub fn with_base_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.base_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Use a dedicated log bridge instead of the process-wide one.
    ///
    /// Runners with different bridges do not serialize against each other.
    #[must_use]
    pub fn with_bridge(mut self, bridge: Arc<LogBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Build the runner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] if no runtime was set.
    pub fn build(self) -> Result<Runner, Error> {
        let runtime = self
            .runtime
            .ok_or_else(|| Error::Initialization("no interpreter runtime configured".to_string()))?;

        Ok(Runner {
            runtime,
            config: self.config,
            bridge: self.bridge.unwrap_or_else(LogBridge::global),
        })
    }
}
