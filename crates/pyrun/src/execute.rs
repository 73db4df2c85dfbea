//! Running the entry file.

use crate::bootstrap::SandboxHandle;
use crate::config::RunnerConfig;
use crate::file::SourceFile;
use crate::format::format_error;
use crate::interpreter::{Argument, Interpreter, PyObject};

/// Result of running the entry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The program completed.
    Success {
        /// JSON encoding of the final value, absent if there was none or it
        /// could not be encoded.
        return_value_json: Option<String>,
    },
    /// The program raised.
    Failure {
        /// Sanitized error text.
        error: String,
    },
}

/// Run `entry` as the main module of the prepared sandbox.
///
/// Raised errors are captured rather than propagated. Both standard streams
/// are flushed before returning, whatever the outcome.
pub async fn execute(
    handle: &mut SandboxHandle,
    entry: &SourceFile,
    config: &RunnerConfig,
) -> ExecutionOutcome {
    let interpreter = handle.interpreter();

    tracing::debug!(file = %entry.name, code_len = entry.content.len(), "Executing entry file");
    let outcome = match interpreter.run(&entry.content, &entry.name).await {
        Ok(value) => ExecutionOutcome::Success {
            return_value_json: dump_json(interpreter, &config.prepare_module, value).await,
        },
        Err(err) => {
            tracing::debug!(kind = %err.kind, "Entry file raised");
            ExecutionOutcome::Failure {
                error: format_error(&err),
            }
        }
    };

    interpreter.flush().await;
    outcome
}

/// Serialize a sandbox value with the preparation module's `dump_json`.
async fn dump_json(
    interpreter: &mut dyn Interpreter,
    module: &str,
    value: PyObject,
) -> Option<String> {
    let dumped = match interpreter
        .call(module, "dump_json", vec![Argument::Object(value)])
        .await
    {
        Ok(dumped) => dumped,
        Err(err) => {
            tracing::warn!(error = %err, "dump_json raised; dropping return value");
            return None;
        }
    };

    match interpreter.to_json(dumped).await {
        Ok(serde_json::Value::String(json)) => Some(json),
        Ok(serde_json::Value::Null) => None,
        Ok(other) => {
            tracing::warn!(value = %other, "dump_json returned a non-string");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "dump_json result could not be read");
            None
        }
    }
}
