//! Staging and invoking the sandbox-side preparation module.
//!
//! The host owns only the marshaling: it writes [`PREPARE_ENV_PY`] into the
//! sandbox, imports it, hands it every submitted file and decodes the reply.
//! Dependency discovery and installation happen entirely inside the sandbox.

use serde::Deserialize;

use crate::bootstrap::SandboxHandle;
use crate::config::RunnerConfig;
use crate::error::Error;
use crate::file::SourceFile;
use crate::format::format_error;
use crate::interpreter::Argument;

/// Source of the preparation module, staged verbatim into every sandbox.
pub const PREPARE_ENV_PY: &str = include_str!("../python/prepare_env.py");

/// Result of preparing the sandbox environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparationOutcome {
    /// Dependencies were discovered and installed.
    Success {
        /// Installed packages, in the order they were requested.
        dependencies: Vec<String>,
    },
    /// Dependencies could not be resolved or installed.
    Failure {
        /// Installer output and traceback.
        message: String,
    },
}

/// The preparation module's reply, validated on its `kind` tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Reply {
    Success {
        #[serde(default)]
        dependencies: Option<Vec<String>>,
    },
    Error {
        message: String,
    },
}

impl From<Reply> for PreparationOutcome {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Success { dependencies } => Self::Success {
                dependencies: dependencies.unwrap_or_default(),
            },
            Reply::Error { message } => Self::Failure { message },
        }
    }
}

/// Prepare the sandbox environment for `files`.
///
/// An exception raised by the preparation module is reported as
/// [`PreparationOutcome::Failure`].
///
/// # Errors
///
/// Returns [`Error::Bootstrap`] if the module cannot be staged and
/// [`Error::Protocol`] if its reply does not match the documented shape.
pub async fn prepare(
    handle: &mut SandboxHandle,
    files: &[SourceFile],
    config: &RunnerConfig,
) -> Result<PreparationOutcome, Error> {
    let interpreter = handle.interpreter();

    interpreter
        .write_file(&config.prepare_module_path(), PREPARE_ENV_PY.as_bytes())
        .await
        .map_err(|e| Error::Bootstrap(e.to_string()))?;
    interpreter
        .append_sys_path(&config.prepare_dir)
        .await
        .map_err(|e| Error::Bootstrap(e.to_string()))?;

    tracing::debug!(files = files.len(), "Preparing sandbox environment");
    let files = serde_json::to_value(files)?;
    let reply = match interpreter
        .call(&config.prepare_module, "prepare_env", vec![Argument::Json(files)])
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            return Ok(PreparationOutcome::Failure {
                message: format_error(&err),
            });
        }
    };

    let reply = interpreter
        .to_json(reply)
        .await
        .map_err(|e| Error::Protocol(format!("preparation reply is not plain data: {e}")))?;
    decode_reply(reply)
}

fn decode_reply(reply: serde_json::Value) -> Result<PreparationOutcome, Error> {
    serde_json::from_value::<Reply>(reply)
        .map(PreparationOutcome::from)
        .map_err(|e| Error::Protocol(format!("unexpected preparation reply: {e}")))
}
