//! The outcome of a run and its tag-delimited text encoding.
//!
//! The envelope looks like XML but is not: each block's content is emitted
//! raw, and only substrings that could be mistaken for that block's own
//! opening or closing tag are neutralized. For example:
//!
//! ```text
//! <status>run-error</status>
//! <dependencies>["numpy"]</dependencies>
//! <output>
//! loading data
//! </output>
//! <error>
//! Traceback (most recent call last):
//!   File "main.py", line 3, in <module>
//! ValueError: bad input
//! </error>
//! ```

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::artifacts::GeneratedArtifact;

/// Which of the three outcomes a [`RunResult`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The program ran to completion.
    Success,
    /// Dependencies could not be installed; the program never ran.
    InstallError,
    /// The program raised.
    RunError,
}

impl RunStatus {
    /// The envelope name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InstallError => "install-error",
            Self::RunError => "run-error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one run.
///
/// `output` holds every line the sandbox wrote to its standard streams, in
/// emission order, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunResult {
    /// The program ran to completion.
    Success {
        /// Standard stream lines.
        output: Vec<String>,
        /// Packages installed for the program.
        dependencies: Vec<String>,
        /// JSON encoding of the program's final expression, if it had one
        /// that could be encoded.
        return_value_json: Option<String>,
        /// Files the program left in its working directory.
        generated_files: Vec<GeneratedArtifact>,
    },
    /// Dependencies could not be installed.
    InstallError {
        /// Standard stream lines.
        output: Vec<String>,
        /// Installer failure message.
        error: String,
    },
    /// The program raised.
    RunError {
        /// Standard stream lines.
        output: Vec<String>,
        /// Packages installed before the program ran.
        dependencies: Vec<String>,
        /// Sanitized traceback.
        error: String,
    },
}

impl RunResult {
    /// Which outcome this is.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        match self {
            Self::Success { .. } => RunStatus::Success,
            Self::InstallError { .. } => RunStatus::InstallError,
            Self::RunError { .. } => RunStatus::RunError,
        }
    }

    /// Standard stream lines.
    #[must_use]
    pub fn output(&self) -> &[String] {
        match self {
            Self::Success { output, .. }
            | Self::InstallError { output, .. }
            | Self::RunError { output, .. } => output,
        }
    }

    /// Installed dependencies. Always empty for [`RunResult::InstallError`].
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        match self {
            Self::Success { dependencies, .. } | Self::RunError { dependencies, .. } => {
                dependencies
            }
            Self::InstallError { .. } => &[],
        }
    }

    /// Generated files. Always empty for failed runs.
    #[must_use]
    pub fn artifacts(&self) -> &[GeneratedArtifact] {
        match self {
            Self::Success {
                generated_files, ..
            } => generated_files,
            Self::InstallError { .. } | Self::RunError { .. } => &[],
        }
    }

    /// The error text of a failed run.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::InstallError { error, .. } | Self::RunError { error, .. } => Some(error),
        }
    }

    /// Encode as a tag-delimited envelope. See [`encode`].
    #[must_use]
    pub fn to_envelope(&self) -> String {
        encode(self)
    }
}

/// Encode a result as a tag-delimited envelope.
///
/// Blocks are emitted in order: `status`, then `dependencies` (JSON array,
/// only if non-empty), then `output` (one line per entry, only if non-empty),
/// then `return_value` for successes with a non-empty one or `error` for failures.
#[must_use]
pub fn encode(result: &RunResult) -> String {
    let mut lines = vec![format!("<status>{}</status>", result.status())];

    let dependencies = result.dependencies();
    if !dependencies.is_empty() {
        lines.push(format!(
            "<dependencies>{}</dependencies>",
            serde_json::json!(dependencies)
        ));
    }

    let output = result.output();
    if !output.is_empty() {
        let escape = TagEscaper::new("output");
        lines.push("<output>".to_string());
        lines.extend(output.iter().map(|line| escape.apply(line)));
        lines.push("</output>".to_string());
    }

    match result {
        RunResult::Success {
            return_value_json: Some(value),
            ..
        } if !value.is_empty() => push_block(&mut lines, "return_value", value),
        RunResult::Success { .. } => {}
        RunResult::InstallError { error, .. } | RunResult::RunError { error, .. } => {
            push_block(&mut lines, "error", error);
        }
    }

    lines.join("\n")
}

fn push_block(lines: &mut Vec<String>, tag: &str, content: &str) {
    lines.push(format!("<{tag}>"));
    lines.push(TagEscaper::new(tag).apply(content));
    lines.push(format!("</{tag}>"));
}

/// Neutralizes opening and closing forms of one tag.
struct TagEscaper(Regex);

impl TagEscaper {
    #[allow(clippy::expect_used)]
    fn new(tag: &str) -> Self {
        let pattern = format!(r"(?i)</?\s*{}(?:.*?>)?", regex::escape(tag));
        Self(Regex::new(&pattern).expect("escaped tag forms a valid regex"))
    }

    fn apply(&self, text: &str) -> String {
        self.0
            .replace_all(text, |caps: &regex::Captures<'_>| {
                caps[0].replace('<', "&lt;").replace('>', "&gt;")
            })
            .into_owned()
    }
}
