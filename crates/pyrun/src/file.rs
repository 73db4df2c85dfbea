//! Submitted source files and entry-file selection.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A Python source file submitted for execution.
///
/// The full set of files is written into the sandbox's working directory so
/// that the entry file can import the others as modules. Exactly one file is
/// executed: the one marked `active`, or the first one if none is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// File name relative to the sandbox working directory (e.g. `main.py`).
    pub name: String,
    /// Python source text.
    pub content: String,
    /// Whether this file is the entry point.
    #[serde(default)]
    pub active: bool,
}

impl SourceFile {
    /// Create a non-active source file.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            active: false,
        }
    }

    /// Create a source file marked as the entry point.
    #[must_use]
    pub fn active(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            active: true,
            ..Self::new(name, content)
        }
    }
}

/// Select the file to execute.
///
/// The first file marked active wins; otherwise the first submitted file is
/// used.
///
/// # Errors
///
/// Returns [`Error::NoSourceFiles`] if `files` is empty.
pub fn entry_file(files: &[SourceFile]) -> Result<&SourceFile, Error> {
    files
        .iter()
        .find(|f| f.active)
        .or_else(|| files.first())
        .ok_or(Error::NoSourceFiles)
}
