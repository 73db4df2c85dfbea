//! Sanitizing error text raised inside the sandbox.

use std::sync::LazyLock;

use regex::Regex;

use crate::interpreter::RaisedError;

#[allow(clippy::expect_used)]
static KIND_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PythonError: +").expect("valid regex"));

/// A traceback frame inside the interpreter's own bootstrap package, plus the
/// caret line that may follow it.
#[allow(clippy::expect_used)]
static INTERNAL_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#" {2}File "/lib/python\d+\.zip/_pyodide/.*\n {4}.*\n(?: {4,}\^+\n)?"#)
        .expect("valid regex")
});

/// Render a raised error for display.
///
/// Strips the redundant `PythonError: ` prefix and every traceback frame that
/// points into the interpreter's bootstrap code.
#[must_use]
pub fn format_error(err: &RaisedError) -> String {
    sanitize(&err.to_string())
}

/// Sanitize already-rendered error text. See [`format_error`].
#[must_use]
pub fn sanitize(text: &str) -> String {
    let text = KIND_PREFIX.replace(text, "");
    INTERNAL_FRAME.replace_all(&text, "").into_owned()
}
