//! Extracting files a program left in its working directory.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize, Serializer};

use crate::bootstrap::SandboxHandle;
use crate::interpreter::RaisedError;

/// Introspection snippet run inside the sandbox after a successful run.
///
/// Evaluates to a JSON array of `{name, size, content}` objects, where
/// `content` is the file's bytes as an array of integers.
pub const LIST_ARTIFACTS_PY: &str = include_str!("../python/list_artifacts.py");

/// Filename reported for the introspection snippet in tracebacks.
const SNIPPET_FILENAME: &str = "<list_artifacts>";

/// Suffix of source files, which are never artifacts.
const SOURCE_SUFFIX: &str = ".py";

/// Path segment of bytecode caches, which are never artifacts.
const CACHE_MARKER: &str = "__pycache__";

/// A file created by the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifact {
    /// File name relative to the working directory.
    pub name: String,
    /// Raw file contents.
    #[serde(serialize_with = "serialize_base64")]
    pub content: Vec<u8>,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// One entry as reported by the introspection snippet.
#[derive(Debug, Deserialize)]
struct ListedFile {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    content: Vec<u8>,
}

/// Whether a working-directory entry name can be an artifact.
///
/// Source files, hidden files and anything under a bytecode cache are
/// excluded.
#[must_use]
pub fn is_artifact_name(name: &str) -> bool {
    !name.ends_with(SOURCE_SUFFIX) && !name.starts_with('.') && !name.contains(CACHE_MARKER)
}

/// Collect the files the program created.
///
/// Never fails: any error while listing or reading is logged and yields an
/// empty list.
pub async fn extract_artifacts(handle: &mut SandboxHandle) -> Vec<GeneratedArtifact> {
    match list_artifacts(handle).await {
        Ok(artifacts) => {
            tracing::debug!(count = artifacts.len(), "Extracted generated files");
            artifacts
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to extract generated files");
            Vec::new()
        }
    }
}

async fn list_artifacts(handle: &mut SandboxHandle) -> Result<Vec<GeneratedArtifact>, RaisedError> {
    let interpreter = handle.interpreter();
    let listing = interpreter.run(LIST_ARTIFACTS_PY, SNIPPET_FILENAME).await?;
    let listing = interpreter.to_json(listing).await?;

    let serde_json::Value::String(json) = listing else {
        return Err(RaisedError::new(
            "ProtocolError",
            format!("expected a JSON string from the listing snippet, got {listing}"),
        ));
    };
    decode_listing(&json)
}

/// Decode the snippet's JSON reply into artifacts.
fn decode_listing(json: &str) -> Result<Vec<GeneratedArtifact>, RaisedError> {
    let files: Vec<ListedFile> = serde_json::from_str(json)
        .map_err(|e| RaisedError::new("ProtocolError", format!("invalid file listing: {e}")))?;

    Ok(files
        .into_iter()
        .filter(|file| is_artifact_name(&file.name))
        .inspect(|file| {
            if file.size.is_some_and(|size| size != file.content.len() as u64) {
                tracing::warn!(
                    name = %file.name,
                    reported = ?file.size,
                    actual = file.content.len(),
                    "Listed size disagrees with content length"
                );
            }
        })
        .map(|file| GeneratedArtifact {
            name: file.name,
            content: file.content,
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_filter() {
        assert!(is_artifact_name("chart.png"));
        assert!(is_artifact_name("data.csv"));
        assert!(!is_artifact_name("helper.py"));
        assert!(!is_artifact_name(".hidden"));
        assert!(!is_artifact_name("__pycache__"));
    }

    #[test]
    fn test_decode_listing_reconstructs_bytes() {
        let json = r#"[
            {"name": "chart.png", "size": 4, "content": [137, 80, 78, 71]},
            {"name": "helper.py", "size": 1, "content": [120]},
            {"name": ".hidden", "size": 0, "content": []}
        ]"#;

        let artifacts = decode_listing(json).unwrap();

        assert_eq!(
            artifacts,
            vec![GeneratedArtifact {
                name: "chart.png".to_string(),
                content: vec![137, 80, 78, 71],
            }]
        );
    }

    #[test]
    fn test_decode_listing_rejects_out_of_range_bytes() {
        let json = r#"[{"name": "x.bin", "size": 1, "content": [256]}]"#;
        assert!(decode_listing(json).is_err());
    }

    #[test]
    fn test_artifact_content_serializes_as_base64() {
        let artifact = GeneratedArtifact {
            name: "a.txt".to_string(),
            content: b"hi".to_vec(),
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["content"], "aGk=");
    }
}
