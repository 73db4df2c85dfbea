//! Runner configuration.

use serde::Deserialize;

use crate::bootstrap::BASE_PACKAGES;

/// Settings for a [`Runner`](crate::Runner).
///
/// Deserializable so hosts can keep it alongside their own configuration:
///
/// ```rust
/// let config: pyrun::RunnerConfig =
///     serde_json::from_str(r#"{"base_packages": ["micropip"]}"#).unwrap();
/// assert_eq!(config.prepare_module, "pyrun_prepare_env");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Packages installed into every sandbox before preparation.
    pub base_packages: Vec<String>,
    /// Sandbox directory the preparation module is staged in. Must be outside
    /// the working directory so it is never mistaken for an artifact.
    pub prepare_dir: String,
    /// Module name the preparation script is imported as.
    pub prepare_module: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_packages: BASE_PACKAGES.iter().map(ToString::to_string).collect(),
            prepare_dir: "/tmp/pyrun_prepare".to_string(),
            prepare_module: "pyrun_prepare_env".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Sandbox path of the staged preparation module.
    #[must_use]
    pub fn prepare_module_path(&self) -> String {
        format!(
            "{}/{}.py",
            self.prepare_dir.trim_end_matches('/'),
            self.prepare_module
        )
    }
}
