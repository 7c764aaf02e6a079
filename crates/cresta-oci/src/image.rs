//! OCI Image Configuration types.
//!
//! Based on the OCI Image Specification v1.1.0:
//! <https://github.com/opencontainers/image-spec>

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cresta_common::{CrestaResult, ImageMetadata, env};

/// OCI Image Configuration (the subset consumed by the launcher).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Architecture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Operating system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Execution parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ExecutionConfig>,
}

/// Execution configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionConfig {
    /// User.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Environment variables as `KEY=VALUE` strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Entrypoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// Default command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    /// Working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl ImageConfig {
    /// Load an image configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> CrestaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Convert the execution section into the launcher's [`ImageMetadata`].
    ///
    /// # Errors
    ///
    /// Returns an error if an image environment entry is not `KEY=VALUE`.
    pub fn to_metadata(&self) -> CrestaResult<ImageMetadata> {
        let Some(execution) = &self.config else {
            return Ok(ImageMetadata::default());
        };

        let workdir = execution
            .working_dir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(ImageMetadata {
            workdir,
            entry: execution.entrypoint.clone(),
            cmd: execution.cmd.clone(),
            env: env::parse_environment_variables(&execution.env)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_JSON: &str = r#"{
        "architecture": "amd64",
        "os": "linux",
        "config": {
            "Env": ["PATH=/usr/bin", "NVIDIA_VISIBLE_DEVICES=all"],
            "Entrypoint": ["/entry.sh"],
            "Cmd": ["--default"],
            "WorkingDir": "/workdir"
        }
    }"#;

    #[test]
    fn parse_and_convert() {
        let config: ImageConfig = serde_json::from_str(CONFIG_JSON).unwrap();
        let metadata = config.to_metadata().unwrap();

        assert_eq!(metadata.workdir, Some(PathBuf::from("/workdir")));
        assert_eq!(metadata.entry.unwrap(), ["/entry.sh".to_string()]);
        assert_eq!(metadata.cmd.unwrap(), ["--default".to_string()]);
        assert_eq!(metadata.env["PATH"], "/usr/bin");
        assert_eq!(metadata.env["NVIDIA_VISIBLE_DEVICES"], "all");
    }

    #[test]
    fn missing_execution_section() {
        let config: ImageConfig = serde_json::from_str(r#"{"os": "linux"}"#).unwrap();
        let metadata = config.to_metadata().unwrap();
        assert_eq!(metadata, ImageMetadata::default());
    }

    #[test]
    fn empty_working_dir_is_unset() {
        let config = ImageConfig {
            config: Some(ExecutionConfig {
                working_dir: Some(String::new()),
                ..ExecutionConfig::default()
            }),
            ..ImageConfig::default()
        };
        assert!(config.to_metadata().unwrap().workdir.is_none());
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, CONFIG_JSON).unwrap();

        let config = ImageConfig::from_file(&path).unwrap();
        assert_eq!(config.os.as_deref(), Some("linux"));
    }
}
