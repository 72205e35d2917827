//! Host config file (layer 2)
//!
//! Every key is optional; absent keys keep the built-in value.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub namespace: Option<String>,
    #[serde(default)]
    pub kubectl: KubectlSection,
    #[serde(default)]
    pub wait: WaitSection,
    #[serde(default)]
    pub transfer: TransferSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubectlSection {
    pub binary: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitSection {
    pub delete_interval_seconds: Option<u64>,
    pub delete_timeout_seconds: Option<u64>,
    pub sandbox_interval_seconds: Option<u64>,
    pub sandbox_timeout_seconds: Option<u64>,
    pub build_interval_seconds: Option<u64>,
    pub build_timeout_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferSection {
    pub remote_root: Option<String>,
    pub artifact_container: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub progress: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
namespace = "builds"

[wait]
build_timeout_minutes = 90

[transfer]
output_dir = "/tmp/images"
"#,
        )
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("builds"));
        assert_eq!(config.wait.build_timeout_minutes, Some(90));
        assert_eq!(config.wait.delete_interval_seconds, None);
        assert_eq!(config.transfer.output_dir, Some(PathBuf::from("/tmp/images")));
        assert!(config.kubectl.binary.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = FileConfig::from_toml("namespcae = \"typo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = FileConfig::from_toml("").unwrap();
        assert!(config.namespace.is_none());
    }
}
