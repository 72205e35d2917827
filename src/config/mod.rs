//! Client configuration
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host config (~/.config/caib/config.toml, or --config-file)
//! 3. CLI flags
//!
//! The merged [`ClientConfig`] is built once in `main` and passed by
//! reference to every operation. Nothing reads flags or globals after that.

mod defaults;
mod file;

pub use defaults::*;
pub use file::{FileConfig, KubectlSection, TransferSection, WaitSection};

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::transport::KubectlConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config{}: {message}", .path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{interval_field} ({interval:?}) must not exceed {timeout_field} ({timeout:?})")]
    IntervalExceedsTimeout {
        interval_field: &'static str,
        interval: Duration,
        timeout_field: &'static str,
        timeout: Duration,
    },

    #[error("namespace must not be empty")]
    EmptyNamespace,
}

/// Origin of a configuration layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Builtin,
    File(PathBuf),
    Cli,
}

/// Interval and bound of every polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub delete_interval: Duration,
    pub delete_timeout: Duration,
    pub sandbox_interval: Duration,
    pub sandbox_timeout: Duration,
    pub build_interval: Duration,
    pub build_timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            delete_interval: DELETE_POLL_INTERVAL,
            delete_timeout: DELETE_POLL_TIMEOUT,
            sandbox_interval: SANDBOX_POLL_INTERVAL,
            sandbox_timeout: SANDBOX_POLL_TIMEOUT,
            build_interval: BUILD_POLL_INTERVAL,
            build_timeout: BUILD_POLL_TIMEOUT,
        }
    }
}

impl WaitConfig {
    /// Uniform short waits, for tests and dry runs against a mock cluster.
    pub fn uniform(interval: Duration, timeout: Duration) -> Self {
        Self {
            delete_interval: interval,
            delete_timeout: timeout,
            sandbox_interval: interval,
            sandbox_timeout: timeout,
            build_interval: interval,
            build_timeout: timeout,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pairs = [
            ("delete_interval", self.delete_interval, "delete_timeout", self.delete_timeout),
            ("sandbox_interval", self.sandbox_interval, "sandbox_timeout", self.sandbox_timeout),
            ("build_interval", self.build_interval, "build_timeout", self.build_timeout),
        ];
        for (interval_field, interval, timeout_field, timeout) in pairs {
            if interval.is_zero() {
                return Err(ConfigError::Zero { field: interval_field });
            }
            if timeout.is_zero() {
                return Err(ConfigError::Zero { field: timeout_field });
            }
            if interval > timeout {
                return Err(ConfigError::IntervalExceedsTimeout {
                    interval_field,
                    interval,
                    timeout_field,
                    timeout,
                });
            }
        }
        Ok(())
    }
}

/// Where files go on both sides of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Sandbox directory uploads are extracted into and artifacts are read from
    pub remote_root: String,
    /// Container of the artifact server pod
    pub artifact_container: String,
    /// Local directory for downloaded artifacts
    pub output_dir: PathBuf,
    /// Render byte progress on stderr
    pub progress: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            remote_root: REMOTE_ROOT.to_string(),
            artifact_container: ARTIFACT_CONTAINER.to_string(),
            output_dir: PathBuf::from(OUTPUT_DIR),
            progress: true,
        }
    }
}

/// CLI flags that override config values (layer 3)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub build_timeout_minutes: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub quiet: bool,
}

/// Merged, immutable client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub namespace: String,
    pub kubectl: KubectlConfig,
    pub wait: WaitConfig,
    pub transfer: TransferConfig,
    /// Contributing layers in precedence order
    pub sources: Vec<ConfigOrigin>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubectl: KubectlConfig::default(),
            wait: WaitConfig::default(),
            transfer: TransferConfig::default(),
            sources: vec![ConfigOrigin::Builtin],
        }
    }
}

impl ClientConfig {
    /// Build the effective config from all layers.
    ///
    /// An explicit `config_path` must exist. Without one, the host config
    /// file is used when present.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let file_path = match config_path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::host_config_path().filter(|p| p.exists()),
        };

        if let Some(path) = file_path {
            let file = FileConfig::from_file(&path)?;
            config.apply_file(&file);
            config.sources.push(ConfigOrigin::File(path));
        }

        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Default host config location, if $HOME is known
    pub fn host_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(HOST_CONFIG_PATH))
    }

    pub fn apply_file(&mut self, file: &FileConfig) {
        if let Some(ref ns) = file.namespace {
            self.namespace = ns.clone();
        }

        let k = &file.kubectl;
        if let Some(ref binary) = k.binary {
            self.kubectl.binary = binary.clone();
        }
        if k.kubeconfig.is_some() {
            self.kubectl.kubeconfig = k.kubeconfig.clone();
        }
        if k.context.is_some() {
            self.kubectl.context = k.context.clone();
        }
        if let Some(secs) = k.request_timeout_seconds {
            self.kubectl.request_timeout = Duration::from_secs(secs);
        }

        let w = &file.wait;
        let secs = |v: Option<u64>, current: Duration| v.map(Duration::from_secs).unwrap_or(current);
        self.wait.delete_interval = secs(w.delete_interval_seconds, self.wait.delete_interval);
        self.wait.delete_timeout = secs(w.delete_timeout_seconds, self.wait.delete_timeout);
        self.wait.sandbox_interval = secs(w.sandbox_interval_seconds, self.wait.sandbox_interval);
        self.wait.sandbox_timeout = secs(w.sandbox_timeout_seconds, self.wait.sandbox_timeout);
        self.wait.build_interval = secs(w.build_interval_seconds, self.wait.build_interval);
        if let Some(minutes) = w.build_timeout_minutes {
            self.wait.build_timeout = Duration::from_secs(minutes.saturating_mul(60));
        }

        let t = &file.transfer;
        if let Some(ref root) = t.remote_root {
            self.transfer.remote_root = root.clone();
        }
        if let Some(ref container) = t.artifact_container {
            self.transfer.artifact_container = container.clone();
        }
        if let Some(ref dir) = t.output_dir {
            self.transfer.output_dir = dir.clone();
        }
        if let Some(progress) = t.progress {
            self.transfer.progress = progress;
        }
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref ns) = cli.namespace {
            self.namespace = ns.clone();
        }
        if cli.kubeconfig.is_some() {
            self.kubectl.kubeconfig = cli.kubeconfig.clone();
        }
        if cli.context.is_some() {
            self.kubectl.context = cli.context.clone();
        }
        if let Some(minutes) = cli.build_timeout_minutes {
            self.wait.build_timeout = Duration::from_secs(minutes.saturating_mul(60));
        }
        if let Some(ref dir) = cli.output_dir {
            self.transfer.output_dir = dir.clone();
        }
        if cli.quiet {
            self.transfer.progress = false;
        }
        self.sources.push(ConfigOrigin::Cli);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.kubectl.request_timeout.is_zero() {
            return Err(ConfigError::Zero {
                field: "request_timeout",
            });
        }
        self.wait.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.wait.delete_interval, Duration::from_secs(2));
        assert_eq!(config.wait.delete_timeout, Duration::from_secs(30));
        assert_eq!(config.wait.sandbox_interval, Duration::from_secs(5));
        assert_eq!(config.wait.sandbox_timeout, Duration::from_secs(120));
        assert_eq!(config.wait.build_interval, Duration::from_secs(10));
        assert_eq!(config.wait.build_timeout, Duration::from_secs(3600));
        assert_eq!(config.transfer.remote_root, "/workspace/shared");
        assert_eq!(config.transfer.artifact_container, "fileserver");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace = \"from-file\"\n[wait]\nbuild_timeout_minutes = 5").unwrap();

        let cli = CliOverrides {
            namespace: Some("from-cli".to_string()),
            ..CliOverrides::default()
        };
        let config = ClientConfig::load(Some(file.path()), &cli).unwrap();

        assert_eq!(config.namespace, "from-cli");
        assert_eq!(config.wait.build_timeout, Duration::from_secs(300));
        assert_eq!(
            config.sources,
            vec![
                ConfigOrigin::Builtin,
                ConfigOrigin::File(file.path().to_path_buf()),
                ConfigOrigin::Cli
            ]
        );
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = ClientConfig::load(Some(Path::new("/nonexistent/caib.toml")), &CliOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_quiet_disables_progress() {
        let mut config = ClientConfig::default();
        config.apply_cli(&CliOverrides {
            quiet: true,
            ..CliOverrides::default()
        });
        assert!(!config.transfer.progress);
    }

    #[test]
    fn test_huge_build_timeout_saturates() {
        let mut config = ClientConfig::default();
        config.apply_cli(&CliOverrides {
            build_timeout_minutes: Some(u64::MAX),
            ..CliOverrides::default()
        });
        assert_eq!(config.wait.build_timeout, Duration::from_secs(u64::MAX));

        let file = FileConfig::from_toml(&format!("[wait]\nbuild_timeout_minutes = {}\n", i64::MAX)).unwrap();
        config.apply_file(&file);
        assert_eq!(config.wait.build_timeout, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_wait_validation() {
        let ok = WaitConfig::uniform(Duration::from_millis(5), Duration::from_millis(50));
        assert!(ok.validate().is_ok());

        let zero = WaitConfig::uniform(Duration::ZERO, Duration::from_millis(50));
        assert!(matches!(zero.validate(), Err(ConfigError::Zero { field: "delete_interval" })));

        let mut inverted = WaitConfig::default();
        inverted.build_interval = Duration::from_secs(120);
        inverted.build_timeout = Duration::from_secs(60);
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::IntervalExceedsTimeout { interval_field: "build_interval", .. })
        ));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let mut config = ClientConfig::default();
        config.namespace = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyNamespace)));
    }
}
