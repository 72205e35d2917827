//! Built-in client defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use std::time::Duration;

/// Namespace used when neither the config file nor the CLI names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// kubectl binary looked up on PATH
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// Per-invocation transport timeout (30 minutes), applied to every kubectl call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Delete-then-await-absence poll interval
pub const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Delete-then-await-absence bound
pub const DELETE_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload/artifact sandbox readiness poll interval
pub const SANDBOX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upload/artifact sandbox readiness bound (2 minutes)
pub const SANDBOX_POLL_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Build status poll interval
pub const BUILD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Build completion bound (60 minutes)
pub const BUILD_POLL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Directory inside sandboxes that uploads land in and artifacts are served from
pub const REMOTE_ROOT: &str = "/workspace/shared";

/// Container of the artifact-serving pod
pub const ARTIFACT_CONTAINER: &str = "fileserver";

/// Local directory downloaded artifacts are written to
pub const OUTPUT_DIR: &str = "./output";

/// Host config location relative to $HOME
pub const HOST_CONFIG_PATH: &str = ".config/caib/config.toml";
