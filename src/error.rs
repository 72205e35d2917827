//! Top-level error type and exit-code mapping.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use caib_api::{ImageBuild, Phase, SandboxRole};

use crate::config::ConfigError;
use crate::host::exec::ExecError;
use crate::host::store::StoreError;

/// Failure kind for exit code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Anything not covered below (exit code 1)
    General = 1,
    /// Bad flags, config or inputs (exit code 2)
    Usage = 2,
    /// Resource store or remote exec failures (exit code 20)
    Transport = 20,
    /// A bounded wait expired (exit code 30)
    Timeout = 30,
    /// The operator reported the build as failed (exit code 40)
    BuildFailed = 40,
    /// Downloaded artifact did not match the remote size (exit code 70)
    Integrity = 70,
}

#[derive(Debug, thiserror::Error)]
pub enum CaibError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    RemoteExecution(#[from] ExecError),

    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    /// The build never reached a terminal phase. `last` is the most recent
    /// object fetched before the deadline.
    #[error("timed out after {timeout:?} waiting for build {name} to complete")]
    BuildTimeout {
        name: String,
        timeout: Duration,
        last: Option<Box<ImageBuild>>,
    },

    #[error("build failed: {message}")]
    BuildFailed { name: String, message: String },

    #[error("build {name} is not completed (status: {phase}), cannot download artifacts")]
    NotCompleted { name: String, phase: Phase },

    #[error("no {role} found for build {build}")]
    NoSandbox { build: String, role: SandboxRole },

    #[error("error parsing file size of {path}: {output:?}")]
    InvalidSize { path: String, output: String },

    #[error("incomplete download of {}: got {actual} bytes, expected {expected} bytes", .path.display())]
    Integrity {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl CaibError {
    /// Wrap an I/O error with what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        CaibError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CaibError::Config(_) | CaibError::InvalidInput(_) => FailureKind::Usage,
            CaibError::Store(_) | CaibError::RemoteExecution(_) => FailureKind::Transport,
            CaibError::Timeout { .. } | CaibError::BuildTimeout { .. } => FailureKind::Timeout,
            CaibError::BuildFailed { .. } => FailureKind::BuildFailed,
            CaibError::InvalidSize { .. } | CaibError::Integrity { .. } => FailureKind::Integrity,
            CaibError::NotCompleted { .. } | CaibError::NoSandbox { .. } | CaibError::Io { .. } => {
                FailureKind::General
            }
        }
    }

    /// Get exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.failure_kind() as i32
    }

    /// Last build object observed before a build wait gave up, if any.
    pub fn last_observed(&self) -> Option<&ImageBuild> {
        match self {
            CaibError::BuildTimeout { last, .. } => last.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaibError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let timeout = CaibError::Timeout {
            what: "upload pod".to_string(),
            elapsed: Duration::from_secs(120),
        };
        assert_eq!(timeout.exit_code(), 30);

        let failed = CaibError::BuildFailed {
            name: "demo".to_string(),
            message: "osbuild exited 1".to_string(),
        };
        assert_eq!(failed.exit_code(), 40);
        assert_eq!(failed.to_string(), "build failed: osbuild exited 1");

        let integrity = CaibError::Integrity {
            path: PathBuf::from("out/disk.raw"),
            expected: 10,
            actual: 4,
        };
        assert_eq!(integrity.exit_code(), 70);
        assert_eq!(
            integrity.to_string(),
            "incomplete download of out/disk.raw: got 4 bytes, expected 10 bytes"
        );

        assert_eq!(CaibError::InvalidInput("--name".to_string()).exit_code(), 2);
    }

    #[test]
    fn test_last_observed_only_on_build_timeout() {
        let err = CaibError::BuildTimeout {
            name: "demo".to_string(),
            timeout: Duration::from_secs(1),
            last: None,
        };
        assert!(err.last_observed().is_none());
        assert!(CaibError::InvalidInput("x".to_string()).last_observed().is_none());
    }
}
