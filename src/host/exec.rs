//! Remote Execution Channel
//!
//! Runs one command inside a sandbox container to completion. Every remote
//! operation (directory creation, size probe, streamed read, archive
//! extraction) goes through the single [`RemoteExec::exec`] primitive.

use std::fmt;
use std::io::{self, Read, Write};

use super::transport::{Kubectl, KubectlError};

/// Container addressed by remote commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl ExecTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod, self.container)
    }
}

/// Buffered result of a completed remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Remote execution errors
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The command ran but did not succeed, or the channel broke.
    #[error("exec `{command}` in {target} failed: {reason}, stderr: {stderr}")]
    Failed {
        target: String,
        command: String,
        reason: String,
        stderr: String,
    },

    #[error("local I/O error during exec: {0}")]
    Io(#[from] io::Error),
}

impl ExecError {
    pub fn failed(target: &ExecTarget, argv: &[&str], reason: impl Into<String>, stderr: impl Into<String>) -> Self {
        ExecError::Failed {
            target: target.to_string(),
            command: argv.join(" "),
            reason: reason.into(),
            stderr: stderr.into(),
        }
    }

    /// Captured remote stderr, if the command got far enough to produce any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecError::Failed { stderr, .. } => Some(stderr),
            ExecError::Io(_) => None,
        }
    }
}

/// Remote execution channel
pub trait RemoteExec: Send + Sync {
    /// Run `argv` in `target` to completion.
    ///
    /// `stdin` is attached only when given. Stdout is written to `stdout` as
    /// it arrives. Returns captured stderr on success; any non-success exit
    /// is an error carrying stderr.
    fn exec(
        &self,
        target: &ExecTarget,
        argv: &[&str],
        stdin: Option<&mut (dyn Read + Send)>,
        stdout: &mut dyn Write,
    ) -> Result<Vec<u8>, ExecError>;

    /// Run a plain command without stdin and buffer its output.
    fn run(&self, target: &ExecTarget, argv: &[&str]) -> Result<ExecOutput, ExecError> {
        let mut stdout = Vec::new();
        let stderr = self.exec(target, argv, None, &mut stdout)?;
        Ok(ExecOutput { stdout, stderr })
    }
}

/// Remote exec over `kubectl exec`
#[derive(Debug, Clone)]
pub struct KubectlExec {
    kubectl: Kubectl,
}

impl KubectlExec {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    fn build_exec_args(target: &ExecTarget, argv: &[&str], interactive: bool) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if interactive {
            args.push("-i".to_string());
        }
        args.extend([
            "-n".to_string(),
            target.namespace.clone(),
            target.pod.clone(),
            "-c".to_string(),
            target.container.clone(),
            "--".to_string(),
        ]);
        args.extend(argv.iter().map(|a| a.to_string()));
        args
    }
}

impl RemoteExec for KubectlExec {
    fn exec(
        &self,
        target: &ExecTarget,
        argv: &[&str],
        stdin: Option<&mut (dyn Read + Send)>,
        stdout: &mut dyn Write,
    ) -> Result<Vec<u8>, ExecError> {
        let args = Self::build_exec_args(target, argv, stdin.is_some());
        match self.kubectl.stream(&args, stdin, stdout) {
            Ok(stderr) => Ok(stderr),
            Err(KubectlError::Failed { status, stderr, .. }) => {
                Err(ExecError::failed(target, argv, status, stderr))
            }
            Err(KubectlError::Io(e)) => Err(ExecError::Io(e)),
            Err(other) => Err(ExecError::failed(target, argv, other.to_string(), "")),
        }
    }
}
