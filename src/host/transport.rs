//! kubectl transport
//!
//! Wraps the `kubectl` binary the same way for every cluster interaction:
//! resource-store calls and remote exec share one argument builder and one
//! spawn/pump routine, so transport tuning (kubeconfig, context, request
//! timeout) is applied identically to uploads, downloads and plain calls.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::{DEFAULT_KUBECTL, DEFAULT_REQUEST_TIMEOUT};

/// kubectl transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubectlConfig {
    /// Binary to execute (default "kubectl" on PATH)
    pub binary: String,
    /// Explicit kubeconfig; kubectl's own discovery applies when unset
    pub kubeconfig: Option<PathBuf>,
    /// Explicit kubeconfig context
    pub context: Option<String>,
    /// Server request timeout for every invocation
    pub request_timeout: Duration,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_KUBECTL.to_string(),
            kubeconfig: None,
            context: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum KubectlError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn { binary: String, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("kubectl {command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("invalid JSON from kubectl {command}: {source}")]
    Json {
        command: String,
        source: serde_json::Error,
    },
}

impl KubectlError {
    /// Captured stderr of a failed invocation
    pub fn stderr(&self) -> Option<&str> {
        match self {
            KubectlError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// kubectl process runner
#[derive(Debug, Clone)]
pub struct Kubectl {
    config: KubectlConfig,
}

impl Kubectl {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    /// Global arguments prepended to every invocation
    fn build_base_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref kubeconfig) = self.config.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        if let Some(ref context) = self.config.context {
            args.push(format!("--context={}", context));
        }
        args.push(format!(
            "--request-timeout={}s",
            self.config.request_timeout.as_secs()
        ));

        args
    }

    /// Run kubectl with `args`, streaming stdout into `stdout`.
    ///
    /// `stdin`, when given, is pumped on a scoped thread so a large input
    /// cannot deadlock against output the child produces. Returns captured
    /// stderr on success.
    pub fn stream(
        &self,
        args: &[String],
        stdin: Option<&mut (dyn Read + Send)>,
        stdout: &mut dyn Write,
    ) -> Result<Vec<u8>, KubectlError> {
        let command = args.join(" ");
        debug!(binary = %self.config.binary, %command, "spawning kubectl");

        let mut child = Command::new(&self.config.binary)
            .args(self.build_base_args())
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| KubectlError::Spawn {
                binary: self.config.binary.clone(),
                source,
            })?;

        let child_stdin = child.stdin.take();
        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "kubectl stdout not captured"))?;
        let mut child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "kubectl stderr not captured"))?;

        let (copied, fed, stderr) = thread::scope(|s| {
            let feeder = match (stdin, child_stdin) {
                (Some(reader), Some(mut pipe)) => Some(s.spawn(move || -> io::Result<u64> {
                    let n = io::copy(reader, &mut pipe)?;
                    pipe.flush()?;
                    // dropping the pipe signals EOF to the remote side
                    drop(pipe);
                    Ok(n)
                })),
                _ => None,
            };
            let collector = s.spawn(move || -> io::Result<Vec<u8>> {
                let mut buf = Vec::new();
                child_stderr.read_to_end(&mut buf)?;
                Ok(buf)
            });

            let copied = drain_stdout(child_stdout, stdout);
            if let Err(ref e) = copied {
                // nobody reads stdout any more, so the child could block forever
                debug!(error = %e, "local output failed, killing kubectl");
                if let Err(kill_err) = child.kill() {
                    debug!(error = %kill_err, "kill failed");
                }
            }
            let fed = feeder.map(|h| h.join().unwrap_or_else(|_| Err(panicked("stdin feeder"))));
            let stderr = collector
                .join()
                .unwrap_or_else(|_| Err(panicked("stderr collector")));
            (copied, fed, stderr)
        });

        let status = child.wait()?;
        copied?;
        let stderr = stderr?;

        if !status.success() {
            return Err(KubectlError::Failed {
                command,
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        if let Some(fed) = fed {
            fed?;
        }
        Ok(stderr)
    }

    /// Run kubectl and buffer stdout.
    pub fn output(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Vec<u8>, KubectlError> {
        let mut stdout = Vec::new();
        match stdin {
            Some(bytes) => {
                let mut reader = bytes;
                self.stream(args, Some(&mut reader), &mut stdout)?;
            }
            None => {
                self.stream(args, None, &mut stdout)?;
            }
        }
        Ok(stdout)
    }

    /// Run kubectl and decode stdout as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(
        &self,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<T, KubectlError> {
        let stdout = self.output(args, stdin)?;
        serde_json::from_slice(&stdout).map_err(|source| KubectlError::Json {
            command: args.join(" "),
            source,
        })
    }
}

/// Copy all of the child's stdout into `out`; the pipe closes on return.
fn drain_stdout(mut child_stdout: ChildStdout, out: &mut dyn Write) -> io::Result<u64> {
    let n = io::copy(&mut child_stdout, out)?;
    out.flush()?;
    Ok(n)
}

fn panicked(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{} thread panicked", what))
}

/// Convert borrowed argument literals into owned argv
pub fn argv<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter().map(Into::into).collect()
}
