//! Completion Watcher
//!
//! Two waits share the [`Poller`] loop:
//!
//! - sandbox readiness: the first running pod with the build's labels
//! - build completion: the build's phase reaching Completed or Failed
//!
//! Build status is edge-triggered: a `status:` line is written only when
//! the phase or message changed since the previous poll, and a `.` marks
//! each unchanged poll.

use std::collections::BTreeMap;
use std::io::{self, Write};

use caib_api::{ImageBuild, Phase, Pod, SandboxRole, APP_NAME_LABEL, BUILD_NAME_LABEL};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{CaibError, Result};
use crate::host::store::{ResourceStore, StoreError};
use crate::poll::{PollOutcome, Poller, Probe};

/// Labels selecting the `role` sandbox of `build_name`
pub fn sandbox_labels(build_name: &str, role: SandboxRole) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(BUILD_NAME_LABEL.to_string(), build_name.to_string());
    labels.insert(APP_NAME_LABEL.to_string(), role.label_value().to_string());
    labels
}

/// Wait until a `role` sandbox of `build_name` reports Running.
pub fn wait_for_sandbox(
    store: &dyn ResourceStore,
    config: &ClientConfig,
    build_name: &str,
    role: SandboxRole,
    out: &mut dyn Write,
) -> Result<Pod> {
    info!(build = build_name, %role, "waiting for sandbox to be ready");
    let labels = sandbox_labels(build_name, role);
    let poller = Poller::delayed(config.wait.sandbox_interval, config.wait.sandbox_timeout);

    let outcome = poller.until(|| -> Result<Probe<Pod>> {
        let pods = store.list_pods(&config.namespace, &labels)?;
        if let Some(pod) = pods.into_iter().find(Pod::is_running) {
            return Ok(Probe::Done(pod));
        }
        write!(out, ".").and_then(|_| out.flush()).map_err(write_error)?;
        Ok(Probe::Pending(None))
    });

    match outcome? {
        PollOutcome::Ready(pod) => {
            writeln!(out).map_err(write_error)?;
            info!(pod = pod.name(), %role, "sandbox is ready");
            Ok(pod)
        }
        PollOutcome::TimedOut { elapsed, .. } => {
            writeln!(out).map_err(write_error)?;
            Err(CaibError::Timeout {
                what: format!("{} of build {}", role, build_name),
                elapsed,
            })
        }
    }
}

/// Edge-triggered status line writer
pub struct StatusReporter<'a> {
    out: &'a mut dyn Write,
    last: Option<(Phase, String)>,
    marker_open: bool,
}

impl<'a> StatusReporter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            last: None,
            marker_open: false,
        }
    }

    /// Report one poll; returns true if a full status line was written.
    pub fn observe(&mut self, phase: Phase, message: &str) -> io::Result<bool> {
        let unchanged = matches!(&self.last, Some((p, m)) if *p == phase && m == message);
        if unchanged {
            write!(self.out, ".")?;
            self.out.flush()?;
            self.marker_open = true;
            return Ok(false);
        }

        if self.marker_open {
            writeln!(self.out)?;
            self.marker_open = false;
        }
        writeln!(self.out, "status: {} - {}", phase, message)?;
        self.last = Some((phase, message.to_string()));
        Ok(true)
    }

    /// Terminate a trailing run of markers.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.marker_open {
            writeln!(self.out)?;
            self.marker_open = false;
        }
        Ok(())
    }
}

/// Poll the build until it completes, fails, or the build timeout passes.
///
/// On timeout the error carries the last fetched build.
pub fn wait_for_build_completion(
    store: &dyn ResourceStore,
    config: &ClientConfig,
    name: &str,
    out: &mut dyn Write,
) -> Result<ImageBuild> {
    let timeout = config.wait.build_timeout;
    info!(build = name, timeout_minutes = timeout.as_secs() / 60, "waiting for build to complete");

    let poller = Poller::delayed(config.wait.build_interval, timeout);
    let mut reporter = StatusReporter::new(out);

    let outcome = poller.until(|| -> Result<Probe<ImageBuild>> {
        let build = store
            .get_build(&config.namespace, name)?
            .ok_or_else(|| StoreError::NotFound {
                kind: "ImageBuild",
                name: name.to_string(),
            })?;

        let phase = build.phase();
        debug!(build = name, %phase, "polled build status");
        if phase == Phase::Failed {
            return Err(CaibError::BuildFailed {
                name: name.to_string(),
                message: build.status.message.clone(),
            });
        }

        reporter
            .observe(phase, &build.status.message)
            .map_err(write_error)?;
        if phase == Phase::Completed {
            Ok(Probe::Done(build))
        } else {
            Ok(Probe::Pending(Some(build)))
        }
    });

    reporter.finish().map_err(write_error)?;

    match outcome? {
        PollOutcome::Ready(build) => Ok(build),
        PollOutcome::TimedOut { last, .. } => Err(CaibError::BuildTimeout {
            name: name.to_string(),
            timeout,
            last: last.map(Box::new),
        }),
    }
}

fn write_error(e: io::Error) -> CaibError {
    CaibError::io("error writing status output", e)
}
