//! Bounded polling
//!
//! One loop shape for every wait in the client: probe, sleep `interval`,
//! repeat until the probe reports done or `timeout` of wall-clock time has
//! passed. Each probe is one blocking round trip; there is no other
//! suspension point and no early cancellation short of process exit.

use std::thread::sleep;
use std::time::{Duration, Instant};

/// Result of a single probe
#[derive(Debug)]
pub enum Probe<T> {
    /// Stop polling with this value
    Done(T),
    /// Keep polling; the observed value (if any) replaces the last one kept
    Pending(Option<T>),
}

/// How a poll loop ended without error
#[derive(Debug)]
pub enum PollOutcome<T> {
    Ready(T),
    /// The deadline passed first. `last` is the most recent observed value.
    TimedOut { last: Option<T>, elapsed: Duration },
}

/// Poll loop parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
    /// Probe before the first sleep
    pub immediate: bool,
}

impl Poller {
    /// Probe right away, then every `interval`
    pub fn immediate(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: true,
        }
    }

    /// Sleep one `interval` before the first probe
    pub fn delayed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: false,
        }
    }

    /// Run `probe` until it is done, errors, or the deadline passes.
    ///
    /// The probe always runs at least once. A further probe is only
    /// scheduled when a full interval still fits before the deadline.
    pub fn until<T, E, F>(&self, mut probe: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Result<Probe<T>, E>,
    {
        let start = Instant::now();
        let mut last = None;

        if !self.immediate {
            sleep(self.interval);
        }

        loop {
            match probe()? {
                Probe::Done(value) => return Ok(PollOutcome::Ready(value)),
                Probe::Pending(observed) => {
                    if observed.is_some() {
                        last = observed;
                    }
                }
            }

            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining < self.interval {
                return Ok(PollOutcome::TimedOut {
                    last,
                    elapsed: start.elapsed(),
                });
            }
            sleep(self.interval);
        }
    }
}
