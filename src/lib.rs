//! caib - Automotive image build client
//!
//! Submits ImageBuild requests to the cluster, uploads the local files a
//! manifest references into the build's upload sandbox, follows the build
//! to a terminal phase, and downloads the finished artifact.

pub mod artifact;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod mock;
pub mod poll;
pub mod report;
pub mod transfer;
pub mod watch;

pub use artifact::{download_artifact, download_completed_build};
pub use config::{CliOverrides, ClientConfig, ConfigError, TransferConfig, WaitConfig};
pub use error::{CaibError, FailureKind, Result};
pub use host::{ExecTarget, KubectlExec, KubectlStore, RemoteExec, ResourceStore};
pub use lifecycle::{run_build, submit_build, BuildParams, Submission};
pub use manifest::{find_local_file_references, LocalFileRef};
pub use poll::{PollOutcome, Poller, Probe};
pub use watch::{wait_for_build_completion, wait_for_sandbox};
