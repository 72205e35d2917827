//! Host-Side Cluster Access
//!
//! Everything the client does against the cluster goes through two seams:
//! [`ResourceStore`] for declarative resources and [`RemoteExec`] for
//! commands inside sandbox pods. The kubectl-backed implementations share
//! one [`Kubectl`] transport; tests substitute [`crate::mock::MockCluster`].

pub mod exec;
pub mod store;
pub mod transport;

pub use exec::{ExecError, ExecOutput, ExecTarget, KubectlExec, RemoteExec};
pub use store::{KubectlStore, ResourceStore, StoreError};
pub use transport::{Kubectl, KubectlConfig, KubectlError};
