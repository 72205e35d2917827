//! Mock Cluster
//!
//! In-process stand-ins for the two cluster seams, used by unit and
//! integration tests:
//!
//! - [`MockStore`]: resource store with deletion lag, scripted build
//!   statuses and update failure injection
//! - [`MockSandbox`]: remote exec over an in-memory filesystem
//!
//! [`MockCluster`] bundles both with a shared namespace and can play the
//! operator's part by starting sandboxes for builds.

mod sandbox;
mod store;

pub use sandbox::{MockFile, MockSandbox};
pub use store::MockStore;

use std::collections::BTreeMap;
use std::io::{Read, Write};

use caib_api::{ConfigMap, ImageBuild, ImageBuildStatus, Phase, Pod, SandboxRole};

use crate::host::exec::{ExecError, ExecTarget, RemoteExec};
use crate::host::store::{ResourceStore, StoreError};

/// Mock store plus mock sandbox
#[derive(Debug, Clone, Default)]
pub struct MockCluster {
    pub store: MockStore,
    pub sandbox: MockSandbox,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds needing uploads get a running upload pod on creation.
    pub fn with_upload_pods(self) -> Self {
        self.store.auto_upload_pods();
        self
    }

    /// Start a running artifact server for `build_name` holding `contents`
    /// at `remote_path`.
    pub fn serve_artifact(&self, namespace: &str, build_name: &str, remote_path: &str, contents: impl Into<Vec<u8>>) {
        self.store
            .add_sandbox(namespace, build_name, SandboxRole::ArtifactServer, "fileserver", "Running");
        self.sandbox.put_file(remote_path, contents);
    }

    /// Script `build_name` to run once and then complete.
    pub fn complete_after_running(&self, build_name: &str) {
        self.store.script_statuses(
            build_name,
            [
                status(Phase::Running, "building image"),
                status(Phase::Completed, "build completed"),
            ],
        );
    }
}

/// Status with the given phase and message
pub fn status(phase: Phase, message: &str) -> ImageBuildStatus {
    ImageBuildStatus {
        phase,
        message: message.to_string(),
        ..ImageBuildStatus::default()
    }
}

impl ResourceStore for MockCluster {
    fn get_build(&self, namespace: &str, name: &str) -> Result<Option<ImageBuild>, StoreError> {
        self.store.get_build(namespace, name)
    }

    fn list_builds(&self, namespace: &str) -> Result<Vec<ImageBuild>, StoreError> {
        self.store.list_builds(namespace)
    }

    fn create_build(&self, build: &ImageBuild) -> Result<ImageBuild, StoreError> {
        self.store.create_build(build)
    }

    fn delete_build(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.store.delete_build(namespace, name)
    }

    fn patch_build_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<ImageBuild, StoreError> {
        self.store.patch_build_annotations(namespace, name, annotations)
    }

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        self.store.get_config_map(namespace, name)
    }

    fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.store.create_config_map(config_map)
    }

    fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.store.update_config_map(config_map)
    }

    fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.store.delete_config_map(namespace, name)
    }

    fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, StoreError> {
        self.store.list_pods(namespace, labels)
    }
}

impl RemoteExec for MockCluster {
    fn exec(
        &self,
        target: &ExecTarget,
        argv: &[&str],
        stdin: Option<&mut (dyn Read + Send)>,
        stdout: &mut dyn Write,
    ) -> Result<Vec<u8>, ExecError> {
        self.sandbox.exec(target, argv, stdin, stdout)
    }
}
