//! Artifact download
//!
//! Fetches the finished image of a completed build from its artifact
//! server sandbox into the local output directory.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use caib_api::{ImageBuild, Phase, Pod, SandboxRole};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{CaibError, Result};
use crate::host::exec::{ExecTarget, RemoteExec};
use crate::host::store::{ResourceStore, StoreError};
use crate::transfer::{download_file, remote_join};
use crate::watch::{sandbox_labels, wait_for_sandbox};

/// Download the artifact of `build` into the configured output directory.
///
/// Returns the local path written.
pub fn download_artifact(
    store: &dyn ResourceStore,
    exec: &dyn RemoteExec,
    config: &ClientConfig,
    build: &ImageBuild,
    out: &mut dyn Write,
) -> Result<PathBuf> {
    let name = build.name();
    let pod = find_artifact_pod(store, config, name, out)?;

    let file_name = build.artifact_file_name();
    let remote_path = remote_join(&config.transfer.remote_root, &file_name);
    let output_dir = &config.transfer.output_dir;
    fs::create_dir_all(output_dir)
        .map_err(|e| CaibError::io(format!("error creating output directory {}", output_dir.display()), e))?;
    let local = output_dir.join(&file_name);

    let target = ExecTarget::new(&config.namespace, pod.name(), &config.transfer.artifact_container);
    info!(remote = %remote_path, local = %local.display(), pod = pod.name(), "downloading artifact");

    let bytes = download_file(exec, &target, &remote_path, &local, config.transfer.progress)?;
    info!(
        path = %local.display(),
        size_mb = %format!("{:.2}", bytes as f64 / (1024.0 * 1024.0)),
        "artifact downloaded"
    );
    Ok(local)
}

/// Look up `name`, require it to be Completed, then download its artifact.
pub fn download_completed_build(
    store: &dyn ResourceStore,
    exec: &dyn RemoteExec,
    config: &ClientConfig,
    name: &str,
    out: &mut dyn Write,
) -> Result<PathBuf> {
    let build = store
        .get_build(&config.namespace, name)?
        .ok_or_else(|| StoreError::NotFound {
            kind: "ImageBuild",
            name: name.to_string(),
        })?;

    let phase = build.phase();
    if phase != Phase::Completed {
        return Err(CaibError::NotCompleted {
            name: name.to_string(),
            phase,
        });
    }

    download_artifact(store, exec, config, &build, out)
}

/// A running artifact pod for `build_name`.
///
/// No pod at all means the build was not served; pods that exist but are
/// still starting are waited for.
fn find_artifact_pod(
    store: &dyn ResourceStore,
    config: &ClientConfig,
    build_name: &str,
    out: &mut dyn Write,
) -> Result<Pod> {
    let labels = sandbox_labels(build_name, SandboxRole::ArtifactServer);
    let pods = store.list_pods(&config.namespace, &labels)?;

    if pods.is_empty() {
        return Err(CaibError::NoSandbox {
            build: build_name.to_string(),
            role: SandboxRole::ArtifactServer,
        });
    }
    if let Some(pod) = pods.into_iter().find(Pod::is_running) {
        return Ok(pod);
    }

    wait_for_sandbox(store, config, build_name, SandboxRole::ArtifactServer, out)
}
