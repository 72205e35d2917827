//! Resource Lifecycle Manager
//!
//! Makes build submission idempotent. A build name is a singleton slot: an
//! existing ImageBuild or manifest ConfigMap of the same name is deleted and
//! its absence awaited before anything is recreated, so a terminating object
//! can never shadow the new one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use caib_api::{
    config_map_name, ConfigMap, ImageBuild, ImageBuildSpec, ObjectMeta, SandboxRole,
    UPLOADS_COMPLETE_ANNOTATION,
};
use tracing::{info, warn};

use crate::artifact::download_artifact;
use crate::config::ClientConfig;
use crate::error::{CaibError, Result};
use crate::host::exec::{ExecTarget, RemoteExec};
use crate::host::store::ResourceStore;
use crate::manifest::{find_local_file_references, LocalFileRef};
use crate::poll::{PollOutcome, Poller, Probe};
use crate::transfer::upload_local_files;
use crate::watch::{wait_for_build_completion, wait_for_sandbox};

pub const DEFAULT_DISTRO: &str = "cs9";
pub const DEFAULT_TARGET: &str = "qemu";
pub const DEFAULT_ARCHITECTURE: &str = "arm64";
pub const DEFAULT_EXPORT_FORMAT: &str = "image";
pub const DEFAULT_MODE: &str = "image";
pub const DEFAULT_BUILDER_IMAGE: &str = "quay.io/centos-sig-automotive/automotive-osbuild:latest";
pub const DEFAULT_SERVE_EXPIRY_HOURS: u32 = 24;

/// What to build, as requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    pub name: String,
    pub manifest: PathBuf,
    pub distro: String,
    pub target: String,
    pub architecture: String,
    pub export_format: String,
    pub mode: String,
    pub builder_image: String,
    pub storage_class: String,
    pub serve_expiry_hours: u32,
    /// Wait for the build to reach a terminal phase
    pub wait: bool,
    /// Download the artifact once completed; implies serving it
    pub download: bool,
}

impl BuildParams {
    pub fn new(name: impl Into<String>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            manifest: manifest.into(),
            distro: DEFAULT_DISTRO.to_string(),
            target: DEFAULT_TARGET.to_string(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            export_format: DEFAULT_EXPORT_FORMAT.to_string(),
            mode: DEFAULT_MODE.to_string(),
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            storage_class: String::new(),
            serve_expiry_hours: DEFAULT_SERVE_EXPIRY_HOURS,
            wait: false,
            download: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CaibError::InvalidInput("--name is required".to_string()));
        }
        if self.manifest.as_os_str().is_empty() {
            return Err(CaibError::InvalidInput("--manifest is required".to_string()));
        }
        Ok(())
    }

    /// Key the manifest is stored under in its ConfigMap
    pub fn manifest_file_name(&self) -> Result<String> {
        self.manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CaibError::InvalidInput(format!("manifest path {} has no file name", self.manifest.display()))
            })
    }

    pub fn to_spec(&self, manifest_config_map: &str, has_local_files: bool) -> ImageBuildSpec {
        ImageBuildSpec {
            distro: self.distro.clone(),
            target: self.target.clone(),
            architecture: self.architecture.clone(),
            export_format: self.export_format.clone(),
            mode: self.mode.clone(),
            builder_image: self.builder_image.clone(),
            storage_class: self.storage_class.clone(),
            serve_artifact: self.download,
            serve_expiry_hours: self.serve_expiry_hours,
            manifest_config_map: manifest_config_map.to_string(),
            input_files_server: has_local_files,
        }
    }
}

/// Resources left behind by a successful submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub build: ImageBuild,
    pub config_map_name: String,
    pub local_files: Vec<LocalFileRef>,
    /// Whether the ConfigMap now cascades with the build
    pub owner_linked: bool,
}

/// Delete `name` if it exists and wait until lookups stop finding it.
fn delete_and_await_absence<L, D>(config: &ClientConfig, kind: &str, name: &str, lookup: L, delete: D) -> Result<()>
where
    L: Fn() -> Result<bool>,
    D: FnOnce() -> Result<()>,
{
    if !lookup()? {
        return Ok(());
    }

    info!(kind, name, "deleting existing resource");
    delete()?;

    info!(kind, name, "waiting for deletion");
    let poller = Poller::immediate(config.wait.delete_interval, config.wait.delete_timeout);
    let outcome = poller.until(|| -> Result<Probe<()>> {
        if lookup()? {
            Ok(Probe::Pending(None))
        } else {
            Ok(Probe::Done(()))
        }
    })?;

    match outcome {
        PollOutcome::Ready(()) => Ok(()),
        PollOutcome::TimedOut { elapsed, .. } => Err(CaibError::Timeout {
            what: format!("{} {} to be deleted", kind, name),
            elapsed,
        }),
    }
}

/// Tear down an existing build of this name, waiting for it to be gone.
pub fn replace_build(store: &dyn ResourceStore, config: &ClientConfig, name: &str) -> Result<()> {
    let ns = config.namespace.as_str();
    delete_and_await_absence(
        config,
        "ImageBuild",
        name,
        || Ok(store.get_build(ns, name)?.is_some()),
        || match store.delete_build(ns, name) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map_err(CaibError::from),
        },
    )
}

/// Tear down an existing manifest ConfigMap, waiting for it to be gone.
pub fn replace_config_map(store: &dyn ResourceStore, config: &ClientConfig, name: &str) -> Result<()> {
    let ns = config.namespace.as_str();
    delete_and_await_absence(
        config,
        "ConfigMap",
        name,
        || Ok(store.get_config_map(ns, name)?.is_some()),
        || match store.delete_config_map(ns, name) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map_err(CaibError::from),
        },
    )
}

/// Make the ConfigMap cascade-delete with `build`.
///
/// Returns false, after logging a warning, when the link could not be
/// written; the build proceeds either way.
pub fn link_owner(
    store: &dyn ResourceStore,
    config: &ClientConfig,
    build: &ImageBuild,
    config_map_name: &str,
) -> Result<bool> {
    let Some(owner) = build.owner_reference() else {
        warn!(build = build.name(), "created build has no uid, ConfigMap will not cascade");
        return Ok(false);
    };

    let Some(mut config_map) = store.get_config_map(&config.namespace, config_map_name)? else {
        warn!(config_map = config_map_name, "ConfigMap disappeared before owner update");
        return Ok(false);
    };

    config_map.metadata.owner_references = vec![owner];
    match store.update_config_map(&config_map) {
        Ok(_) => Ok(true),
        Err(e) => {
            warn!(config_map = config_map_name, error = %e, "failed to update ConfigMap with owner reference");
            Ok(false)
        }
    }
}

/// Set the annotation that releases a build held for uploads.
pub fn mark_uploads_complete(store: &dyn ResourceStore, config: &ClientConfig, name: &str) -> Result<ImageBuild> {
    let mut annotations = BTreeMap::new();
    annotations.insert(UPLOADS_COMPLETE_ANNOTATION.to_string(), "true".to_string());
    let build = store.patch_build_annotations(&config.namespace, name, &annotations)?;
    info!(build = name, "file uploads marked as complete, build will proceed");
    Ok(build)
}

/// Submit a build: replace old resources, create the ConfigMap and build,
/// link them, and upload any local files the manifest references.
pub fn submit_build(
    store: &dyn ResourceStore,
    exec: &dyn RemoteExec,
    config: &ClientConfig,
    params: &BuildParams,
    out: &mut dyn Write,
) -> Result<Submission> {
    params.validate()?;
    let ns = config.namespace.as_str();
    let file_name = params.manifest_file_name()?;
    let manifest = fs::read_to_string(&params.manifest)
        .map_err(|e| CaibError::io(format!("error reading manifest file {}", params.manifest.display()), e))?;

    replace_build(store, config, &params.name)?;

    let cm_name = config_map_name(&params.name);
    replace_config_map(store, config, &cm_name)?;

    info!(config_map = %cm_name, manifest = %file_name, "creating ConfigMap");
    store.create_config_map(&ConfigMap::with_document(
        ObjectMeta::named(&cm_name, ns),
        file_name,
        manifest.as_str(),
    ))?;

    let local_files = find_local_file_references(&manifest);

    info!(build = %params.name, "creating ImageBuild");
    let build = store.create_build(&ImageBuild::new(
        ObjectMeta::named(&params.name, ns),
        params.to_spec(&cm_name, !local_files.is_empty()),
    ))?;

    let owner_linked = link_owner(store, config, &build, &cm_name)?;

    if !local_files.is_empty() {
        info!(count = local_files.len(), "found local file references in manifest");
        let pod = wait_for_sandbox(store, config, build.name(), SandboxRole::UploadTarget, out)?;
        let container = pod.first_container().ok_or_else(|| CaibError::NoSandbox {
            build: build.name().to_string(),
            role: SandboxRole::UploadTarget,
        })?;
        let target = ExecTarget::new(ns, pod.name(), container);

        upload_local_files(exec, &target, &local_files, &config.transfer)?;
        info!("files uploaded successfully");
        mark_uploads_complete(store, config, build.name())?;
    }

    info!(build = build.name(), namespace = ns, "ImageBuild created successfully");
    Ok(Submission {
        build,
        config_map_name: cm_name,
        local_files,
        owner_linked,
    })
}

/// Submit, then optionally wait for completion and fetch the artifact.
///
/// Returns the completed build when waiting was requested.
pub fn run_build(
    store: &dyn ResourceStore,
    exec: &dyn RemoteExec,
    config: &ClientConfig,
    params: &BuildParams,
    out: &mut dyn Write,
) -> Result<Option<ImageBuild>> {
    let submission = submit_build(store, exec, config, params, out)?;
    if !params.wait {
        return Ok(None);
    }

    let completed = wait_for_build_completion(store, config, submission.build.name(), out)?;
    if params.download {
        download_artifact(store, exec, config, &completed, out)?;
    }
    Ok(Some(completed))
}
