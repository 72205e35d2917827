//! ImageBuild resource.
//!
//! The build request consumed by the operator. The client writes `spec` and
//! one annotation; `status` is owned by the operator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, OwnerReference};
use crate::naming::default_artifact_file_name;
use crate::{API_VERSION, IMAGE_BUILD_KIND};

/// Build lifecycle phase reported by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Completed,
    Failed,
    /// No phase reported yet, or a phase this client does not know.
    /// Renders as an empty string.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Phase {
    /// Returns true if the operator will not move the build any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
            Phase::Unknown => "",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuildSpec {
    #[serde(default)]
    pub distro: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub export_format: String,
    #[serde(default)]
    pub mode: String,
    /// Container image that runs osbuild.
    #[serde(default, rename = "automotiveOSBuildImage")]
    pub builder_image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class: String,
    #[serde(default)]
    pub serve_artifact: bool,
    #[serde(default)]
    pub serve_expiry_hours: u32,
    /// Name of the ConfigMap holding the manifest.
    #[serde(default)]
    pub manifest_config_map: String,
    /// Asks the operator to start an upload pod and hold the build until
    /// the uploads-complete annotation appears.
    #[serde(default)]
    pub input_files_server: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuildStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub artifact_path: String,
    #[serde(default)]
    pub artifact_file_name: String,
    #[serde(default, rename = "pvcName")]
    pub pvc_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuild {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ImageBuildSpec,
    #[serde(default, skip_serializing)]
    pub status: ImageBuildStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    IMAGE_BUILD_KIND.to_string()
}

impl ImageBuild {
    pub fn new(metadata: ObjectMeta, spec: ImageBuildSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            spec,
            status: ImageBuildStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }

    /// Owner link that makes a dependent object cascade-delete with this build.
    ///
    /// Returns `None` until the build has a server-assigned uid.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        if self.metadata.uid.is_empty() {
            return None;
        }
        Some(OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }

    /// File name of the produced artifact on the artifact server.
    pub fn artifact_file_name(&self) -> String {
        if !self.status.artifact_file_name.is_empty() {
            return self.status.artifact_file_name.clone();
        }
        default_artifact_file_name(&self.spec.distro, &self.spec.target, &self.spec.export_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ImageBuild {
        ImageBuild::new(
            ObjectMeta::named("demo", "default"),
            ImageBuildSpec {
                distro: "cs9".to_string(),
                target: "qemu".to_string(),
                architecture: "arm64".to_string(),
                export_format: "qcow2".to_string(),
                mode: "image".to_string(),
                builder_image: "quay.io/example/osbuild:latest".to_string(),
                manifest_config_map: "demo-manifest-config".to_string(),
                ..ImageBuildSpec::default()
            },
        )
    }

    #[test]
    fn test_spec_wire_names() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["apiVersion"], API_VERSION);
        assert_eq!(json["kind"], "ImageBuild");
        assert_eq!(json["spec"]["exportFormat"], "qcow2");
        assert_eq!(json["spec"]["automotiveOSBuildImage"], "quay.io/example/osbuild:latest");
        assert_eq!(json["spec"]["manifestConfigMap"], "demo-manifest-config");
        assert_eq!(json["spec"]["inputFilesServer"], false);
        // empty storage class is left for the operator to default
        assert!(json["spec"].get("storageClass").is_none());
        // status belongs to the operator
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_status_deserialization() {
        let build: ImageBuild = serde_json::from_value(json!({
            "apiVersion": API_VERSION,
            "kind": "ImageBuild",
            "metadata": {"name": "demo", "namespace": "default", "uid": "abc"},
            "spec": {"distro": "cs9"},
            "status": {
                "phase": "Completed",
                "message": "done",
                "artifactFileName": "disk.raw",
                "pvcName": "demo-pvc"
            }
        }))
        .unwrap();

        assert_eq!(build.phase(), Phase::Completed);
        assert_eq!(build.status.pvc_name, "demo-pvc");
        assert_eq!(build.artifact_file_name(), "disk.raw");
    }

    #[test]
    fn test_missing_or_unknown_phase() {
        let fresh: ImageBuild = serde_json::from_value(json!({"metadata": {"name": "x"}})).unwrap();
        assert_eq!(fresh.phase(), Phase::Unknown);

        let odd: ImageBuild =
            serde_json::from_value(json!({"status": {"phase": "Uploading"}})).unwrap();
        assert_eq!(odd.phase(), Phase::Unknown);
        assert!(!odd.phase().is_terminal());
        assert_eq!(fresh.phase().to_string(), "");
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut build = sample();
        assert!(build.owner_reference().is_none());

        build.metadata.uid = "uid-1".to_string();
        let owner = build.owner_reference().unwrap();
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_artifact_name_falls_back_to_spec() {
        assert_eq!(sample().artifact_file_name(), "cs9-qemu.qcow2");
    }
}
