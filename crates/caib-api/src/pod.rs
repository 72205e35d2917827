//! Pod records for operator-managed sandboxes.
//!
//! Only read: the client waits for and addresses these pods but never
//! creates them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Pod {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_running(&self) -> bool {
        self.status.phase.as_deref() == Some("Running")
    }

    /// Name of the first declared container.
    pub fn first_container(&self) -> Option<&str> {
        self.spec.containers.first().map(|c| c.name.as_str())
    }
}

/// Role of a sandbox pod, carried in the `app.kubernetes.io/name` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxRole {
    /// Receives local files before the build starts.
    UploadTarget,
    /// Serves the finished artifact.
    ArtifactServer,
}

impl SandboxRole {
    pub fn label_value(&self) -> &'static str {
        match self {
            SandboxRole::UploadTarget => "upload-pod",
            SandboxRole::ArtifactServer => "artifact-pod",
        }
    }
}

impl fmt::Display for SandboxRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxRole::UploadTarget => write!(f, "upload pod"),
            SandboxRole::ArtifactServer => write!(f, "artifact pod"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pod_phase_and_container() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "demo-upload"},
            "spec": {"containers": [{"name": "uploader", "image": "busybox"}]},
            "status": {"phase": "Running", "podIP": "10.0.0.1"}
        }))
        .unwrap();

        assert!(pod.is_running());
        assert_eq!(pod.first_container(), Some("uploader"));
    }

    #[test]
    fn test_pending_pod_is_not_running() {
        let pod: Pod = serde_json::from_value(json!({"status": {"phase": "Pending"}})).unwrap();
        assert!(!pod.is_running());
        assert_eq!(pod.first_container(), None);
    }

    #[test]
    fn test_role_label_values() {
        assert_eq!(SandboxRole::UploadTarget.label_value(), "upload-pod");
        assert_eq!(SandboxRole::ArtifactServer.label_value(), "artifact-pod");
    }
}
