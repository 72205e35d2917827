//! Resource store
//!
//! Get/list/create/delete/merge-patch against ImageBuild and ConfigMap
//! resources, plus label-filtered pod listing. Lookups return `Ok(None)` for
//! absent objects so callers can tell "nothing there" from real failures.

use std::collections::BTreeMap;

use caib_api::{ConfigMap, ImageBuild, ObjectList, Pod, IMAGE_BUILD_RESOURCE};
use serde_json::json;

use super::transport::{argv, Kubectl, KubectlError};

/// Resource store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("resource store request failed: {0}")]
    Transport(#[from] KubectlError),

    #[error("resource store rejected {kind} {name}: {message}")]
    Rejected {
        kind: &'static str,
        name: String,
        message: String,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Declarative resource store protocol
pub trait ResourceStore: Send + Sync {
    fn get_build(&self, namespace: &str, name: &str) -> Result<Option<ImageBuild>, StoreError>;

    fn list_builds(&self, namespace: &str) -> Result<Vec<ImageBuild>, StoreError>;

    /// Create a build and return it with its server-assigned identity.
    fn create_build(&self, build: &ImageBuild) -> Result<ImageBuild, StoreError>;

    fn delete_build(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Merge-patch `annotations` onto the build's metadata.
    fn patch_build_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<ImageBuild, StoreError>;

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError>;

    fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;

    /// Replace a config map, including its owner references.
    fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;

    fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Pods in `namespace` carrying every label in `labels`.
    fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, StoreError>;
}

const BUILD_KIND: &str = "ImageBuild";
const CONFIG_MAP_KIND: &str = "ConfigMap";
const CONFIG_MAP_RESOURCE: &str = "configmaps";

/// Resource store over kubectl
#[derive(Debug, Clone)]
pub struct KubectlStore {
    kubectl: Kubectl,
}

impl KubectlStore {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<T>, StoreError> {
        let args = argv(["get", resource, name, "-n", namespace, "-o", "json", "--ignore-not-found"]);
        let stdout = self.kubectl.output(&args, None)?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&stdout)
            .map(Some)
            .map_err(|source| StoreError::Transport(KubectlError::Json {
                command: args.join(" "),
                source,
            }))
    }

    fn list<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        namespace: &str,
        selector: Option<String>,
    ) -> Result<Vec<T>, StoreError> {
        let mut args = argv(["get", resource, "-n", namespace, "-o", "json"]);
        if let Some(selector) = selector {
            args.push("-l".to_string());
            args.push(selector);
        }
        let list: ObjectList<T> = self.kubectl.json(&args, None)?;
        Ok(list.items)
    }

    fn create<T: serde::Serialize + serde::de::DeserializeOwned>(
        &self,
        kind: &'static str,
        name: &str,
        object: &T,
    ) -> Result<T, StoreError> {
        self.apply_verb("create", kind, name, object)
    }

    fn apply_verb<T: serde::Serialize + serde::de::DeserializeOwned>(
        &self,
        verb: &str,
        kind: &'static str,
        name: &str,
        object: &T,
    ) -> Result<T, StoreError> {
        let body = serde_json::to_vec(object).map_err(|source| {
            StoreError::Transport(KubectlError::Json {
                command: verb.to_string(),
                source,
            })
        })?;
        let args = argv([verb, "-f", "-", "-o", "json"]);
        self.kubectl
            .json(&args, Some(&body))
            .map_err(|e| classify(e, kind, name))
    }

    fn delete(&self, resource: &str, kind: &'static str, namespace: &str, name: &str) -> Result<(), StoreError> {
        let args = argv(["delete", resource, name, "-n", namespace, "--wait=false"]);
        self.kubectl
            .output(&args, None)
            .map(|_| ())
            .map_err(|e| classify(e, kind, name))
    }
}

impl ResourceStore for KubectlStore {
    fn get_build(&self, namespace: &str, name: &str) -> Result<Option<ImageBuild>, StoreError> {
        self.get(IMAGE_BUILD_RESOURCE, namespace, name)
    }

    fn list_builds(&self, namespace: &str) -> Result<Vec<ImageBuild>, StoreError> {
        self.list(IMAGE_BUILD_RESOURCE, namespace, None)
    }

    fn create_build(&self, build: &ImageBuild) -> Result<ImageBuild, StoreError> {
        self.create(BUILD_KIND, build.name(), build)
    }

    fn delete_build(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete(IMAGE_BUILD_RESOURCE, BUILD_KIND, namespace, name)
    }

    fn patch_build_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<ImageBuild, StoreError> {
        let patch = json!({ "metadata": { "annotations": annotations } }).to_string();
        let args = argv([
            "patch",
            IMAGE_BUILD_RESOURCE,
            name,
            "-n",
            namespace,
            "--type",
            "merge",
            "-p",
            patch.as_str(),
            "-o",
            "json",
        ]);
        self.kubectl
            .json(&args, None)
            .map_err(|e| classify(e, BUILD_KIND, name))
    }

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        self.get(CONFIG_MAP_RESOURCE, namespace, name)
    }

    fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.create(CONFIG_MAP_KIND, config_map.name(), config_map)
    }

    fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.apply_verb("replace", CONFIG_MAP_KIND, config_map.name(), config_map)
    }

    fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete(CONFIG_MAP_RESOURCE, CONFIG_MAP_KIND, namespace, name)
    }

    fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, StoreError> {
        self.list("pods", namespace, Some(label_selector(labels)))
    }
}

/// `k1=v1,k2=v2` selector for an exact-match label set
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Map kubectl failures onto store error kinds using the API reason in stderr
fn classify(err: KubectlError, kind: &'static str, name: &str) -> StoreError {
    match err.stderr() {
        Some(stderr) if stderr.contains("(NotFound)") => StoreError::NotFound {
            kind,
            name: name.to_string(),
        },
        Some(stderr) if stderr.contains("(AlreadyExists)") => StoreError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        _ => StoreError::Transport(err),
    }
}
