//! CAIB API Types
//!
//! Serde shapes of the resources the build client reads and writes in the
//! cluster resource store, plus the label, annotation and naming conventions
//! shared with the build operator.

pub mod config_map;
pub mod image_build;
pub mod meta;
pub mod naming;
pub mod pod;

pub use config_map::ConfigMap;
pub use image_build::{ImageBuild, ImageBuildSpec, ImageBuildStatus, Phase};
pub use meta::{ObjectList, ObjectMeta, OwnerReference};
pub use naming::{config_map_name, default_artifact_file_name};
pub use pod::{Container, Pod, PodSpec, PodStatus, SandboxRole};

/// `apiVersion` of the ImageBuild resource.
pub const API_VERSION: &str = "automotive.sdv.cloud.redhat.com/v1";

/// Kind of the build request resource.
pub const IMAGE_BUILD_KIND: &str = "ImageBuild";

/// Fully qualified resource name, as accepted by `kubectl get`.
pub const IMAGE_BUILD_RESOURCE: &str = "imagebuilds.automotive.sdv.cloud.redhat.com";

/// Label carrying the owning ImageBuild name on operator-managed pods.
pub const BUILD_NAME_LABEL: &str = "automotive.sdv.cloud.redhat.com/imagebuild-name";

/// Label carrying the role of an operator-managed pod.
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Annotation set once every local file has been uploaded.
pub const UPLOADS_COMPLETE_ANNOTATION: &str = "automotive.sdv.cloud.redhat.com/uploads-complete";
