//! Derived resource and file names.

/// Name of the ConfigMap that carries the manifest for `build_name`.
pub fn config_map_name(build_name: &str) -> String {
    format!("{}-manifest-config", build_name)
}

/// Artifact file name used when the build status does not report one.
///
/// `image` exports produce raw disk images; every other format uses its own
/// name as the extension.
pub fn default_artifact_file_name(distro: &str, target: &str, export_format: &str) -> String {
    let ext = match export_format {
        "image" => "raw",
        "qcow2" => "qcow2",
        other => other,
    };
    format!("{}-{}.{}", distro, target, ext)
}
