//! Human-readable build listings for `list` and `show`.

use std::io::{self, Write};

use caib_api::{ImageBuild, Phase};

const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Fixed-width table, one row per build
pub fn write_build_table(out: &mut dyn Write, namespace: &str, builds: &[ImageBuild]) -> io::Result<()> {
    if builds.is_empty() {
        return writeln!(out, "No ImageBuilds found in namespace {}", namespace);
    }

    writeln!(out, "{:<20} {:<12} {:<20} {:<20} {:<10}", "NAME", "STATUS", "DISTRO", "TARGET", "CREATED")?;
    for build in builds {
        let created = build
            .metadata
            .creation_timestamp
            .map(|t| t.format(CREATED_FORMAT).to_string())
            .unwrap_or_default();
        writeln!(
            out,
            "{:<20} {:<12} {:<20} {:<20} {:<10}",
            build.name(),
            build.phase().as_str(),
            build.spec.distro,
            build.spec.target,
            created
        )?;
    }
    Ok(())
}

/// Every field of one build; artifact details only once it has completed
pub fn write_build_details(out: &mut dyn Write, build: &ImageBuild) -> io::Result<()> {
    let created = build
        .metadata
        .creation_timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    writeln!(out, "Name:        {}", build.name())?;
    writeln!(out, "Namespace:   {}", build.metadata.namespace)?;
    writeln!(out, "Created:     {}", created)?;
    writeln!(out, "Status:      {}", build.phase())?;
    writeln!(out, "Message:     {}", build.status.message)?;

    let spec = &build.spec;
    writeln!(out)?;
    writeln!(out, "Build Specification:")?;
    writeln!(out, "  Distro:             {}", spec.distro)?;
    writeln!(out, "  Target:             {}", spec.target)?;
    writeln!(out, "  Architecture:       {}", spec.architecture)?;
    writeln!(out, "  Export Format:      {}", spec.export_format)?;
    writeln!(out, "  Mode:               {}", spec.mode)?;
    writeln!(out, "  Manifest ConfigMap: {}", spec.manifest_config_map)?;
    writeln!(out, "  OSBuild Image:      {}", spec.builder_image)?;
    writeln!(out, "  Storage Class:      {}", spec.storage_class)?;
    writeln!(out, "  Serve Artifact:     {}", spec.serve_artifact)?;
    writeln!(out, "  Serve Expiry Hours: {}", spec.serve_expiry_hours)?;

    if build.phase() == Phase::Completed {
        writeln!(out)?;
        writeln!(out, "Artifacts:")?;
        writeln!(out, "  PVC Name:       {}", build.status.pvc_name)?;
        writeln!(out, "  Artifact Path:  {}", build.status.artifact_path)?;
        writeln!(out, "  File Name:      {}", build.artifact_file_name())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use caib_api::{ImageBuildSpec, ImageBuildStatus, ObjectMeta};
    use chrono::{TimeZone, Utc};

    fn build(name: &str, phase: Phase) -> ImageBuild {
        let mut metadata = ObjectMeta::named(name, "default");
        metadata.creation_timestamp = Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
        let mut build = ImageBuild::new(
            metadata,
            ImageBuildSpec {
                distro: "cs9".to_string(),
                target: "qemu".to_string(),
                export_format: "qcow2".to_string(),
                ..ImageBuildSpec::default()
            },
        );
        build.status = ImageBuildStatus {
            phase,
            ..ImageBuildStatus::default()
        };
        build
    }

    #[test]
    fn test_table_rows() {
        let mut out = Vec::new();
        write_build_table(&mut out, "default", &[build("alpha", Phase::Running)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0].split_whitespace().collect::<Vec<_>>(),
            vec!["NAME", "STATUS", "DISTRO", "TARGET", "CREATED"]
        );
        assert_eq!(&lines[1][..21], format!("{:<21}", "alpha"));
        assert_eq!(&lines[1][21..33], "Running     ");
        assert!(lines[1].ends_with("2024-03-01 09:30"));
    }

    #[test]
    fn test_empty_table() {
        let mut out = Vec::new();
        write_build_table(&mut out, "team-a", &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No ImageBuilds found in namespace team-a\n");
    }

    #[test]
    fn test_details_show_artifacts_only_when_completed() {
        let mut out = Vec::new();
        write_build_details(&mut out, &build("alpha", Phase::Running)).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("Artifacts:"));

        let mut out = Vec::new();
        write_build_details(&mut out, &build("alpha", Phase::Completed)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Artifacts:"));
        assert!(text.contains("File Name:      cs9-qemu.qcow2"));
    }
}
