//! Manifest reference scanning
//!
//! Finds the files a build manifest wants copied in from the submitting
//! machine. The manifest is an arbitrary YAML tree; only two locations are
//! inspected:
//!
//! - `content.add_files`
//! - `qm.content.add_files`
//!
//! Entries that are not mappings, or lack a string `path`/`source_path`, are
//! skipped without complaint.

use serde_yaml::{Mapping, Value};
use tracing::warn;

/// A file to upload: where it goes in the build, and where it is locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileRef {
    /// Destination path inside the build (`path`)
    pub path: String,
    /// Local source path (`source_path`)
    pub source_path: String,
}

/// Scan a manifest document for local file references.
///
/// Order follows the document (top-level entries first, then `qm`).
/// Duplicates are kept. A document that does not parse yields no
/// references and a warning.
pub fn find_local_file_references(manifest: &str) -> Vec<LocalFileRef> {
    let root: Value = match serde_yaml::from_str(manifest) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "failed to parse manifest YAML, skipping local file scan");
            return Vec::new();
        }
    };

    let mut refs = Vec::new();

    if let Some(add_files) = get_map(&root, "content").and_then(|c| get_sequence_in(c, "add_files")) {
        collect(add_files, &mut refs);
    }

    if let Some(add_files) = get_map(&root, "qm")
        .and_then(|qm| get_map_in(qm, "content"))
        .and_then(|c| get_sequence_in(c, "add_files"))
    {
        collect(add_files, &mut refs);
    }

    refs
}

fn collect(entries: &[Value], refs: &mut Vec<LocalFileRef>) {
    for entry in entries {
        let Some(file) = entry.as_mapping() else {
            continue;
        };
        let (Some(path), Some(source_path)) = (get_string_in(file, "path"), get_string_in(file, "source_path")) else {
            continue;
        };
        if is_local_source(source_path) {
            refs.push(LocalFileRef {
                path: path.to_string(),
                source_path: source_path.to_string(),
            });
        }
    }
}

/// `source_path` names a real local file, not an empty or root placeholder
fn is_local_source(source_path: &str) -> bool {
    !source_path.is_empty() && source_path != "/"
}

/// Mapping under `key` of the document root, if the root is a mapping
pub fn get_map<'a>(value: &'a Value, key: &str) -> Option<&'a Mapping> {
    value.as_mapping().and_then(|m| get_map_in(m, key))
}

pub fn get_map_in<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(key).and_then(Value::as_mapping)
}

pub fn get_sequence_in<'a>(map: &'a Mapping, key: &str) -> Option<&'a [Value]> {
    map.get(key).and_then(Value::as_sequence).map(Vec::as_slice)
}

pub fn get_string_in<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_then_qm_order() {
        let manifest = r#"
name: demo
content:
  add_files:
    - path: a
      source_path: /src/a
qm:
  content:
    add_files:
      - path: b
        source_path: /src/b
"#;
        let refs = find_local_file_references(manifest);
        assert_eq!(
            refs,
            vec![
                LocalFileRef {
                    path: "a".to_string(),
                    source_path: "/src/a".to_string()
                },
                LocalFileRef {
                    path: "b".to_string(),
                    source_path: "/src/b".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_root_and_missing_sources_excluded() {
        let manifest = r#"
content:
  add_files:
    - path: /etc/root
      source_path: /
    - path: /etc/missing
    - path: /etc/empty
      source_path: ""
    - path: /etc/kept
      source_path: files/kept.conf
"#;
        let refs = find_local_file_references(manifest);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path, "/etc/kept");
        assert_eq!(refs[0].source_path, "files/kept.conf");
    }

    #[test]
    fn test_mistyped_entries_skipped() {
        let manifest = r#"
content:
  add_files:
    - just-a-string
    - path: 42
      source_path: /src/numeric-path
    - path: /etc/url
      url: https://example.com/file
    - path: /etc/ok
      source_path: /src/ok
"#;
        let refs = find_local_file_references(manifest);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path, "/etc/ok");
    }

    #[test]
    fn test_wrong_container_types_yield_nothing() {
        assert!(find_local_file_references("content: [1, 2]\n").is_empty());
        assert!(find_local_file_references("content:\n  add_files: {path: a}\n").is_empty());
        assert!(find_local_file_references("qm: true\n").is_empty());
        assert!(find_local_file_references("- a\n- b\n").is_empty());
        assert!(find_local_file_references("").is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let manifest = r#"
content:
  add_files:
    - {path: /etc/a, source_path: a.txt}
    - {path: /etc/a, source_path: a.txt}
"#;
        assert_eq!(find_local_file_references(manifest).len(), 2);
    }

    #[test]
    fn test_unparseable_document_is_empty() {
        assert!(find_local_file_references("content: [unterminated\n").is_empty());
    }
}
