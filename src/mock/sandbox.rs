//! In-memory sandbox container
//!
//! Interprets the handful of commands the transfer engine issues against a
//! private filesystem: `mkdir -p`, `stat -c %s`, `cat` and
//! `tar -xf - -C <dir>`. Anything else fails like a missing binary.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::host::exec::{ExecError, ExecTarget, RemoteExec};

#[derive(Debug, Default)]
struct SandboxState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, MockFile>,
    /// Serve only this many bytes from `cat`
    truncate_reads: Option<usize>,
    /// Printed by `stat` in place of the real size
    stat_output: Option<String>,
    /// Commands starting with this prefix fail
    failing_prefix: Option<String>,
    commands: Vec<(ExecTarget, Vec<String>)>,
}

/// A file held by the mock sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFile {
    pub contents: Vec<u8>,
    pub mode: u32,
}

/// Mock remote exec target for tests
#[derive(Debug, Clone)]
pub struct MockSandbox {
    state: Arc<Mutex<SandboxState>>,
}

impl Default for MockSandbox {
    fn default() -> Self {
        let mut state = SandboxState::default();
        state.dirs.insert("/".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

fn parent(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file, creating its parent directories.
    pub fn put_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        mkdir_all(&mut state.dirs, &parent(path));
        state.files.insert(
            normalize(path),
            MockFile {
                contents: contents.into(),
                mode: 0o644,
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<MockFile> {
        self.state.lock().unwrap().files.get(&normalize(path)).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(&normalize(path))
    }

    /// Make `cat` stop after `bytes` while `stat` still reports the full size.
    pub fn truncate_reads(&self, bytes: usize) {
        self.state.lock().unwrap().truncate_reads = Some(bytes);
    }

    /// Make `stat` print `output` instead of the file size.
    pub fn override_stat_output(&self, output: &str) {
        self.state.lock().unwrap().stat_output = Some(output.to_string());
    }

    /// Fail every command whose argv, space-joined, starts with `prefix`.
    pub fn fail_commands(&self, prefix: &str) {
        self.state.lock().unwrap().failing_prefix = Some(prefix.to_string());
    }

    /// Commands run so far, space-joined
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(|(_, argv)| argv.join(" "))
            .collect()
    }

    /// Targets addressed so far, in order
    pub fn targets(&self) -> Vec<ExecTarget> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }
}

fn mkdir_all(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = String::new();
    dirs.insert("/".to_string());
    for component in path.split('/').filter(|c| !c.is_empty()) {
        current.push('/');
        current.push_str(component);
        dirs.insert(current.clone());
    }
}

impl RemoteExec for MockSandbox {
    fn exec(
        &self,
        target: &ExecTarget,
        argv: &[&str],
        stdin: Option<&mut (dyn Read + Send)>,
        stdout: &mut dyn Write,
    ) -> Result<Vec<u8>, ExecError> {
        let mut state = self.state.lock().unwrap();
        state
            .commands
            .push((target.clone(), argv.iter().map(|a| a.to_string()).collect()));

        let joined = argv.join(" ");
        if let Some(prefix) = &state.failing_prefix {
            if joined.starts_with(prefix.as_str()) {
                return Err(ExecError::failed(target, argv, "exit status 1", "injected failure"));
            }
        }

        match argv {
            ["mkdir", "-p", dir] => {
                mkdir_all(&mut state.dirs, dir);
                Ok(Vec::new())
            }
            ["stat", "-c", "%s", path] => match state.files.get(&normalize(path)) {
                Some(file) => {
                    match &state.stat_output {
                        Some(output) => writeln!(stdout, "{}", output)?,
                        None => writeln!(stdout, "{}", file.contents.len())?,
                    }
                    Ok(Vec::new())
                }
                None => Err(ExecError::failed(
                    target,
                    argv,
                    "exit status 1",
                    format!("stat: cannot stat '{}': No such file or directory", path),
                )),
            },
            ["cat", path] => {
                let Some(file) = state.files.get(&normalize(path)) else {
                    return Err(ExecError::failed(
                        target,
                        argv,
                        "exit status 1",
                        format!("cat: {}: No such file or directory", path),
                    ));
                };
                let end = state
                    .truncate_reads
                    .map_or(file.contents.len(), |n| n.min(file.contents.len()));
                stdout.write_all(&file.contents[..end])?;
                Ok(Vec::new())
            }
            ["tar", "-xf", "-", "-C", dir] => {
                let dir = normalize(dir);
                if !state.dirs.contains(&dir) {
                    return Err(ExecError::failed(
                        target,
                        argv,
                        "exit status 2",
                        format!("tar: {}: Cannot open: No such file or directory", dir),
                    ));
                }
                let Some(stdin) = stdin else {
                    return Err(ExecError::failed(target, argv, "exit status 2", "tar: no archive on stdin"));
                };
                let mut archive_bytes = Vec::new();
                stdin.read_to_end(&mut archive_bytes)?;

                let mut archive = tar::Archive::new(archive_bytes.as_slice());
                for entry in archive.entries()? {
                    let mut entry = entry?;
                    let name = entry.path()?.to_string_lossy().into_owned();
                    let mode = entry.header().mode()?;
                    let mut contents = Vec::new();
                    entry.read_to_end(&mut contents)?;
                    let path = if dir == "/" {
                        format!("/{}", name)
                    } else {
                        format!("{}/{}", dir, name)
                    };
                    state.files.insert(path, MockFile { contents, mode });
                }
                Ok(Vec::new())
            }
            _ => Err(ExecError::failed(
                target,
                argv,
                "exit status 127",
                format!("sh: {}: not found", argv.first().copied().unwrap_or("")),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ExecTarget {
        ExecTarget::new("default", "pod", "fileserver")
    }

    #[test]
    fn test_mkdir_creates_ancestors() {
        let sandbox = MockSandbox::new();
        sandbox.run(&target(), &["mkdir", "-p", "/workspace/shared/a"]).unwrap();
        assert!(sandbox.has_dir("/workspace"));
        assert!(sandbox.has_dir("/workspace/shared/a"));
    }

    #[test]
    fn test_stat_and_cat() {
        let sandbox = MockSandbox::new();
        sandbox.put_file("/w/f.txt", "hello");
        let size = sandbox.run(&target(), &["stat", "-c", "%s", "/w/f.txt"]).unwrap();
        assert_eq!(size.stdout_str().trim(), "5");
        let cat = sandbox.run(&target(), &["cat", "/w/f.txt"]).unwrap();
        assert_eq!(cat.stdout, b"hello");
    }

    #[test]
    fn test_stat_output_override() {
        let sandbox = MockSandbox::new();
        sandbox.put_file("/w/f.txt", "hello");
        sandbox.override_stat_output("stat: unrecognized format");
        let size = sandbox.run(&target(), &["stat", "-c", "%s", "/w/f.txt"]).unwrap();
        assert_eq!(size.stdout_str().trim(), "stat: unrecognized format");
    }

    #[test]
    fn test_tar_requires_existing_dir() {
        let sandbox = MockSandbox::new();
        let mut empty: &[u8] = &[];
        let err = sandbox
            .exec(&target(), &["tar", "-xf", "-", "-C", "/missing"], Some(&mut empty), &mut Vec::<u8>::new())
            .unwrap_err();
        assert!(err.stderr().unwrap().contains("Cannot open"));
    }

    #[test]
    fn test_unknown_command_fails() {
        let sandbox = MockSandbox::new();
        let err = sandbox.run(&target(), &["rm", "-rf", "/"]).unwrap_err();
        assert!(err.to_string().contains("exit status 127"));
    }

    #[test]
    fn test_injected_failure() {
        let sandbox = MockSandbox::new();
        sandbox.fail_commands("mkdir");
        assert!(sandbox.run(&target(), &["mkdir", "-p", "/x"]).is_err());
        assert_eq!(sandbox.commands(), vec!["mkdir -p /x"]);
    }
}
