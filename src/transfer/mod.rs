//! File Transfer Engine
//!
//! Moves single files between the local machine and a sandbox using only
//! [`RemoteExec`]:
//!
//! - upload: `mkdir -p <dir>`, then a one-entry tar stream into
//!   `tar -xf - -C <dir>`
//! - download: `stat -c %s <path>` for the size, `cat <path>` streamed into
//!   the local file, then a length check
//!
//! There is no resumption. A failed transfer is restarted from scratch by
//! resubmitting.

mod progress;

pub use progress::{Direction, ProgressReader, ProgressWriter, TransferSession};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

use tar::{Builder, EntryType, Header};
use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::error::{CaibError, Result};
use crate::host::exec::{ExecTarget, RemoteExec};
use crate::manifest::LocalFileRef;

/// Upload every referenced file, in order, under the sandbox's remote root.
pub fn upload_local_files(
    exec: &dyn RemoteExec,
    target: &ExecTarget,
    refs: &[LocalFileRef],
    transfer: &TransferConfig,
) -> Result<()> {
    info!(count = refs.len(), pod = %target.pod, "uploading local files to build pod");

    for file_ref in refs {
        let relative = file_ref.path.trim_start_matches('/');
        if let Some(dir) = parent_dir(relative) {
            let remote_dir = remote_join(&transfer.remote_root, dir);
            exec.run(target, &["mkdir", "-p", remote_dir.as_str()])?;
        }

        let remote_path = remote_join(&transfer.remote_root, relative);
        info!(source = %file_ref.source_path, destination = %remote_path, "copying file to pod");
        upload_file(
            exec,
            target,
            Path::new(&file_ref.source_path),
            &remote_path,
            transfer.progress,
        )?;
    }

    Ok(())
}

/// Upload `local` to `remote_path` in the sandbox as a single-entry tar stream.
///
/// Returns the number of file bytes sent.
pub fn upload_file(
    exec: &dyn RemoteExec,
    target: &ExecTarget,
    local: &Path,
    remote_path: &str,
    render_progress: bool,
) -> Result<u64> {
    let entry_name = Path::new(remote_path)
        .file_name()
        .ok_or_else(|| CaibError::InvalidInput(format!("remote path {} has no file name", remote_path)))?;

    let file = File::open(local)
        .map_err(|e| CaibError::io(format!("error opening local file {}", local.display()), e))?;
    let metadata = file
        .metadata()
        .map_err(|e| CaibError::io(format!("error getting file stats for {}", local.display()), e))?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());
    header.set_mode(file_mode(&metadata));
    header.set_mtime(
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );

    let session = TransferSession::new(Direction::Upload, metadata.len(), render_progress);
    let mut reader = ProgressReader::new(file, session);
    let mut builder = Builder::new(Vec::new());
    builder
        .append_data(&mut header, entry_name, &mut reader)
        .map_err(|e| CaibError::io("error copying file data to tar", e))?;
    let archive = builder
        .into_inner()
        .map_err(|e| CaibError::io("error closing tar writer", e))?;
    let session = reader.into_session();
    session.finish();

    let dest_dir = parent_dir(remote_path).unwrap_or("/");
    exec.run(target, &["mkdir", "-p", dest_dir])?;

    let mut stdin: &[u8] = &archive;
    let mut sink = Vec::new();
    exec.exec(
        target,
        &["tar", "-xf", "-", "-C", dest_dir],
        Some(&mut stdin),
        &mut sink,
    )?;

    debug!(remote = remote_path, bytes = session.transferred, archive_bytes = archive.len(), "upload complete");
    Ok(session.transferred)
}

/// Download `remote_path` from the sandbox into `local`.
///
/// The remote size is learned first; the local result must match it exactly
/// or the partial file is removed and an integrity error returned.
pub fn download_file(
    exec: &dyn RemoteExec,
    target: &ExecTarget,
    remote_path: &str,
    local: &Path,
    render_progress: bool,
) -> Result<u64> {
    let size_output = exec.run(target, &["stat", "-c", "%s", remote_path])?;
    let size_text = size_output.stdout_str();
    let expected: u64 = size_text.trim().parse().map_err(|_| CaibError::InvalidSize {
        path: remote_path.to_string(),
        output: size_text.trim().to_string(),
    })?;

    let file = File::create(local)
        .map_err(|e| CaibError::io(format!("error creating local file {}", local.display()), e))?;
    let session = TransferSession::new(Direction::Download, expected, render_progress);
    let mut writer = ProgressWriter::new(BufWriter::new(file), session);

    let streamed = exec.exec(target, &["cat", remote_path], None, &mut writer);
    let flushed = writer.flush();
    let (buffered, session) = writer.into_parts();
    session.finish();

    if let Err(e) = streamed {
        drop(buffered);
        remove_partial(local);
        return Err(e.into());
    }
    if let Err(e) = flushed {
        drop(buffered);
        remove_partial(local);
        return Err(CaibError::io(format!("error writing {}", local.display()), e));
    }

    let file = buffered
        .into_inner()
        .map_err(|e| CaibError::io(format!("error writing {}", local.display()), e.into_error()))?;
    let actual = file
        .metadata()
        .map_err(|e| CaibError::io(format!("error getting file stats for {}", local.display()), e))?
        .len();
    drop(file);

    if actual != expected {
        remove_partial(local);
        return Err(CaibError::Integrity {
            path: local.to_path_buf(),
            expected,
            actual,
        });
    }

    debug!(remote = remote_path, bytes = actual, "download complete");
    Ok(actual)
}

fn remove_partial(local: &Path) {
    if let Err(e) = fs::remove_file(local) {
        debug!(path = %local.display(), error = %e, "could not remove partial download");
    }
}

/// Join a sandbox root and a relative path with exactly one separator
pub fn remote_join(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return root.to_string();
    }
    format!("{}/{}", root, relative)
}

/// Parent directory of a `/`-separated path, or `None` when it is trivial
/// (no directory component, or the root itself).
pub fn parent_dir(path: &str) -> Option<&str> {
    let (dir, _) = path.trim_end_matches('/').rsplit_once('/')?;
    if dir.is_empty() || dir == "." || dir == "/" {
        None
    } else {
        Some(dir)
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
