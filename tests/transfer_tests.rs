//! File transfer tests against the mock sandbox
//!
//! Upload/download round trips, destination layout, and integrity failures.

use std::fs;

use caib::error::CaibError;
use caib::host::{ExecTarget, RemoteExec};
use caib::manifest::LocalFileRef;
use caib::mock::MockSandbox;
use caib::transfer::{download_file, upload_file, upload_local_files};
use caib::TransferConfig;
use tempfile::TempDir;

fn target() -> ExecTarget {
    ExecTarget::new("default", "demo-upload-pod", "fileserver")
}

fn transfer_config(dir: &TempDir) -> TransferConfig {
    TransferConfig {
        output_dir: dir.path().join("output"),
        progress: false,
        ..TransferConfig::default()
    }
}

#[test]
fn test_upload_then_download_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let local = dir.path().join("disk.img");
    fs::write(&local, &contents).unwrap();

    sandbox.run(&target(), &["mkdir", "-p", "/workspace/shared"]).unwrap();
    let sent = upload_file(&sandbox, &target(), &local, "/workspace/shared/disk.img", false).unwrap();
    assert_eq!(sent, contents.len() as u64);

    let back = dir.path().join("back.img");
    let received = download_file(&sandbox, &target(), "/workspace/shared/disk.img", &back, false).unwrap();
    assert_eq!(received, contents.len() as u64);
    assert_eq!(fs::read(&back).unwrap(), contents);
}

#[test]
fn test_upload_creates_destination_directory() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let local = dir.path().join("local-name.conf");
    fs::write(&local, "key=value\n").unwrap();

    upload_file(&sandbox, &target(), &local, "/workspace/shared/etc/app/app.conf", false).unwrap();

    let file = sandbox.file("/workspace/shared/etc/app/app.conf").unwrap();
    assert_eq!(file.contents, b"key=value\n");
    assert!(sandbox.file("/workspace/shared/etc/app/local-name.conf").is_none());
    assert!(sandbox
        .commands()
        .contains(&"tar -xf - -C /workspace/shared/etc/app".to_string()));
}

#[test]
fn test_upload_long_file_name() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let local = dir.path().join("short.conf");
    fs::write(&local, "long=true\n").unwrap();

    let name = format!("{}.conf", "a".repeat(120));
    let remote = format!("/workspace/shared/etc/{}", name);
    upload_file(&sandbox, &target(), &local, &remote, false).unwrap();

    assert_eq!(sandbox.file(&remote).unwrap().contents, b"long=true\n");
}

#[cfg(unix)]
#[test]
fn test_upload_preserves_permission_bits() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let local = dir.path().join("run.sh");
    fs::write(&local, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&local, fs::Permissions::from_mode(0o755)).unwrap();

    upload_file(&sandbox, &target(), &local, "/workspace/shared/usr/bin/run.sh", false).unwrap();
    assert_eq!(sandbox.file("/workspace/shared/usr/bin/run.sh").unwrap().mode, 0o755);
}

#[test]
fn test_upload_local_files_places_each_reference_under_root() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "alpha").unwrap();
    fs::write(&b, "beta").unwrap();

    let refs = vec![
        LocalFileRef {
            path: "/etc/a.txt".to_string(),
            source_path: a.display().to_string(),
        },
        LocalFileRef {
            path: "b.txt".to_string(),
            source_path: b.display().to_string(),
        },
    ];
    upload_local_files(&sandbox, &target(), &refs, &transfer_config(&dir)).unwrap();

    assert_eq!(sandbox.file("/workspace/shared/etc/a.txt").unwrap().contents, b"alpha");
    assert_eq!(sandbox.file("/workspace/shared/b.txt").unwrap().contents, b"beta");
    let extracts = sandbox
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("tar -xf"))
        .count();
    assert_eq!(extracts, 2);
}

#[test]
fn test_missing_local_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let err = upload_file(
        &sandbox,
        &target(),
        &dir.path().join("does-not-exist"),
        "/workspace/shared/x",
        false,
    )
    .unwrap_err();
    assert!(matches!(err, CaibError::Io { .. }));
    assert!(sandbox.commands().is_empty());
}

#[test]
fn test_truncated_download_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    sandbox.put_file("/workspace/shared/cs9-qemu.raw", vec![7u8; 4096]);
    sandbox.truncate_reads(1000);

    let local = dir.path().join("cs9-qemu.raw");
    let err = download_file(&sandbox, &target(), "/workspace/shared/cs9-qemu.raw", &local, false).unwrap_err();
    assert_eq!(err.exit_code(), 70);

    match err {
        CaibError::Integrity { expected, actual, .. } => {
            assert_eq!(expected, 4096);
            assert_eq!(actual, 1000);
        }
        other => panic!("expected integrity error, got {other:?}"),
    }
    assert!(!local.exists());
}

#[test]
fn test_failed_stream_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    sandbox.put_file("/workspace/shared/img.qcow2", "data");
    sandbox.fail_commands("cat");

    let local = dir.path().join("img.qcow2");
    let err = download_file(&sandbox, &target(), "/workspace/shared/img.qcow2", &local, false).unwrap_err();
    assert!(matches!(err, CaibError::RemoteExecution(_)));
    assert!(!local.exists());
}

#[test]
fn test_unparseable_size_is_fatal_and_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    sandbox.put_file("/workspace/shared/cs9-qemu.raw", "data");
    sandbox.override_stat_output("not-a-number");

    let local = dir.path().join("cs9-qemu.raw");
    let err = download_file(&sandbox, &target(), "/workspace/shared/cs9-qemu.raw", &local, false).unwrap_err();

    match &err {
        CaibError::InvalidSize { path, output } => {
            assert_eq!(path, "/workspace/shared/cs9-qemu.raw");
            assert_eq!(output, "not-a-number");
        }
        other => panic!("expected invalid size, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 70);
    assert!(!local.exists());
    assert!(!sandbox.commands().iter().any(|c| c.starts_with("cat")));
}

#[test]
fn test_missing_remote_file_fails_on_stat() {
    let dir = TempDir::new().unwrap();
    let sandbox = MockSandbox::new();
    let local = dir.path().join("none");

    let err = download_file(&sandbox, &target(), "/workspace/shared/none", &local, false).unwrap_err();
    match err {
        CaibError::RemoteExecution(e) => assert!(e.stderr().unwrap().contains("cannot stat")),
        other => panic!("expected remote execution error, got {other:?}"),
    }
    assert!(!local.exists());
}
