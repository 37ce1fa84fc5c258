//! Integration tests for the setup state machine
//!
//! The four-call lifecycle on file-backed and device-backed sessions,
//! including teardown after the backing device has gone away.

use chrootbox::chroot::{Chroot, NullRunner, SessionRequest, SetupContext};
use chrootbox::config::types::{ChrootError, LockType, ResourceStateError, SetupPhase};
use chrootbox::facet::storage::{BlockDeviceFacet, LoopbackFacet};
use chrootbox::safety::lock::{DeviceLock, Lock};
use nix::unistd::geteuid;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn context(dir: &TempDir) -> SetupContext {
    SetupContext::new(dir.path().join("lock"), dir.path().join("session"))
        .with_privileged_uid(geteuid().as_raw())
        .with_lock_timeout(Duration::from_millis(50))
}

fn image(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sid.img");
    fs::write(&path, b"not really a filesystem").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    path
}

fn loopback_session(file: &Path) -> Chroot {
    let mut template = Chroot::create("loopback", "sid").unwrap();
    template.add_facet(LoopbackFacet::new(file)).unwrap();
    template
        .clone_session(&SessionRequest::new("sid-1", "sid").with_user("alice"))
        .unwrap()
}

fn block_device_session(device: &Path) -> Chroot {
    let mut template = Chroot::create("block-device", "sid").unwrap();
    template.add_facet(BlockDeviceFacet::new(device)).unwrap();
    template
        .clone_session(&SessionRequest::new("sid-1", "sid"))
        .unwrap()
}

fn device_lock(ctx: &SetupContext, device: &Path) -> DeviceLock {
    DeviceLock::new(&ctx.lock_dir, device).with_owner("sid-1")
}

#[test]
fn test_loopback_four_call_lifecycle() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let file = image(&dir);
    let session = loopback_session(&file);

    session.lock(&ctx, SetupPhase::Start).unwrap();
    assert!(ctx.session_store().exists("sid-1"));
    let holder = device_lock(&ctx, &file).holder().unwrap().unwrap();
    assert_eq!(holder.owner.as_deref(), Some("sid-1"));

    session.unlock(&ctx, SetupPhase::Start, 0).unwrap();
    assert!(device_lock(&ctx, &file).holder().unwrap().is_some());

    session.lock(&ctx, SetupPhase::Stop).unwrap();
    assert!(device_lock(&ctx, &file).holder().unwrap().is_some());

    session.unlock(&ctx, SetupPhase::Stop, 0).unwrap();
    assert!(device_lock(&ctx, &file).holder().unwrap().is_none());
    assert!(!ctx.session_store().exists("sid-1"));
}

#[test]
fn test_nonzero_status_keeps_session_record() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let file = image(&dir);
    let session = loopback_session(&file);

    session.setup(&ctx, &mut NullRunner, SetupPhase::Start, 0).unwrap();
    session.setup(&ctx, &mut NullRunner, SetupPhase::Stop, 1).unwrap();

    assert!(ctx.session_store().exists("sid-1"));
    assert!(device_lock(&ctx, &file).holder().unwrap().is_none());
}

#[test]
fn test_session_record_reloads() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let file = image(&dir);
    let session = loopback_session(&file);

    session.setup(&ctx, &mut NullRunner, SetupPhase::Start, 0).unwrap();
    let keyfile = ctx.session_store().load("sid-1").unwrap();
    assert_eq!(keyfile.get("sid-1", "type"), Some("loopback"));
    assert_eq!(keyfile.get("sid-1", "original-name"), Some("sid"));
    assert_eq!(keyfile.get("sid-1", "users"), Some("alice"));
}

#[test]
fn test_loopback_owner_checked() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir).with_privileged_uid(geteuid().as_raw().wrapping_add(1));
    let file = image(&dir);
    let session = loopback_session(&file);

    assert!(matches!(
        session.lock(&ctx, SetupPhase::Start),
        Err(ChrootError::ResourceState(ResourceStateError::WrongOwner { .. }))
    ));
    assert!(!ctx.session_store().exists("sid-1"));
}

#[test]
fn test_world_writable_image_rejected() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let file = image(&dir);
    fs::set_permissions(&file, fs::Permissions::from_mode(0o666)).unwrap();

    assert!(matches!(
        loopback_session(&file).lock(&ctx, SetupPhase::Start),
        Err(ChrootError::ResourceState(ResourceStateError::WorldWritable { .. }))
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn test_character_device_is_not_block_device() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let session = block_device_session(Path::new("/dev/null"));

    assert!(matches!(
        session.lock(&ctx, SetupPhase::Start),
        Err(ChrootError::ResourceState(ResourceStateError::NotBlockDevice { .. }))
    ));
    assert!(!ctx.session_store().exists("sid-1"));
    assert!(device_lock(&ctx, Path::new("/dev/null")).holder().unwrap().is_none());
}

#[test]
fn test_missing_device_is_fatal_at_start() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let session = block_device_session(&dir.path().join("gone"));

    assert!(matches!(
        session.setup(&ctx, &mut NullRunner, SetupPhase::Start, 0),
        Err(ChrootError::ResourceState(ResourceStateError::Stat { .. }))
    ));
}

#[test]
fn test_teardown_survives_removed_device() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let device = dir.path().join("gone");
    let session = block_device_session(&device);

    // State left behind by the process that started the session
    ctx.session_store().save(&session).unwrap();
    device_lock(&ctx, &device)
        .acquire(LockType::Exclusive, Duration::ZERO)
        .unwrap();

    session.setup(&ctx, &mut NullRunner, SetupPhase::Stop, 0).unwrap();

    assert!(!ctx.session_store().exists("sid-1"));
    assert!(device_lock(&ctx, &device).holder().unwrap().is_none());
}

#[test]
fn test_teardown_clears_corrupted_lock_file() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let file = image(&dir);
    let session = loopback_session(&file);

    session.setup(&ctx, &mut NullRunner, SetupPhase::Start, 0).unwrap();
    let lock_path = device_lock(&ctx, &file).lock_path().to_path_buf();
    fs::write(&lock_path, "").unwrap();

    session.setup(&ctx, &mut NullRunner, SetupPhase::Stop, 0).unwrap();
    assert!(!lock_path.exists());
    assert!(!ctx.session_store().exists("sid-1"));

    // A second teardown finds nothing left to do
    session.setup(&ctx, &mut NullRunner, SetupPhase::Stop, 0).unwrap();
}

#[test]
fn test_teardown_leaves_foreign_lock_alone() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let file = image(&dir);
    let session = loopback_session(&file);

    ctx.session_store().save(&session).unwrap();
    let mut other = DeviceLock::new(&ctx.lock_dir, &file).with_owner("sid-2");
    other.acquire(LockType::Exclusive, Duration::ZERO).unwrap();

    session.setup(&ctx, &mut NullRunner, SetupPhase::Stop, 0).unwrap();

    assert!(!ctx.session_store().exists("sid-1"));
    let holder = device_lock(&ctx, &file).holder().unwrap().unwrap();
    assert_eq!(holder.owner.as_deref(), Some("sid-2"));
}

#[test]
fn test_failed_start_releases_device_lock() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"").unwrap();
    let ctx = SetupContext::new(dir.path().join("lock"), blocker.join("session"))
        .with_privileged_uid(geteuid().as_raw())
        .with_lock_timeout(Duration::from_millis(50));
    let file = image(&dir);
    let session = loopback_session(&file);

    assert!(session.setup(&ctx, &mut NullRunner, SetupPhase::Start, 0).is_err());
    assert!(device_lock(&ctx, &file).holder().unwrap().is_none());

    let mut next = DeviceLock::new(&ctx.lock_dir, &file).with_owner("sid-2");
    next.acquire(LockType::Exclusive, Duration::ZERO).unwrap();
}
