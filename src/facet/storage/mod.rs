//! Storage facets
//!
//! Each chroot carries exactly one storage facet. It names the chroot type,
//! computes the root path and drives the lock half of the setup state machine.

pub mod block_device;
pub mod btrfs_snapshot;
pub mod custom;
pub mod directory;
pub mod file;
pub mod loopback;
pub mod lvm_snapshot;

pub use block_device::BlockDeviceFacet;
pub use btrfs_snapshot::BtrfsSnapshotFacet;
pub use custom::CustomFacet;
pub use directory::DirectoryFacet;
pub use file::FileFacet;
pub use loopback::LoopbackFacet;
pub use lvm_snapshot::LvmSnapshotFacet;

use crate::chroot::{Chroot, SetupContext};
use crate::config::types::{LockType, Result, SetupPhase};
use crate::facet::{Facet, MountableFacet};
use crate::observability::audit::{AuditEvent, AuditEventType};
use crate::safety::lock::{DeviceLock, Lock};
use crate::safety::resource::{check_resource, ResourceKind};
use std::path::{Path, PathBuf};

/// Behaviour specific to the facet that determines the chroot type
pub trait StorageFacet {
    /// Type name as written in definitions (`block-device`, `directory`, ...)
    fn chroot_type(&self) -> &'static str;

    /// Root of the chroot as seen from the host
    fn path(&self, chroot: &Chroot) -> PathBuf;

    /// The chroot is used in place, without a per-session mount point
    fn directory_equivalent(&self, _chroot: &Chroot) -> bool {
        false
    }

    /// Storage a source clone of this chroot uses, when it differs
    fn source_storage(&self) -> Option<Box<dyn Facet>> {
        None
    }

    /// Lock half of the setup state machine.
    ///
    /// Called with `lock == true` before setup scripts run and with
    /// `lock == false` after, for both phases.
    fn setup_lock(
        &self,
        chroot: &Chroot,
        ctx: &SetupContext,
        phase: SetupPhase,
        lock: bool,
        status: i32,
    ) -> Result<()>;
}

/// Mount point plus the mountable facet's location inside the mounted filesystem
pub(crate) fn mounted_path(chroot: &Chroot) -> PathBuf {
    let location = chroot
        .get_facet::<MountableFacet>()
        .map(|m| m.location().to_path_buf())
        .unwrap_or_default();
    join_relative(chroot.mount_location(), &location)
}

pub(crate) fn join_relative(base: &Path, rest: &Path) -> PathBuf {
    if rest.as_os_str().is_empty() || rest == Path::new("/") {
        return base.to_path_buf();
    }
    match rest.strip_prefix("/") {
        Ok(relative) => base.join(relative),
        Err(_) => base.join(rest),
    }
}

/// Record or remove session metadata at the outer edges of the lifecycle
pub(crate) fn update_session_info(
    chroot: &Chroot,
    ctx: &SetupContext,
    phase: SetupPhase,
    lock: bool,
    status: i32,
) -> Result<()> {
    match (phase, lock) {
        (SetupPhase::Start, true) => chroot.setup_session_info(ctx, true),
        (SetupPhase::Stop, false) if status == 0 => chroot.setup_session_info(ctx, false),
        _ => Ok(()),
    }
}

/// Check a backing resource; stat failures during Stop only warn
pub(crate) fn check_backing(
    ctx: &SetupContext,
    path: &Path,
    kind: ResourceKind,
    phase: SetupPhase,
) -> Result<()> {
    match check_resource(path, kind) {
        Ok(()) => Ok(()),
        Err(e) if e.is_stat_failure() && phase == SetupPhase::Stop => {
            ctx.log.warning(format!("{} (continuing teardown)", e));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Device-backed lifecycle: lock held from (Start, true) to (Stop, false)
pub(crate) fn lock_backing_device(
    chroot: &Chroot,
    ctx: &SetupContext,
    device: &Path,
    kind: ResourceKind,
    phase: SetupPhase,
    lock: bool,
    status: i32,
) -> Result<()> {
    match (phase, lock) {
        (SetupPhase::Start, true) => {
            check_backing(ctx, device, kind, phase)?;
            let mut device_lock = DeviceLock::new(&ctx.lock_dir, device).with_owner(chroot.name());
            device_lock.acquire(LockType::Exclusive, ctx.lock_timeout)?;
            AuditEvent::new(AuditEventType::DeviceLocked, chroot.name())
                .with_phase(phase)
                .with_details(device.display().to_string())
                .emit();

            // A session that failed to start has no Stop to release its lock
            if let Err(e) = update_session_info(chroot, ctx, phase, lock, status) {
                if let Err(release_error) = device_lock.release() {
                    ctx.log.warning(format!(
                        "{}: releasing {} after failed start: {}",
                        chroot.name(),
                        device.display(),
                        release_error
                    ));
                }
                return Err(e);
            }
            Ok(())
        }
        (SetupPhase::Stop, false) => {
            check_backing(ctx, device, kind, phase)?;
            let mut device_lock = DeviceLock::new(&ctx.lock_dir, device).with_owner(chroot.name());
            match device_lock.release() {
                Ok(()) => AuditEvent::new(AuditEventType::DeviceUnlocked, chroot.name())
                    .with_phase(phase)
                    .with_details(device.display().to_string())
                    .emit(),
                Err(e) => ctx.log.warning(format!(
                    "{}: {} (continuing teardown)",
                    chroot.name(),
                    e
                )),
            }
            update_session_info(chroot, ctx, phase, lock, status)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relative() {
        assert_eq!(
            join_relative(Path::new("/run/mnt/s1"), Path::new("/srv/root")),
            PathBuf::from("/run/mnt/s1/srv/root")
        );
        assert_eq!(
            join_relative(Path::new("/run/mnt/s1"), Path::new("")),
            PathBuf::from("/run/mnt/s1")
        );
    }
}
