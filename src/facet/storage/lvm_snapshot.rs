/// Chroot on a per-session LVM snapshot of an origin logical volume
use crate::chroot::{Chroot, Details, Environment, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SessionFlags, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{lock_backing_device, mounted_path, BlockDeviceFacet, StorageFacet};
use crate::facet::{push_keys, Facet, FacetDependency, FacetKind, FacetType, MountableFacet};
use crate::safety::resource::ResourceKind;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LvmSnapshotFacet {
    device: PathBuf,
    snapshot_device: PathBuf,
    snapshot_options: String,
}

impl LvmSnapshotFacet {
    pub fn new(device: impl Into<PathBuf>, snapshot_options: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            snapshot_device: PathBuf::new(),
            snapshot_options: snapshot_options.into(),
        }
    }

    /// Origin logical volume
    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn set_device(&mut self, device: impl Into<PathBuf>) {
        self.device = device.into();
    }

    /// Snapshot volume; only set on sessions
    pub fn snapshot_device(&self) -> &Path {
        &self.snapshot_device
    }

    pub fn set_snapshot_device(&mut self, device: impl Into<PathBuf>) {
        self.snapshot_device = device.into();
    }

    pub fn snapshot_options(&self) -> &str {
        &self.snapshot_options
    }

    pub fn set_snapshot_options(&mut self, options: impl Into<String>) {
        self.snapshot_options = options.into();
    }
}

impl FacetType for LvmSnapshotFacet {
    const KIND: FacetKind = FacetKind::LvmSnapshot;
}

impl Facet for LvmSnapshotFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::LvmSnapshot
    }

    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        Some(self)
    }

    fn dependencies(&self, _chroot: &Chroot) -> Vec<FacetDependency> {
        vec![FacetDependency::Require(Box::new(MountableFacet::default()))]
    }

    fn session_flags(&self, chroot: &Chroot) -> SessionFlags {
        if chroot.is_session() {
            SessionFlags::PURGE
        } else {
            SessionFlags::empty()
        }
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add_path("CHROOT_DEVICE", &self.device);
        if let Some(name) = self.snapshot_device.file_name() {
            env.add("CHROOT_LVM_SNAPSHOT_NAME", name.to_string_lossy().into_owned());
        }
        env.add_path("CHROOT_LVM_SNAPSHOT_DEVICE", &self.snapshot_device);
        env.add("CHROOT_LVM_SNAPSHOT_OPTIONS", self.snapshot_options.as_str());
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_path("Device", &self.device);
        if !self.snapshot_device.as_os_str().is_empty() {
            details.add_path("LVM Snapshot Device", &self.snapshot_device);
        }
        details.add("LVM Snapshot Options", &self.snapshot_options);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["device", "lvm-snapshot-device", "lvm-snapshot-options"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        keyfile.set_value(group, "device", &self.device);
        keyfile.set_value(group, "lvm-snapshot-options", &self.snapshot_options);
        if chroot.is_session() {
            keyfile.set_value(group, "lvm-snapshot-device", &self.snapshot_device);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(device) = keyfile.read(group, "device", Priority::Required, diagnostics)? {
            self.device = device;
        }
        if let Some(options) =
            keyfile.read(group, "lvm-snapshot-options", Priority::Required, diagnostics)?
        {
            self.snapshot_options = options;
        }
        let snapshot_priority = if chroot.is_session() {
            Priority::Required
        } else {
            Priority::Disallowed
        };
        if let Some(device) =
            keyfile.read(group, "lvm-snapshot-device", snapshot_priority, diagnostics)?
        {
            self.snapshot_device = device;
        }
        Ok(())
    }
}

impl StorageFacet for LvmSnapshotFacet {
    fn chroot_type(&self) -> &'static str {
        "lvm-snapshot"
    }

    fn path(&self, chroot: &Chroot) -> PathBuf {
        mounted_path(chroot)
    }

    /// The source chroot mounts the origin volume directly
    fn source_storage(&self) -> Option<Box<dyn Facet>> {
        Some(Box::new(BlockDeviceFacet::new(self.device.clone())))
    }

    /// Locks the origin volume for the life of the session
    fn setup_lock(
        &self,
        chroot: &Chroot,
        ctx: &SetupContext,
        phase: SetupPhase,
        lock: bool,
        status: i32,
    ) -> Result<()> {
        lock_backing_device(
            chroot,
            ctx,
            &self.device,
            ResourceKind::BlockDevice,
            phase,
            lock,
            status,
        )
    }
}
