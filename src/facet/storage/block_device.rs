/// Chroot on a block device, mounted for each session
use crate::chroot::{Chroot, Details, Environment, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{lock_backing_device, mounted_path, StorageFacet};
use crate::facet::{push_keys, Facet, FacetDependency, FacetKind, FacetType, MountableFacet};
use crate::safety::resource::ResourceKind;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockDeviceFacet {
    device: PathBuf,
}

impl BlockDeviceFacet {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn set_device(&mut self, device: impl Into<PathBuf>) {
        self.device = device.into();
    }
}

impl FacetType for BlockDeviceFacet {
    const KIND: FacetKind = FacetKind::BlockDevice;
}

impl Facet for BlockDeviceFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::BlockDevice
    }

    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        Some(self)
    }

    fn dependencies(&self, _chroot: &Chroot) -> Vec<FacetDependency> {
        vec![FacetDependency::Require(Box::new(MountableFacet::default()))]
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add_path("CHROOT_DEVICE", &self.device);
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_path("Device", &self.device);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["device"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        keyfile.set_value(chroot.name(), "device", &self.device);
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        if let Some(device) = keyfile.read(chroot.name(), "device", Priority::Required, diagnostics)? {
            self.device = device;
        }
        Ok(())
    }
}

impl StorageFacet for BlockDeviceFacet {
    fn chroot_type(&self) -> &'static str {
        "block-device"
    }

    fn path(&self, chroot: &Chroot) -> PathBuf {
        mounted_path(chroot)
    }

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
