/// Mount parameters for chroots whose storage must be mounted before use
use crate::chroot::{Chroot, Details, Environment};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result};
use crate::config::validator::Diagnostics;
use crate::facet::{push_keys, Facet, FacetKind, FacetType};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountableFacet {
    mount_device: PathBuf,
    mount_options: String,
    location: PathBuf,
}

impl MountableFacet {
    pub fn mount_device(&self) -> &Path {
        &self.mount_device
    }

    pub fn set_mount_device(&mut self, device: impl Into<PathBuf>) {
        self.mount_device = device.into();
    }

    pub fn mount_options(&self) -> &str {
        &self.mount_options
    }

    pub fn set_mount_options(&mut self, options: impl Into<String>) {
        self.mount_options = options.into();
    }

    /// Directory inside the mounted filesystem that is the chroot root
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn set_location(&mut self, location: impl Into<PathBuf>) {
        self.location = location.into();
    }
}

impl FacetType for MountableFacet {
    const KIND: FacetKind = FacetKind::Mountable;
}

impl Facet for MountableFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Mountable
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add_path("CHROOT_MOUNT_DEVICE", &self.mount_device);
        env.add("CHROOT_MOUNT_OPTIONS", self.mount_options.as_str());
        env.add_path("CHROOT_LOCATION", &self.location);
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        if !self.mount_device.as_os_str().is_empty() {
            details.add_path("Mount Device", &self.mount_device);
        }
        if !self.mount_options.is_empty() {
            details.add("Mount Options", &self.mount_options);
        }
        if !self.location.as_os_str().is_empty() {
            details.add_path("Location", &self.location);
        }
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["mount-device", "mount-options", "location"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        if chroot.is_session() && !self.mount_device.as_os_str().is_empty() {
            keyfile.set_value(group, "mount-device", &self.mount_device);
        }
        if !self.mount_options.is_empty() {
            keyfile.set_value(group, "mount-options", &self.mount_options);
        }
        if !self.location.as_os_str().is_empty() {
            keyfile.set_value(group, "location", &self.location);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        let device_priority = if chroot.is_session() {
            Priority::Optional
        } else {
            Priority::Disallowed
        };
        if let Some(device) = keyfile.read(group, "mount-device", device_priority, diagnostics)? {
            self.mount_device = device;
        }
        if let Some(options) = keyfile.read(group, "mount-options", Priority::Optional, diagnostics)? {
            self.mount_options = options;
        }
        if let Some(location) = keyfile.read(group, "location", Priority::Optional, diagnostics)? {
            self.location = location;
        }
        Ok(())
    }
}
