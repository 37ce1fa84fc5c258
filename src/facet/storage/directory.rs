/// Chroot in an existing directory on the host
use crate::chroot::{Chroot, Details, Environment, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{update_session_info, StorageFacet};
use crate::facet::{push_keys, Facet, FacetKind, FacetType, UnionFacet};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryFacet {
    directory: PathBuf,
}

impl DirectoryFacet {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
    }
}

fn union_active(chroot: &Chroot) -> bool {
    chroot
        .get_facet::<UnionFacet>()
        .map(UnionFacet::is_active)
        .unwrap_or(false)
}

impl FacetType for DirectoryFacet {
    const KIND: FacetKind = FacetKind::Directory;
}

impl Facet for DirectoryFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Directory
    }

    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        Some(self)
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add_path("CHROOT_DIRECTORY", &self.directory);
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_path("Directory", &self.directory);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["directory", "location"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        keyfile.set_value(chroot.name(), "directory", &self.directory);
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        let location: Option<PathBuf> =
            keyfile.read(group, "location", Priority::Deprecated, diagnostics)?;
        let directory_priority = if location.is_some() {
            Priority::Optional
        } else {
            Priority::Required
        };
        let directory: Option<PathBuf> =
            keyfile.read(group, "directory", directory_priority, diagnostics)?;
        if let Some(path) = directory.or(location) {
            self.directory = path;
        }
        Ok(())
    }
}

impl StorageFacet for DirectoryFacet {
    fn chroot_type(&self) -> &'static str {
        "directory"
    }

    /// A union session is mounted at its mount location; otherwise the
    /// directory is used in place.
    fn path(&self, chroot: &Chroot) -> PathBuf {
        if union_active(chroot) && !chroot.mount_location().as_os_str().is_empty() {
            chroot.mount_location().to_path_buf()
        } else {
            self.directory.clone()
        }
    }

    fn directory_equivalent(&self, chroot: &Chroot) -> bool {
        !union_active(chroot)
    }

    fn setup_lock(
        &self,
        chroot: &Chroot,
        ctx: &SetupContext,
        phase: SetupPhase,
        lock: bool,
        status: i32,
    ) -> Result<()> {
        update_session_info(chroot, ctx, phase, lock, status)
    }
}
