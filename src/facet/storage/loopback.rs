/// Chroot in a filesystem image attached through a loop device
use crate::chroot::{Chroot, Details, Environment, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{lock_backing_device, mounted_path, StorageFacet};
use crate::facet::{push_keys, Facet, FacetDependency, FacetKind, FacetType, MountableFacet};
use crate::safety::resource::ResourceKind;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopbackFacet {
    file: PathBuf,
}

impl LoopbackFacet {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn set_file(&mut self, file: impl Into<PathBuf>) {
        self.file = file.into();
    }
}

impl FacetType for LoopbackFacet {
    const KIND: FacetKind = FacetKind::Loopback;
}

impl Facet for LoopbackFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Loopback
    }

    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        Some(self)
    }

    fn dependencies(&self, _chroot: &Chroot) -> Vec<FacetDependency> {
        vec![FacetDependency::Require(Box::new(MountableFacet::default()))]
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add_path("CHROOT_FILE", &self.file);
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_path("File", &self.file);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["file"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        keyfile.set_value(chroot.name(), "file", &self.file);
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        if let Some(file) = keyfile.read(chroot.name(), "file", Priority::Required, diagnostics)? {
            self.file = file;
        }
        Ok(())
    }
}

impl StorageFacet for LoopbackFacet {
    fn chroot_type(&self) -> &'static str {
        "loopback"
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
            &self.file,
            ResourceKind::TrustedFile {
                privileged_uid: ctx.privileged_uid,
            },
            phase,
            lock,
            status,
        )
    }
}
