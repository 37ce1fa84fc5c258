/// Chroot unpacked from an archive file for each session
use crate::chroot::{Chroot, Details, Environment, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SessionFlags, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{check_backing, join_relative, update_session_info, StorageFacet};
use crate::facet::{push_keys, Facet, FacetKind, FacetType};
use crate::safety::resource::ResourceKind;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileFacet {
    file: PathBuf,
    location: PathBuf,
    repack: bool,
}

impl FileFacet {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            location: PathBuf::new(),
            repack: false,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn set_file(&mut self, file: impl Into<PathBuf>) {
        self.file = file.into();
    }

    /// Directory inside the unpacked archive that is the chroot root
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn set_location(&mut self, location: impl Into<PathBuf>) {
        self.location = location.into();
    }

    /// Repack the archive when the session ends
    pub fn repack(&self) -> bool {
        self.repack
    }

    pub fn set_repack(&mut self, repack: bool) {
        self.repack = repack;
    }
}

impl FacetType for FileFacet {
    const KIND: FacetKind = FacetKind::File;
}

impl Facet for FileFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::File
    }

    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        Some(self)
    }

    fn session_flags(&self, chroot: &Chroot) -> SessionFlags {
        if chroot.is_session() {
            SessionFlags::PURGE
        } else {
            SessionFlags::empty()
        }
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add_path("CHROOT_FILE", &self.file);
        env.add_path("CHROOT_FILE_LOCATION", &self.location);
        env.add_bool("CHROOT_FILE_REPACK", self.repack);
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_path("File", &self.file);
        if !self.location.as_os_str().is_empty() {
            details.add_path("File Location", &self.location);
        }
        details.add_bool("File Repack", self.repack);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["file", "location", "file-repack"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        keyfile.set_value(group, "file", &self.file);
        if !self.location.as_os_str().is_empty() {
            keyfile.set_value(group, "location", &self.location);
        }
        if chroot.is_session() || chroot.is_source() {
            keyfile.set_value(group, "file-repack", &self.repack);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(file) = keyfile.read(group, "file", Priority::Required, diagnostics)? {
            self.file = file;
        }
        if let Some(location) = keyfile.read(group, "location", Priority::Optional, diagnostics)? {
            self.location = location;
        }
        let repack_priority = if chroot.is_session() || chroot.is_source() {
            Priority::Optional
        } else {
            Priority::Disallowed
        };
        if let Some(repack) = keyfile.read(group, "file-repack", repack_priority, diagnostics)? {
            self.repack = repack;
        }
        Ok(())
    }
}

impl StorageFacet for FileFacet {
    fn chroot_type(&self) -> &'static str {
        "file"
    }

    fn path(&self, chroot: &Chroot) -> PathBuf {
        join_relative(chroot.mount_location(), &self.location)
    }

    /// The archive is checked when the session starts; there is no device lock
    fn setup_lock(
        &self,
        chroot: &Chroot,
        ctx: &SetupContext,
        phase: SetupPhase,
        lock: bool,
        status: i32,
    ) -> Result<()> {
        if phase == SetupPhase::Start && lock {
            check_backing(
                ctx,
                &self.file,
                ResourceKind::TrustedFile {
                    privileged_uid: ctx.privileged_uid,
                },
                phase,
            )?;
        }
        update_session_info(chroot, ctx, phase, lock, status)
    }
}
