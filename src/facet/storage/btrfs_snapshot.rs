/// Chroot on a per-session Btrfs snapshot of a source subvolume
use crate::chroot::{Chroot, Details, Environment, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SessionFlags, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{update_session_info, DirectoryFacet, StorageFacet};
use crate::facet::{push_keys, Facet, FacetKind, FacetType};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BtrfsSnapshotFacet {
    source_subvolume: PathBuf,
    snapshot_directory: PathBuf,
    snapshot_name: PathBuf,
}

impl BtrfsSnapshotFacet {
    pub fn new(source_subvolume: impl Into<PathBuf>, snapshot_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_subvolume: source_subvolume.into(),
            snapshot_directory: snapshot_directory.into(),
            snapshot_name: PathBuf::new(),
        }
    }

    pub fn source_subvolume(&self) -> &Path {
        &self.source_subvolume
    }

    pub fn set_source_subvolume(&mut self, path: impl Into<PathBuf>) {
        self.source_subvolume = path.into();
    }

    /// Directory snapshots are created in
    pub fn snapshot_directory(&self) -> &Path {
        &self.snapshot_directory
    }

    pub fn set_snapshot_directory(&mut self, path: impl Into<PathBuf>) {
        self.snapshot_directory = path.into();
    }

    /// Full path of this session's snapshot; only set on sessions
    pub fn snapshot_name(&self) -> &Path {
        &self.snapshot_name
    }

    pub fn set_snapshot_name(&mut self, path: impl Into<PathBuf>) {
        self.snapshot_name = path.into();
    }
}

impl FacetType for BtrfsSnapshotFacet {
    const KIND: FacetKind = FacetKind::BtrfsSnapshot;
}

impl Facet for BtrfsSnapshotFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::BtrfsSnapshot
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
        env.add_path("CHROOT_BTRFS_SOURCE_SUBVOLUME", &self.source_subvolume);
        env.add_path("CHROOT_BTRFS_SNAPSHOT_DIRECTORY", &self.snapshot_directory);
        env.add_path("CHROOT_BTRFS_SNAPSHOT_NAME", &self.snapshot_name);
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_path("Btrfs Source Subvolume", &self.source_subvolume);
        details.add_path("Btrfs Snapshot Directory", &self.snapshot_directory);
        if !self.snapshot_name.as_os_str().is_empty() {
            details.add_path("Btrfs Snapshot Name", &self.snapshot_name);
        }
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(
            keys,
            &[
                "btrfs-source-subvolume",
                "btrfs-snapshot-directory",
                "btrfs-snapshot-name",
            ],
        );
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        keyfile.set_value(group, "btrfs-source-subvolume", &self.source_subvolume);
        keyfile.set_value(group, "btrfs-snapshot-directory", &self.snapshot_directory);
        if chroot.is_session() {
            keyfile.set_value(group, "btrfs-snapshot-name", &self.snapshot_name);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(path) =
            keyfile.read(group, "btrfs-source-subvolume", Priority::Required, diagnostics)?
        {
            self.source_subvolume = path;
        }
        if let Some(path) =
            keyfile.read(group, "btrfs-snapshot-directory", Priority::Required, diagnostics)?
        {
            self.snapshot_directory = path;
        }
        let name_priority = if chroot.is_session() {
            Priority::Required
        } else {
            Priority::Disallowed
        };
        if let Some(path) = keyfile.read(group, "btrfs-snapshot-name", name_priority, diagnostics)? {
            self.snapshot_name = path;
        }
        Ok(())
    }
}

impl StorageFacet for BtrfsSnapshotFacet {
    fn chroot_type(&self) -> &'static str {
        "btrfs-snapshot"
    }

    fn path(&self, chroot: &Chroot) -> PathBuf {
        if !chroot.mount_location().as_os_str().is_empty() {
            chroot.mount_location().to_path_buf()
        } else if !self.snapshot_name.as_os_str().is_empty() {
            self.snapshot_name.clone()
        } else {
            self.source_subvolume.clone()
        }
    }

    /// The source chroot works on the source subvolume in place
    fn source_storage(&self) -> Option<Box<dyn Facet>> {
        Some(Box::new(DirectoryFacet::new(self.source_subvolume.clone())))
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
