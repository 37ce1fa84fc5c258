//! Session and source cloning
//!
//! A session is a restricted copy of a template chroot under a fresh id, with
//! every per-session resource name (device, snapshot, overlay) rewritten so
//! concurrent sessions of the same template never collide. A source clone is
//! a view of the template's writable backing store.

use crate::chroot::Chroot;
use crate::config::types::Result;
use crate::facet::storage::{
    BlockDeviceFacet, BtrfsSnapshotFacet, FileFacet, LoopbackFacet, LvmSnapshotFacet,
};
use crate::facet::{
    FacetKind, MountableFacet, SessionFacet, SourceClonableFacet, SourceFacet, UnionFacet,
};
use crate::observability::audit::{AuditEvent, AuditEventType};
use crate::utils::identifier::validate_session_id;
use log::debug;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Parent directory of session mount points
pub const SESSION_MOUNT_DIR: &str = "/run/chrootbox/mount";

/// Who a session is being created for, and under which id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRequest {
    pub session_id: String,
    /// Name the user selected the template by (its name or an alias)
    pub alias: String,
    pub user: Option<String>,
    /// Grant the user root access inside the session
    pub root: bool,
}

impl SessionRequest {
    pub fn new(session_id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            alias: alias.into(),
            user: None,
            root: false,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn as_root(mut self, root: bool) -> Self {
        self.root = root;
        self
    }

    /// Fresh session id of the form `<base>-<uuid>`
    pub fn generate_id(base: &str) -> String {
        format!("{}-{}", base, Uuid::new_v4())
    }
}

pub(crate) fn clone_session(parent: &Chroot, request: &SessionRequest) -> Result<Chroot> {
    validate_session_id(&request.session_id)?;
    let session_id = request.session_id.as_str();

    let mut session = parent.clone();
    session.remove_kind(FacetKind::SessionClonable);
    session.remove_kind(FacetKind::SourceClonable);
    session.attach(Box::new(SessionFacet::new(parent.name(), request.alias.as_str())));

    session.set_name(session_id);
    session.set_description(annotate(parent.description(), "session chroot"));

    let user: Vec<String> = request.user.iter().cloned().collect();
    if request.root {
        session.set_root_users(user);
        session.set_users(Vec::new());
    } else {
        session.set_users(user);
        session.set_root_users(Vec::new());
    }
    session.set_groups(Vec::new());
    session.set_root_groups(Vec::new());
    session.set_aliases(Vec::new());

    let directory_equivalent = session
        .storage_facet()
        .map(|storage| storage.directory_equivalent(&session))
        .unwrap_or(false);
    if session.mount_location().as_os_str().is_empty() && !directory_equivalent {
        session.set_mount_location(Path::new(SESSION_MOUNT_DIR).join(session_id));
    }

    rewrite_storage(&mut session, session_id);

    if let Some(union) = session.get_facet_mut::<UnionFacet>() {
        if union.is_active() {
            let overlay = union.overlay_directory().join(session_id);
            let underlay = union.underlay_directory().join(session_id);
            union.set_overlay_directory(overlay);
            union.set_underlay_directory(underlay);
        }
    }

    debug!("Cloned session {} from {}", session_id, parent.name());
    AuditEvent::new(AuditEventType::SessionCloned, session_id)
        .with_details(format!("template {}", parent.name()))
        .emit();
    Ok(session)
}

fn annotate(description: &str, note: &str) -> String {
    if description.is_empty() {
        format!("({})", note)
    } else {
        format!("{} ({})", description, note)
    }
}

/// Point the storage and mount device at this session's own resources
fn rewrite_storage(session: &mut Chroot, session_id: &str) {
    let mount_device: Option<PathBuf> = match session.storage_kind() {
        FacetKind::BlockDevice => session
            .get_facet::<BlockDeviceFacet>()
            .map(|facet| facet.device().to_path_buf()),
        FacetKind::Loopback => session
            .get_facet::<LoopbackFacet>()
            .map(|facet| facet.file().to_path_buf()),
        FacetKind::LvmSnapshot => session.get_facet_mut::<LvmSnapshotFacet>().and_then(|lvm| {
            if lvm.device().as_os_str().is_empty() {
                return None;
            }
            let volume_group = lvm.device().parent().unwrap_or_else(|| Path::new("/"));
            let snapshot = volume_group.join(session_id);
            lvm.set_snapshot_device(snapshot.clone());
            Some(snapshot)
        }),
        FacetKind::BtrfsSnapshot => {
            if let Some(btrfs) = session.get_facet_mut::<BtrfsSnapshotFacet>() {
                let snapshot = btrfs.snapshot_directory().join(session_id);
                btrfs.set_snapshot_name(snapshot);
            }
            None
        }
        _ => None,
    };

    if let Some(device) = mount_device {
        if let Some(mountable) = session.get_facet_mut::<MountableFacet>() {
            mountable.set_mount_device(device);
        }
    }
}

pub(crate) fn clone_source(parent: &Chroot, facet: &SourceClonableFacet) -> Chroot {
    let mut source = match parent.storage_facet().and_then(|storage| storage.source_storage()) {
        Some(storage) => parent.with_storage(storage),
        None => parent.clone(),
    };

    source.set_description(annotate(parent.description(), "source chroot"));
    source.set_users(facet.source_users().to_vec());
    source.set_groups(facet.source_groups().to_vec());
    source.set_root_users(facet.source_root_users().to_vec());
    source.set_root_groups(facet.source_root_groups().to_vec());
    source.set_original(false);

    source.remove_kind(FacetKind::Union);
    source.attach(Box::new(SourceFacet));

    if let Some(file) = source.get_facet_mut::<FileFacet>() {
        file.set_repack(true);
    }

    AuditEvent::new(AuditEventType::SourceCloned, parent.name())
        .with_details(format!("storage {}", source.chroot_type()))
        .emit();
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::storage::DirectoryFacet;

    #[test]
    fn test_generate_id_is_unique() {
        let a = SessionRequest::generate_id("sid");
        let b = SessionRequest::generate_id("sid");
        assert!(a.starts_with("sid-"));
        assert_ne!(a, b);
        assert!(validate_session_id(&a).is_ok());
    }

    #[test]
    fn test_directory_session_keeps_path() {
        let mut parent = Chroot::create("directory", "sid").unwrap();
        parent
            .add_facet(DirectoryFacet::new("/srv/chroot/sid"))
            .unwrap();

        let session = parent
            .clone_session(&SessionRequest::new("s1", "sid").with_user("alice").as_root(true))
            .unwrap();
        assert!(session.mount_location().as_os_str().is_empty());
        assert_eq!(session.path(), PathBuf::from("/srv/chroot/sid"));
        assert_eq!(session.root_users(), &["alice".to_string()]);
        assert!(session.users().is_empty());
        assert_eq!(
            session.get_facet::<SessionFacet>().unwrap().original_name(),
            "sid"
        );
    }

    #[test]
    fn test_union_session_gets_private_overlay() {
        let mut parent = Chroot::create("block-device", "sid").unwrap();
        parent.add_facet(BlockDeviceFacet::new("/dev/vg/sid")).unwrap();
        parent.add_facet(UnionFacet::new("overlay").unwrap()).unwrap();

        let session = parent.clone_session(&SessionRequest::new("s1", "sid")).unwrap();
        let union = session.get_facet::<UnionFacet>().unwrap();
        assert!(union.overlay_directory().ends_with("s1"));
        assert!(union.underlay_directory().ends_with("s1"));
        assert_eq!(session.mount_location(), Path::new("/run/chrootbox/mount/s1"));
        assert!(!session.has_facet(FacetKind::SourceClonable));
    }

    #[test]
    fn test_btrfs_session_snapshot_name() {
        let parent = {
            let mut chroot = Chroot::create("btrfs-snapshot", "sid").unwrap();
            chroot
                .add_facet(BtrfsSnapshotFacet::new("/srv/btrfs/sid", "/srv/btrfs/snapshots"))
                .unwrap();
            chroot
        };
        let session = parent.clone_session(&SessionRequest::new("s2", "sid")).unwrap();
        let btrfs = session.get_facet::<BtrfsSnapshotFacet>().unwrap();
        assert_eq!(btrfs.snapshot_name(), Path::new("/srv/btrfs/snapshots/s2"));
    }

    #[test]
    fn test_lvm_source_uses_origin_volume() {
        let mut parent = Chroot::create("lvm-snapshot", "sid").unwrap();
        parent
            .add_facet(LvmSnapshotFacet::new("/dev/vg/sid", "--size 2G"))
            .unwrap();

        let source = parent.clone_source().unwrap();
        assert_eq!(source.chroot_type(), "block-device");
        assert_eq!(
            source.get_facet::<BlockDeviceFacet>().unwrap().device(),
            Path::new("/dev/vg/sid")
        );
        assert!(source.has_facet(FacetKind::Mountable));
        assert!(source.has_facet(FacetKind::Source));
        assert!(!source.original());
    }

    #[test]
    fn test_file_source_repacks() {
        let mut parent = Chroot::create("file", "sid").unwrap();
        parent.add_facet(FileFacet::new("/srv/sid.tar.gz")).unwrap();
        let source = parent.clone_source().unwrap();
        assert!(source.get_facet::<FileFacet>().unwrap().repack());
    }
}
