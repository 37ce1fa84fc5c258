//! Facets
//!
//! A chroot is assembled from facets: exactly one storage facet that decides
//! the chroot type, plus cross-cutting facets (mountable, session, union, ...).
//! Every facet method receives the owning chroot by reference.

pub mod mountable;
pub mod personality;
pub mod session;
pub mod session_clonable;
pub mod source;
pub mod source_clonable;
pub mod storage;
pub mod union;
pub mod userdata;

pub use mountable::MountableFacet;
pub use personality::PersonalityFacet;
pub use session::SessionFacet;
pub use session_clonable::SessionClonableFacet;
pub use source::SourceFacet;
pub use source_clonable::SourceClonableFacet;
pub use storage::StorageFacet;
pub use union::UnionFacet;
pub use userdata::UserdataFacet;

use crate::chroot::{Chroot, Details, Environment};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Result, SessionFlags};
use crate::config::validator::Diagnostics;
use std::any::Any;
use std::fmt;

/// Closed set of facet kinds; at most one facet of each kind per chroot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FacetKind {
    BlockDevice,
    Loopback,
    LvmSnapshot,
    BtrfsSnapshot,
    Directory,
    File,
    Custom,
    Mountable,
    SessionClonable,
    Session,
    SourceClonable,
    Source,
    Union,
    Userdata,
    Personality,
}

impl FacetKind {
    pub fn name(&self) -> &'static str {
        match self {
            FacetKind::BlockDevice => "block-device",
            FacetKind::Loopback => "loopback",
            FacetKind::LvmSnapshot => "lvm-snapshot",
            FacetKind::BtrfsSnapshot => "btrfs-snapshot",
            FacetKind::Directory => "directory",
            FacetKind::File => "file",
            FacetKind::Custom => "custom",
            FacetKind::Mountable => "mountable",
            FacetKind::SessionClonable => "session-clonable",
            FacetKind::Session => "session",
            FacetKind::SourceClonable => "source-clonable",
            FacetKind::Source => "source",
            FacetKind::Union => "union",
            FacetKind::Userdata => "userdata",
            FacetKind::Personality => "personality",
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            FacetKind::BlockDevice
                | FacetKind::Loopback
                | FacetKind::LvmSnapshot
                | FacetKind::BtrfsSnapshot
                | FacetKind::Directory
                | FacetKind::File
                | FacetKind::Custom
        )
    }

    /// The kind that may not coexist with this one
    pub fn counterpart(&self) -> Option<FacetKind> {
        match self {
            FacetKind::Session => Some(FacetKind::SessionClonable),
            FacetKind::SessionClonable => Some(FacetKind::Session),
            FacetKind::Source => Some(FacetKind::SourceClonable),
            FacetKind::SourceClonable => Some(FacetKind::Source),
            _ => None,
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural consequence of a facet's configuration
#[derive(Debug)]
pub enum FacetDependency {
    /// Add this facet if no facet of its kind is present
    Require(Box<dyn Facet>),
    /// Remove any facet of this kind
    Exclude(FacetKind),
}

/// Object-safe plumbing implemented for every `Facet + Clone` type
pub trait FacetBase {
    fn clone_facet(&self) -> Box<dyn Facet>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Facet + Clone + 'static> FacetBase for T {
    fn clone_facet(&self) -> Box<dyn Facet> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A composable unit of chroot behaviour
pub trait Facet: FacetBase + fmt::Debug + Send + Sync {
    fn kind(&self) -> FacetKind;

    /// Storage behaviour, for the facet that determines the chroot type
    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        None
    }

    fn dependencies(&self, _chroot: &Chroot) -> Vec<FacetDependency> {
        Vec::new()
    }

    fn setup_env(&self, _chroot: &Chroot, _env: &mut Environment) {}

    fn session_flags(&self, _chroot: &Chroot) -> SessionFlags {
        SessionFlags::empty()
    }

    fn get_details(&self, _chroot: &Chroot, _details: &mut Details) {}

    /// Keys this facet reads, for unknown-key detection
    fn used_keys(&self, _keys: &mut Vec<String>) {}

    fn get_keyfile(&self, _chroot: &Chroot, _keyfile: &mut Keyfile) {}

    fn set_keyfile(
        &mut self,
        _chroot: &Chroot,
        _keyfile: &Keyfile,
        _diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        Ok(())
    }
}

/// Statically typed facets, for lookup by type
pub trait FacetType: Facet + Sized + 'static {
    const KIND: FacetKind;
}

impl Clone for Box<dyn Facet> {
    fn clone(&self) -> Self {
        self.clone_facet()
    }
}

pub(crate) fn push_keys(keys: &mut Vec<String>, names: &[&str]) {
    keys.extend(names.iter().map(|name| name.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterparts_are_symmetric() {
        for kind in [
            FacetKind::Session,
            FacetKind::SessionClonable,
            FacetKind::Source,
            FacetKind::SourceClonable,
        ] {
            let other = kind.counterpart().unwrap();
            assert_eq!(other.counterpart(), Some(kind));
        }
        assert_eq!(FacetKind::Union.counterpart(), None);
    }

    #[test]
    fn test_storage_kinds() {
        assert!(FacetKind::LvmSnapshot.is_storage());
        assert!(FacetKind::Custom.is_storage());
        assert!(!FacetKind::Mountable.is_storage());
        assert_eq!(FacetKind::BtrfsSnapshot.to_string(), "btrfs-snapshot");
    }

    #[test]
    fn test_boxed_facet_clone_and_downcast() {
        let facet: Box<dyn Facet> = Box::new(MountableFacet::default());
        let copy = facet.clone();
        assert_eq!(copy.kind(), FacetKind::Mountable);
        assert!(copy.as_any().downcast_ref::<MountableFacet>().is_some());
    }
}
