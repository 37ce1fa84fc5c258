/// Templates that can be cloned into sessions
use crate::chroot::clone::{self, SessionRequest};
use crate::chroot::Chroot;
use crate::config::types::{Result, SessionFlags};
use crate::facet::{Facet, FacetKind, FacetType};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionClonableFacet;

impl SessionClonableFacet {
    pub fn clone_session(&self, parent: &Chroot, request: &SessionRequest) -> Result<Chroot> {
        clone::clone_session(parent, request)
    }
}

impl FacetType for SessionClonableFacet {
    const KIND: FacetKind = FacetKind::SessionClonable;
}

impl Facet for SessionClonableFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::SessionClonable
    }

    fn session_flags(&self, _chroot: &Chroot) -> SessionFlags {
        SessionFlags::CREATE
    }
}
