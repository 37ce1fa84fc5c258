/// Marks a chroot as the writable source of a snapshot-style template
use crate::facet::{Facet, FacetKind, FacetType};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceFacet;

impl FacetType for SourceFacet {
    const KIND: FacetKind = FacetKind::Source;
}

impl Facet for SourceFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Source
    }
}
