/// Chroot whose storage is managed entirely by site setup scripts
use crate::chroot::{Chroot, Details, SetupContext};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SessionFlags, SetupPhase};
use crate::config::validator::Diagnostics;
use crate::facet::storage::{update_session_info, StorageFacet};
use crate::facet::{
    push_keys, Facet, FacetDependency, FacetKind, FacetType, SessionClonableFacet,
    SourceClonableFacet,
};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomFacet {
    session_cloneable: bool,
    session_purgeable: bool,
    source_cloneable: bool,
}

impl Default for CustomFacet {
    fn default() -> Self {
        Self {
            session_cloneable: true,
            session_purgeable: false,
            source_cloneable: false,
        }
    }
}

impl CustomFacet {
    pub fn session_cloneable(&self) -> bool {
        self.session_cloneable
    }

    pub fn set_session_cloneable(&mut self, enabled: bool) {
        self.session_cloneable = enabled;
    }

    pub fn session_purgeable(&self) -> bool {
        self.session_purgeable
    }

    pub fn set_session_purgeable(&mut self, enabled: bool) {
        self.session_purgeable = enabled;
    }

    pub fn source_cloneable(&self) -> bool {
        self.source_cloneable
    }

    pub fn set_source_cloneable(&mut self, enabled: bool) {
        self.source_cloneable = enabled;
    }
}

impl FacetType for CustomFacet {
    const KIND: FacetKind = FacetKind::Custom;
}

impl Facet for CustomFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Custom
    }

    fn as_storage(&self) -> Option<&dyn StorageFacet> {
        Some(self)
    }

    fn dependencies(&self, chroot: &Chroot) -> Vec<FacetDependency> {
        let mut deps = Vec::new();
        if !chroot.is_session() {
            if self.session_cloneable {
                deps.push(FacetDependency::Require(Box::new(SessionClonableFacet)));
            } else {
                deps.push(FacetDependency::Exclude(FacetKind::SessionClonable));
            }
            if self.source_cloneable && !chroot.is_source() {
                deps.push(FacetDependency::Require(Box::new(
                    SourceClonableFacet::default(),
                )));
            } else if !self.source_cloneable {
                deps.push(FacetDependency::Exclude(FacetKind::SourceClonable));
            }
        }
        deps
    }

    fn session_flags(&self, chroot: &Chroot) -> SessionFlags {
        if self.session_purgeable && chroot.is_session() {
            SessionFlags::PURGE
        } else {
            SessionFlags::empty()
        }
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_bool("Custom Session Cloneable", self.session_cloneable);
        details.add_bool("Custom Session Purgeable", self.session_purgeable);
        details.add_bool("Custom Source Cloneable", self.source_cloneable);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(
            keys,
            &[
                "custom-session-cloneable",
                "custom-session-purgeable",
                "custom-source-cloneable",
            ],
        );
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        keyfile.set_value(group, "custom-session-cloneable", &self.session_cloneable);
        keyfile.set_value(group, "custom-session-purgeable", &self.session_purgeable);
        keyfile.set_value(group, "custom-source-cloneable", &self.source_cloneable);
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(enabled) =
            keyfile.read(group, "custom-session-cloneable", Priority::Optional, diagnostics)?
        {
            self.session_cloneable = enabled;
        }
        if let Some(enabled) =
            keyfile.read(group, "custom-session-purgeable", Priority::Optional, diagnostics)?
        {
            self.session_purgeable = enabled;
        }
        if let Some(enabled) =
            keyfile.read(group, "custom-source-cloneable", Priority::Optional, diagnostics)?
        {
            self.source_cloneable = enabled;
        }
        Ok(())
    }
}

impl StorageFacet for CustomFacet {
    fn chroot_type(&self) -> &'static str {
        "custom"
    }

    fn path(&self, chroot: &Chroot) -> PathBuf {
        chroot.mount_location().to_path_buf()
    }

    fn directory_equivalent(&self, _chroot: &Chroot) -> bool {
        true
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
