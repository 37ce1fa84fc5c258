/// Templates whose underlying writable source can be entered directly
use crate::chroot::{clone, Chroot, Details};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result, SessionFlags};
use crate::config::validator::Diagnostics;
use crate::facet::{push_keys, Facet, FacetKind, FacetType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceClonableFacet {
    source_clone: bool,
    source_users: Vec<String>,
    source_groups: Vec<String>,
    source_root_users: Vec<String>,
    source_root_groups: Vec<String>,
}

impl Default for SourceClonableFacet {
    fn default() -> Self {
        Self {
            source_clone: true,
            source_users: Vec::new(),
            source_groups: Vec::new(),
            source_root_users: Vec::new(),
            source_root_groups: Vec::new(),
        }
    }
}

impl SourceClonableFacet {
    /// Whether a source chroot is generated at all
    pub fn source_clone(&self) -> bool {
        self.source_clone
    }

    pub fn set_source_clone(&mut self, enabled: bool) {
        self.source_clone = enabled;
    }

    pub fn source_users(&self) -> &[String] {
        &self.source_users
    }

    pub fn set_source_users(&mut self, users: Vec<String>) {
        self.source_users = users;
    }

    pub fn source_groups(&self) -> &[String] {
        &self.source_groups
    }

    pub fn set_source_groups(&mut self, groups: Vec<String>) {
        self.source_groups = groups;
    }

    pub fn source_root_users(&self) -> &[String] {
        &self.source_root_users
    }

    pub fn set_source_root_users(&mut self, users: Vec<String>) {
        self.source_root_users = users;
    }

    pub fn source_root_groups(&self) -> &[String] {
        &self.source_root_groups
    }

    pub fn set_source_root_groups(&mut self, groups: Vec<String>) {
        self.source_root_groups = groups;
    }

    pub fn clone_source(&self, parent: &Chroot) -> Chroot {
        clone::clone_source(parent, self)
    }
}

impl FacetType for SourceClonableFacet {
    const KIND: FacetKind = FacetKind::SourceClonable;
}

impl Facet for SourceClonableFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::SourceClonable
    }

    fn session_flags(&self, _chroot: &Chroot) -> SessionFlags {
        if self.source_clone {
            SessionFlags::CLONE
        } else {
            SessionFlags::empty()
        }
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add_bool("Source Clone", self.source_clone);
        details.add_list("Source Users", &self.source_users);
        details.add_list("Source Groups", &self.source_groups);
        details.add_list("Source Root Users", &self.source_root_users);
        details.add_list("Source Root Groups", &self.source_root_groups);
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(
            keys,
            &[
                "source-clone",
                "source-users",
                "source-groups",
                "source-root-users",
                "source-root-groups",
            ],
        );
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        keyfile.set_value(group, "source-clone", &self.source_clone);
        keyfile.set_value(group, "source-users", &self.source_users);
        keyfile.set_value(group, "source-groups", &self.source_groups);
        keyfile.set_value(group, "source-root-users", &self.source_root_users);
        keyfile.set_value(group, "source-root-groups", &self.source_root_groups);
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(enabled) = keyfile.read(group, "source-clone", Priority::Optional, diagnostics)? {
            self.source_clone = enabled;
        }
        if let Some(users) = keyfile.read(group, "source-users", Priority::Optional, diagnostics)? {
            self.source_users = users;
        }
        if let Some(groups) = keyfile.read(group, "source-groups", Priority::Optional, diagnostics)? {
            self.source_groups = groups;
        }
        if let Some(users) =
            keyfile.read(group, "source-root-users", Priority::Optional, diagnostics)?
        {
            self.source_root_users = users;
        }
        if let Some(groups) =
            keyfile.read(group, "source-root-groups", Priority::Optional, diagnostics)?
        {
            self.source_root_groups = groups;
        }
        Ok(())
    }
}
