/// Marks a chroot as a live session derived from a template
use crate::chroot::{Chroot, Details, Environment};
use crate::config::keyfile::Keyfile;
use crate::config::types::{Priority, Result};
use crate::config::validator::Diagnostics;
use crate::facet::{push_keys, Facet, FacetKind, FacetType};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionFacet {
    original_name: String,
    selected_name: String,
}

impl SessionFacet {
    pub fn new(original_name: impl Into<String>, selected_name: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            selected_name: selected_name.into(),
        }
    }

    /// Name of the template the session was cloned from
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Name (or alias) the user asked for
    pub fn selected_name(&self) -> &str {
        &self.selected_name
    }
}

impl FacetType for SessionFacet {
    const KIND: FacetKind = FacetKind::Session;
}

impl Facet for SessionFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Session
    }

    fn setup_env(&self, chroot: &Chroot, env: &mut Environment) {
        env.add("SESSION_ID", chroot.name());
        env.add("CHROOT_ALIAS", self.selected_name.as_str());
    }

    fn get_details(&self, chroot: &Chroot, details: &mut Details) {
        details.add("Session ID", chroot.name());
        if !self.original_name.is_empty() {
            details.add("Original Chroot Name", &self.original_name);
        }
        if !self.selected_name.is_empty() {
            details.add("Selected Chroot Name", &self.selected_name);
        }
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["original-name", "selected-name"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        if !self.original_name.is_empty() {
            keyfile.set_value(chroot.name(), "original-name", &self.original_name);
        }
        if !self.selected_name.is_empty() {
            keyfile.set_value(chroot.name(), "selected-name", &self.selected_name);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(name) = keyfile.read(group, "original-name", Priority::Optional, diagnostics)? {
            self.original_name = name;
        }
        if let Some(name) = keyfile.read(group, "selected-name", Priority::Optional, diagnostics)? {
            self.selected_name = name;
        }
        Ok(())
    }
}
