/// Execution domain (personality) the session command runs under
use crate::chroot::{Chroot, Details, Environment};
use crate::config::keyfile::Keyfile;
use crate::config::types::{ConfigError, Priority, Result};
use crate::config::validator::Diagnostics;
use crate::facet::{push_keys, Facet, FacetKind, FacetType};

const PERSONALITIES: &[&str] = &[
    "undefined",
    "linux",
    "linux_32bit",
    "linux32",
    "linux64",
    "bsd",
    "svr3",
    "svr4",
    "sunos",
    "solaris",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonalityFacet {
    personality: String,
}

impl Default for PersonalityFacet {
    fn default() -> Self {
        Self {
            personality: "undefined".to_string(),
        }
    }
}

impl PersonalityFacet {
    pub fn personality(&self) -> &str {
        &self.personality
    }

    pub fn set_personality(&mut self, name: &str) -> std::result::Result<(), String> {
        if !PERSONALITIES.contains(&name) {
            return Err(format!("unknown personality '{}'", name));
        }
        self.personality = name.to_string();
        Ok(())
    }

    fn is_defined(&self) -> bool {
        self.personality != "undefined"
    }
}

impl FacetType for PersonalityFacet {
    const KIND: FacetKind = FacetKind::Personality;
}

impl Facet for PersonalityFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Personality
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add("CHROOT_PERSONALITY", self.personality.as_str());
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        if self.is_defined() {
            details.add("Personality", &self.personality);
        }
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["personality"]);
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        if self.is_defined() {
            keyfile.set_value(chroot.name(), "personality", &self.personality);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(name) =
            keyfile.read::<String>(group, "personality", Priority::Optional, diagnostics)?
        {
            self.set_personality(&name)
                .map_err(|reason| ConfigError::InvalidValue {
                    group: group.to_string(),
                    key: "personality".to_string(),
                    value: name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }
}
