/// Arbitrary `namespace.key=value` metadata carried by a chroot
///
/// Keys must contain a '.' so they cannot collide with built-in keys. Users
/// (or root) may override keys listed in the modifiable sets.
use crate::chroot::{Chroot, Details, Environment};
use crate::config::keyfile::Keyfile;
use crate::config::types::{ConfigError, Priority, Result, ValidationError};
use crate::config::validator::Diagnostics;
use crate::facet::{push_keys, Facet, FacetKind, FacetType};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserdataFacet {
    data: BTreeMap<String, String>,
    user_modifiable_keys: BTreeSet<String>,
    root_modifiable_keys: BTreeSet<String>,
}

/// A userdata key: dotted, lower-case alphanumerics plus '-' and '_'
fn validate_key(key: &str) -> std::result::Result<(), ValidationError> {
    let well_formed = key.contains('.')
        && !key.starts_with('.')
        && !key.ends_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'));
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            id: key.to_string(),
            reason: "userdata keys must be dotted lower-case names".to_string(),
        })
    }
}

/// `foo.bar-baz` becomes `FOO_BAR_BAZ`
fn env_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

impl UserdataFacet {
    pub fn get_data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set_data(&mut self, key: &str, value: impl Into<String>) -> std::result::Result<(), ValidationError> {
        validate_key(key)?;
        self.data.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn user_modifiable_keys(&self) -> &BTreeSet<String> {
        &self.user_modifiable_keys
    }

    pub fn root_modifiable_keys(&self) -> &BTreeSet<String> {
        &self.root_modifiable_keys
    }

    pub fn set_user_modifiable_keys(&mut self, keys: impl IntoIterator<Item = String>) {
        self.user_modifiable_keys = keys.into_iter().collect();
    }

    pub fn set_root_modifiable_keys(&mut self, keys: impl IntoIterator<Item = String>) {
        self.root_modifiable_keys = keys.into_iter().collect();
    }

    /// Apply caller-supplied overrides, checking each key is modifiable.
    ///
    /// Root may modify keys in either set. Nothing is applied if any key is refused.
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, String>,
        root: bool,
    ) -> std::result::Result<(), ValidationError> {
        for key in overrides.keys() {
            validate_key(key)?;
            let permitted = self.user_modifiable_keys.contains(key)
                || (root && self.root_modifiable_keys.contains(key));
            if !permitted {
                return Err(ValidationError::ProtectedKey {
                    key: key.clone(),
                    reason: if root {
                        "not in user-modifiable-keys or root-modifiable-keys".to_string()
                    } else {
                        "not in user-modifiable-keys".to_string()
                    },
                });
            }
        }
        for (key, value) in overrides {
            self.data.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

impl FacetType for UserdataFacet {
    const KIND: FacetKind = FacetKind::Userdata;
}

impl Facet for UserdataFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Userdata
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        for (key, value) in &self.data {
            env.add(&env_name(key), value.as_str());
        }
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        for (key, value) in &self.data {
            details.add(key, value);
        }
        if !self.user_modifiable_keys.is_empty() {
            let keys: Vec<String> = self.user_modifiable_keys.iter().cloned().collect();
            details.add_list("User Modifiable Keys", &keys);
        }
        if !self.root_modifiable_keys.is_empty() {
            let keys: Vec<String> = self.root_modifiable_keys.iter().cloned().collect();
            details.add_list("Root Modifiable Keys", &keys);
        }
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(keys, &["user-modifiable-keys", "root-modifiable-keys"]);
        keys.extend(self.data.keys().cloned());
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        for (key, value) in &self.data {
            keyfile.set_value(group, key, value);
        }
        if !self.user_modifiable_keys.is_empty() {
            let keys: Vec<String> = self.user_modifiable_keys.iter().cloned().collect();
            keyfile.set_value(group, "user-modifiable-keys", &keys);
        }
        if !self.root_modifiable_keys.is_empty() {
            let keys: Vec<String> = self.root_modifiable_keys.iter().cloned().collect();
            keyfile.set_value(group, "root-modifiable-keys", &keys);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        for key in keyfile.keys(group) {
            if !key.contains('.') {
                continue;
            }
            let value: String = keyfile
                .read(group, key, Priority::Optional, diagnostics)?
                .unwrap_or_default();
            validate_key(key).map_err(|e| ConfigError::InvalidValue {
                group: group.to_string(),
                key: key.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })?;
            self.data.insert(key.to_string(), value);
        }
        if let Some(keys) =
            keyfile.read::<Vec<String>>(group, "user-modifiable-keys", Priority::Optional, diagnostics)?
        {
            self.user_modifiable_keys = keys.into_iter().collect();
        }
        if let Some(keys) =
            keyfile.read::<Vec<String>>(group, "root-modifiable-keys", Priority::Optional, diagnostics)?
        {
            self.root_modifiable_keys = keys.into_iter().collect();
        }
        Ok(())
    }
}
