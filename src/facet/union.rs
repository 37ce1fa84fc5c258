/// Filesystem union: a writable overlay on top of a read-only chroot
use crate::chroot::{Chroot, Details, Environment};
use crate::config::keyfile::Keyfile;
use crate::config::types::{ConfigError, Priority, Result, SessionFlags};
use crate::config::validator::Diagnostics;
use crate::facet::{push_keys, Facet, FacetDependency, FacetKind, FacetType, SourceClonableFacet};
use std::path::{Path, PathBuf};

pub const DEFAULT_OVERLAY_DIRECTORY: &str = "/var/lib/chrootbox/union/overlay";
pub const DEFAULT_UNDERLAY_DIRECTORY: &str = "/var/lib/chrootbox/union/underlay";

const UNION_TYPES: &[&str] = &["none", "aufs", "overlay", "overlayfs", "unionfs"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionFacet {
    union_type: String,
    mount_options: String,
    overlay_directory: PathBuf,
    underlay_directory: PathBuf,
}

impl Default for UnionFacet {
    fn default() -> Self {
        Self {
            union_type: "none".to_string(),
            mount_options: String::new(),
            overlay_directory: PathBuf::from(DEFAULT_OVERLAY_DIRECTORY),
            underlay_directory: PathBuf::from(DEFAULT_UNDERLAY_DIRECTORY),
        }
    }
}

impl UnionFacet {
    /// Union of the given type; "none" gives an inactive union
    pub fn new(union_type: &str) -> std::result::Result<Self, String> {
        let mut facet = Self::default();
        facet.set_union_type(union_type)?;
        Ok(facet)
    }

    pub fn is_active(&self) -> bool {
        self.union_type != "none"
    }

    pub fn union_type(&self) -> &str {
        &self.union_type
    }

    pub fn set_union_type(&mut self, union_type: &str) -> std::result::Result<(), String> {
        if !UNION_TYPES.contains(&union_type) {
            return Err(format!(
                "unknown union type (expected one of: {})",
                UNION_TYPES.join(", ")
            ));
        }
        self.union_type = union_type.to_string();
        Ok(())
    }

    pub fn mount_options(&self) -> &str {
        &self.mount_options
    }

    pub fn set_mount_options(&mut self, options: impl Into<String>) {
        self.mount_options = options.into();
    }

    pub fn overlay_directory(&self) -> &Path {
        &self.overlay_directory
    }

    pub fn set_overlay_directory(&mut self, dir: impl Into<PathBuf>) {
        self.overlay_directory = dir.into();
    }

    pub fn underlay_directory(&self) -> &Path {
        &self.underlay_directory
    }

    pub fn set_underlay_directory(&mut self, dir: impl Into<PathBuf>) {
        self.underlay_directory = dir.into();
    }
}

impl FacetType for UnionFacet {
    const KIND: FacetKind = FacetKind::Union;
}

impl Facet for UnionFacet {
    fn kind(&self) -> FacetKind {
        FacetKind::Union
    }

    fn dependencies(&self, chroot: &Chroot) -> Vec<FacetDependency> {
        if !self.is_active() {
            return vec![FacetDependency::Exclude(FacetKind::SourceClonable)];
        }
        if chroot.is_session() || chroot.is_source() {
            return Vec::new();
        }
        vec![FacetDependency::Require(Box::new(
            SourceClonableFacet::default(),
        ))]
    }

    fn session_flags(&self, chroot: &Chroot) -> SessionFlags {
        if self.is_active() && chroot.is_session() {
            SessionFlags::PURGE
        } else {
            SessionFlags::empty()
        }
    }

    fn setup_env(&self, _chroot: &Chroot, env: &mut Environment) {
        env.add("CHROOT_UNION_TYPE", self.union_type.as_str());
        if self.is_active() {
            env.add("CHROOT_UNION_MOUNT_OPTIONS", self.mount_options.as_str());
            env.add_path("CHROOT_UNION_OVERLAY_DIRECTORY", &self.overlay_directory);
            env.add_path("CHROOT_UNION_UNDERLAY_DIRECTORY", &self.underlay_directory);
        }
    }

    fn get_details(&self, _chroot: &Chroot, details: &mut Details) {
        details.add("Filesystem Union Type", &self.union_type);
        if self.is_active() {
            if !self.mount_options.is_empty() {
                details.add("Filesystem Union Mount Options", &self.mount_options);
            }
            details.add_path("Filesystem Union Overlay Directory", &self.overlay_directory);
            details.add_path("Filesystem Union Underlay Directory", &self.underlay_directory);
        }
    }

    fn used_keys(&self, keys: &mut Vec<String>) {
        push_keys(
            keys,
            &[
                "union-type",
                "union-mount-options",
                "union-overlay-directory",
                "union-underlay-directory",
            ],
        );
    }

    fn get_keyfile(&self, chroot: &Chroot, keyfile: &mut Keyfile) {
        let group = chroot.name();
        keyfile.set_value(group, "union-type", &self.union_type);
        if self.is_active() {
            if !self.mount_options.is_empty() {
                keyfile.set_value(group, "union-mount-options", &self.mount_options);
            }
            keyfile.set_value(group, "union-overlay-directory", &self.overlay_directory);
            keyfile.set_value(group, "union-underlay-directory", &self.underlay_directory);
        }
    }

    fn set_keyfile(
        &mut self,
        chroot: &Chroot,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let group = chroot.name();
        if let Some(union_type) =
            keyfile.read::<String>(group, "union-type", Priority::Optional, diagnostics)?
        {
            self.set_union_type(&union_type)
                .map_err(|reason| ConfigError::InvalidValue {
                    group: group.to_string(),
                    key: "union-type".to_string(),
                    value: union_type.clone(),
                    reason,
                })?;
        }
        if let Some(options) =
            keyfile.read(group, "union-mount-options", Priority::Optional, diagnostics)?
        {
            self.mount_options = options;
        }
        if let Some(dir) =
            keyfile.read(group, "union-overlay-directory", Priority::Optional, diagnostics)?
        {
            self.overlay_directory = dir;
        }
        if let Some(dir) =
            keyfile.read(group, "union-underlay-directory", Priority::Optional, diagnostics)?
        {
            self.underlay_directory = dir;
        }
        Ok(())
    }
}
