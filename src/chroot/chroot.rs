/// The chroot aggregate: identity, policy attributes and attached facets
use crate::chroot::clone::SessionRequest;
use crate::chroot::details::Details;
use crate::chroot::environment::{Environment, DEFAULT_ENVIRONMENT_FILTER};
use crate::config::keyfile::Keyfile;
use crate::config::types::{
    ChrootError, ConfigError, Priority, Result, SessionFlags, Verbosity,
};
use crate::config::validator::{check_unknown_keys, Diagnostics};
use crate::facet::storage::{
    BlockDeviceFacet, BtrfsSnapshotFacet, CustomFacet, DirectoryFacet, FileFacet, LoopbackFacet,
    LvmSnapshotFacet, StorageFacet,
};
use crate::facet::{
    push_keys, Facet, FacetDependency, FacetKind, FacetType, PersonalityFacet,
    SessionClonableFacet, SessionFacet, SourceClonableFacet, UnionFacet, UserdataFacet,
};
use crate::utils::identifier::validate_chroot_name;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Chroot types known to `Chroot::create`
pub const CHROOT_TYPES: &[&str] = &[
    "block-device",
    "btrfs-snapshot",
    "custom",
    "directory",
    "file",
    "loopback",
    "lvm-snapshot",
];

const DEPENDENCY_PASSES: usize = 4;

#[derive(Clone, Debug)]
pub struct Chroot {
    name: String,
    description: String,
    aliases: Vec<String>,
    mount_location: PathBuf,
    users: Vec<String>,
    groups: Vec<String>,
    root_users: Vec<String>,
    root_groups: Vec<String>,
    environment_filter: String,
    script_config: PathBuf,
    run_setup_scripts: bool,
    verbosity: Verbosity,
    preserve_environment: bool,
    default_shell: String,
    command_prefix: Vec<String>,
    original: bool,
    storage: FacetKind,
    facets: BTreeMap<FacetKind, Box<dyn Facet>>,
}

impl Chroot {
    /// Chroot with the given storage plus the facets every chroot carries
    pub fn new<S>(name: impl Into<String>, storage: S) -> Self
    where
        S: Facet + StorageFacet + 'static,
    {
        Self::from_storage(name.into(), Box::new(storage))
    }

    fn from_storage(name: String, storage: Box<dyn Facet>) -> Self {
        let storage_kind = storage.kind();
        let mut chroot = Self {
            name,
            description: String::new(),
            aliases: Vec::new(),
            mount_location: PathBuf::new(),
            users: Vec::new(),
            groups: Vec::new(),
            root_users: Vec::new(),
            root_groups: Vec::new(),
            environment_filter: DEFAULT_ENVIRONMENT_FILTER.to_string(),
            script_config: PathBuf::new(),
            run_setup_scripts: true,
            verbosity: Verbosity::Normal,
            preserve_environment: false,
            default_shell: String::new(),
            command_prefix: Vec::new(),
            original: true,
            storage: storage_kind,
            facets: BTreeMap::new(),
        };
        chroot.facets.insert(storage_kind, storage);
        chroot.facets.insert(FacetKind::Userdata, Box::new(UserdataFacet::default()));
        chroot
            .facets
            .insert(FacetKind::Personality, Box::new(PersonalityFacet::default()));
        chroot.resolve_dependencies();
        chroot
    }

    /// Chroot of a named type with that type's default facet set
    pub fn create(chroot_type: &str, name: &str) -> Result<Self> {
        let mut chroot = match chroot_type {
            "block-device" => Chroot::new(name, BlockDeviceFacet::default()),
            "loopback" => Chroot::new(name, LoopbackFacet::default()),
            "lvm-snapshot" => Chroot::new(name, LvmSnapshotFacet::default()),
            "btrfs-snapshot" => Chroot::new(name, BtrfsSnapshotFacet::default()),
            "directory" => Chroot::new(name, DirectoryFacet::default()),
            "file" => Chroot::new(name, FileFacet::default()),
            "custom" => Chroot::new(name, CustomFacet::default()),
            other => {
                return Err(ConfigError::UnknownChrootType {
                    group: name.to_string(),
                    chroot_type: other.to_string(),
                }
                .into())
            }
        };

        match chroot.storage {
            FacetKind::BlockDevice | FacetKind::Loopback | FacetKind::Directory => {
                chroot.attach(Box::new(SessionClonableFacet));
                chroot.attach(Box::new(UnionFacet::default()));
            }
            FacetKind::LvmSnapshot | FacetKind::BtrfsSnapshot | FacetKind::File => {
                chroot.attach(Box::new(SessionClonableFacet));
                chroot.attach(Box::new(SourceClonableFacet::default()));
            }
            _ => {}
        }
        Ok(chroot)
    }

    /// Build a chroot from the keyfile group `name`.
    ///
    /// With `session` set the chroot is read as a live session record.
    pub fn from_keyfile(
        keyfile: &Keyfile,
        name: &str,
        session: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        validate_chroot_name(name)?;
        let chroot_type: String = keyfile
            .read(name, "type", Priority::Required, diagnostics)?
            .unwrap_or_default();
        let mut chroot = Chroot::create(&chroot_type, name)?;
        if session {
            chroot.remove_kind(FacetKind::SessionClonable);
            chroot.remove_kind(FacetKind::SourceClonable);
            chroot.attach(Box::new(SessionFacet::default()));
        }
        chroot.set_keyfile(keyfile, diagnostics)?;
        Ok(chroot)
    }

    // Facet management

    /// Insert or replace a facet.
    ///
    /// Adding `session` drops `session-clonable` and vice versa; likewise
    /// `source` and `source-clonable`. The storage facet can only be replaced
    /// by one of the same kind.
    pub fn add_facet<F: Facet + 'static>(&mut self, facet: F) -> Result<()> {
        self.add_boxed_facet(Box::new(facet))
    }

    pub fn add_boxed_facet(&mut self, facet: Box<dyn Facet>) -> Result<()> {
        let kind = facet.kind();
        if kind.is_storage() && kind != self.storage {
            return Err(ChrootError::Unsupported {
                chroot: self.name.clone(),
                operation: format!("replacing {} storage with {}", self.storage, kind),
            });
        }
        self.attach(facet);
        Ok(())
    }

    /// Insert a facet known not to change the storage kind
    pub(crate) fn attach(&mut self, facet: Box<dyn Facet>) {
        let kind = facet.kind();
        if let Some(other) = kind.counterpart() {
            self.facets.remove(&other);
        }
        self.facets.insert(kind, facet);
        self.resolve_dependencies();
    }

    /// Remove a facet; the storage facet is never removed
    pub fn remove_facet<F: FacetType>(&mut self) -> bool {
        self.remove_kind(F::KIND)
    }

    pub(crate) fn remove_kind(&mut self, kind: FacetKind) -> bool {
        if kind == self.storage {
            return false;
        }
        self.facets.remove(&kind).is_some()
    }

    pub fn get_facet<F: FacetType>(&self) -> Option<&F> {
        self.facets
            .get(&F::KIND)
            .and_then(|facet| facet.as_any().downcast_ref::<F>())
    }

    pub fn get_facet_mut<F: FacetType>(&mut self) -> Option<&mut F> {
        self.facets
            .get_mut(&F::KIND)
            .and_then(|facet| facet.as_any_mut().downcast_mut::<F>())
    }

    pub fn has_facet(&self, kind: FacetKind) -> bool {
        self.facets.contains_key(&kind)
    }

    pub fn facet_kinds(&self) -> Vec<FacetKind> {
        self.facets.keys().copied().collect()
    }

    /// Apply `Require`/`Exclude` dependencies until the facet set is stable
    fn resolve_dependencies(&mut self) {
        for _ in 0..DEPENDENCY_PASSES {
            let deps: Vec<FacetDependency> = self
                .facets
                .values()
                .flat_map(|facet| facet.dependencies(self))
                .collect();

            let mut changed = false;
            for dep in deps {
                match dep {
                    FacetDependency::Require(facet) => {
                        let kind = facet.kind();
                        let blocked = kind.is_storage()
                            || kind
                                .counterpart()
                                .map(|other| self.facets.contains_key(&other))
                                .unwrap_or(false);
                        if !blocked && !self.facets.contains_key(&kind) {
                            self.facets.insert(kind, facet);
                            changed = true;
                        }
                    }
                    FacetDependency::Exclude(kind) => {
                        if !kind.is_storage() && self.facets.remove(&kind).is_some() {
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Copy of this chroot on different storage, for source clones
    pub(crate) fn with_storage(&self, storage: Box<dyn Facet>) -> Chroot {
        let mut copy = self.clone();
        copy.facets.remove(&copy.storage);
        copy.facets.remove(&FacetKind::Mountable);
        copy.storage = storage.kind();
        copy.facets.insert(copy.storage, storage);
        if let Some(mountable) = self.facets.get(&FacetKind::Mountable) {
            let wants_mount = copy
                .storage_facet_dyn()
                .map(|facet| {
                    facet.dependencies(&copy).iter().any(|dep| {
                        matches!(dep, FacetDependency::Require(f) if f.kind() == FacetKind::Mountable)
                    })
                })
                .unwrap_or(false);
            if wants_mount {
                copy.facets.insert(FacetKind::Mountable, mountable.clone());
            }
        }
        copy.resolve_dependencies();
        copy
    }

    fn storage_facet_dyn(&self) -> Option<&dyn Facet> {
        self.facets.get(&self.storage).map(|facet| facet.as_ref())
    }

    pub fn storage_facet(&self) -> Option<&dyn StorageFacet> {
        self.storage_facet_dyn().and_then(|facet| facet.as_storage())
    }

    // Cloning

    /// Derive a session chroot; fails with `Unsupported` unless session-clonable
    pub fn clone_session(&self, request: &SessionRequest) -> Result<Chroot> {
        match self.get_facet::<SessionClonableFacet>() {
            Some(facet) => facet.clone_session(self, request),
            None => Err(ChrootError::Unsupported {
                chroot: self.name.clone(),
                operation: "session cloning".to_string(),
            }),
        }
    }

    /// Derive the source chroot, if this chroot has one
    pub fn clone_source(&self) -> Option<Chroot> {
        self.get_facet::<SourceClonableFacet>()
            .filter(|facet| facet.source_clone())
            .map(|facet| facet.clone_source(self))
    }

    // Identity and policy

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn set_aliases(&mut self, aliases: Vec<String>) {
        self.aliases = aliases;
    }

    pub fn chroot_type(&self) -> &'static str {
        self.storage.name()
    }

    pub fn storage_kind(&self) -> FacetKind {
        self.storage
    }

    pub fn mount_location(&self) -> &Path {
        &self.mount_location
    }

    pub fn set_mount_location(&mut self, location: impl Into<PathBuf>) {
        self.mount_location = location.into();
    }

    /// Root of the chroot as seen from the host
    pub fn path(&self) -> PathBuf {
        self.storage_facet()
            .map(|storage| storage.path(self))
            .unwrap_or_default()
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn set_users(&mut self, users: Vec<String>) {
        self.users = users;
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn set_groups(&mut self, groups: Vec<String>) {
        self.groups = groups;
    }

    pub fn root_users(&self) -> &[String] {
        &self.root_users
    }

    pub fn set_root_users(&mut self, users: Vec<String>) {
        self.root_users = users;
    }

    pub fn root_groups(&self) -> &[String] {
        &self.root_groups
    }

    pub fn set_root_groups(&mut self, groups: Vec<String>) {
        self.root_groups = groups;
    }

    pub fn environment_filter(&self) -> &str {
        &self.environment_filter
    }

    /// Set the filter pattern; rejected if it is not a valid regular expression
    pub fn set_environment_filter(&mut self, pattern: &str) -> Result<()> {
        Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
            group: self.name.clone(),
            key: "environment-filter".to_string(),
            value: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.environment_filter = pattern.to_string();
        Ok(())
    }

    pub fn script_config(&self) -> &Path {
        &self.script_config
    }

    pub fn set_script_config(&mut self, path: impl Into<PathBuf>) {
        self.script_config = path.into();
    }

    pub fn run_setup_scripts(&self) -> bool {
        self.run_setup_scripts
    }

    pub fn set_run_setup_scripts(&mut self, run: bool) {
        self.run_setup_scripts = run;
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    pub fn preserve_environment(&self) -> bool {
        self.preserve_environment
    }

    pub fn set_preserve_environment(&mut self, preserve: bool) {
        self.preserve_environment = preserve;
    }

    pub fn default_shell(&self) -> &str {
        &self.default_shell
    }

    pub fn set_default_shell(&mut self, shell: impl Into<String>) {
        self.default_shell = shell.into();
    }

    pub fn command_prefix(&self) -> &[String] {
        &self.command_prefix
    }

    pub fn set_command_prefix(&mut self, prefix: Vec<String>) {
        self.command_prefix = prefix;
    }

    /// False on source clones
    pub fn original(&self) -> bool {
        self.original
    }

    pub fn set_original(&mut self, original: bool) {
        self.original = original;
    }

    pub fn is_session(&self) -> bool {
        self.has_facet(FacetKind::Session)
    }

    pub fn is_source(&self) -> bool {
        self.has_facet(FacetKind::Source)
    }

    // Aggregated facet behaviour

    pub fn session_flags(&self) -> SessionFlags {
        self.facets
            .values()
            .fold(SessionFlags::empty(), |flags, facet| flags | facet.session_flags(self))
    }

    /// Variables describing this chroot to setup scripts
    pub fn setup_env(&self, env: &mut Environment) {
        let flags = self.session_flags();
        env.add("CHROOT_TYPE", self.chroot_type());
        env.add("CHROOT_NAME", self.name.as_str());
        env.add("CHROOT_DESCRIPTION", self.description.as_str());
        env.add_path("CHROOT_MOUNT_LOCATION", &self.mount_location);
        env.add_path("CHROOT_PATH", &self.path());
        env.add_path("CHROOT_SCRIPT_CONFIG", &self.script_config);
        env.add_bool("CHROOT_SESSION_CREATE", flags.contains(SessionFlags::CREATE));
        env.add_bool("CHROOT_SESSION_CLONE", flags.contains(SessionFlags::CLONE));
        env.add_bool("CHROOT_SESSION_PURGE", flags.contains(SessionFlags::PURGE));
        env.add_bool("CHROOT_SESSION_SOURCE", self.is_source());

        for facet in self.facets.values() {
            facet.setup_env(self, env);
        }
    }

    /// The caller's environment with filtered variables removed
    pub fn filtered_environment(&self, host: &Environment) -> Result<Environment> {
        let filter = Regex::new(&self.environment_filter).map_err(|e| ConfigError::InvalidValue {
            group: self.name.clone(),
            key: "environment-filter".to_string(),
            value: self.environment_filter.clone(),
            reason: e.to_string(),
        })?;
        let mut env = host.clone();
        env.filter(&filter);
        Ok(env)
    }

    pub fn get_details(&self, details: &mut Details) {
        let flags = self.session_flags();
        details.add("Name", &self.name);
        details.add("Description", &self.description);
        details.add("Type", self.chroot_type());
        details.add("Message Verbosity", self.verbosity);
        details.add_list("Users", &self.users);
        details.add_list("Groups", &self.groups);
        details.add_list("Root Users", &self.root_users);
        details.add_list("Root Groups", &self.root_groups);
        details.add_list("Aliases", &self.aliases);
        details.add_bool("Preserve Environment", self.preserve_environment);
        if !self.default_shell.is_empty() {
            details.add("Default Shell", &self.default_shell);
        }
        if !self.command_prefix.is_empty() {
            details.add_list("Command Prefix", &self.command_prefix);
        }
        details.add("Environment Filter", &self.environment_filter);
        details.add_bool("Run Setup Scripts", self.run_setup_scripts);
        if !self.script_config.as_os_str().is_empty() {
            details.add_path("Script Configuration", &self.script_config);
        }
        details.add_bool("Session Managed", flags.contains(SessionFlags::CREATE));
        details.add_bool("Session Cloned", flags.contains(SessionFlags::CLONE));
        details.add_bool("Session Purged", flags.contains(SessionFlags::PURGE));
        if !self.mount_location.as_os_str().is_empty() {
            details.add_path("Mount Location", &self.mount_location);
        }
        details.add_path("Path", &self.path());

        for facet in self.facets.values() {
            facet.get_details(self, details);
        }
    }

    /// Details under a title reflecting what kind of chroot this is
    pub fn details(&self) -> Details {
        let title = if self.is_session() {
            "Session"
        } else if self.is_source() {
            "Source"
        } else {
            "Chroot"
        };
        let mut details = Details::new(title);
        self.get_details(&mut details);
        details
    }

    /// Every key this chroot reads from its definition
    pub fn used_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        push_keys(
            &mut keys,
            &[
                "type",
                "description",
                "aliases",
                "users",
                "groups",
                "root-users",
                "root-groups",
                "environment-filter",
                "message-verbosity",
                "preserve-environment",
                "shell",
                "command-prefix",
                "mount-location",
                "script-config",
                "run-setup-scripts",
                "priority",
                "run-exec-scripts",
            ],
        );
        for facet in self.facets.values() {
            facet.used_keys(&mut keys);
        }
        keys
    }

    /// Write this chroot as a keyfile group named after it
    pub fn get_keyfile(&self, keyfile: &mut Keyfile) {
        let group = self.name.as_str();
        keyfile.set_raw(group, "type", self.chroot_type());
        if !self.description.is_empty() {
            keyfile.set_value(group, "description", &self.description);
        }
        for (key, list) in [
            ("aliases", &self.aliases),
            ("users", &self.users),
            ("groups", &self.groups),
            ("root-users", &self.root_users),
            ("root-groups", &self.root_groups),
            ("command-prefix", &self.command_prefix),
        ] {
            if !list.is_empty() {
                keyfile.set_value(group, key, list);
            }
        }
        keyfile.set_value(group, "environment-filter", &self.environment_filter);
        keyfile.set_value(group, "message-verbosity", &self.verbosity);
        keyfile.set_value(group, "preserve-environment", &self.preserve_environment);
        keyfile.set_value(group, "run-setup-scripts", &self.run_setup_scripts);
        if !self.default_shell.is_empty() {
            keyfile.set_value(group, "shell", &self.default_shell);
        }
        if !self.mount_location.as_os_str().is_empty() {
            keyfile.set_value(group, "mount-location", &self.mount_location);
        }
        if !self.script_config.as_os_str().is_empty() {
            keyfile.set_value(group, "script-config", &self.script_config);
        }

        for facet in self.facets.values() {
            facet.get_keyfile(self, keyfile);
        }
    }

    /// Read this chroot's group from `keyfile`, then every facet's keys.
    ///
    /// Facets added by dependency resolution during the read get their keys
    /// read too. Unclaimed keys are reported as warnings.
    pub fn set_keyfile(&mut self, keyfile: &Keyfile, diagnostics: &mut Diagnostics) -> Result<()> {
        let group = self.name.clone();
        let group = group.as_str();

        let _: Option<String> = keyfile.read(group, "name", Priority::Disallowed, diagnostics)?;
        if let Some(chroot_type) =
            keyfile.read::<String>(group, "type", Priority::Optional, diagnostics)?
        {
            if chroot_type != self.chroot_type() {
                return Err(ConfigError::InvalidValue {
                    group: group.to_string(),
                    key: "type".to_string(),
                    value: chroot_type,
                    reason: format!("chroot is of type {}", self.chroot_type()),
                }
                .into());
            }
        }

        if let Some(v) = keyfile.read(group, "description", Priority::Optional, diagnostics)? {
            self.description = v;
        }
        if let Some(v) = keyfile.read(group, "aliases", Priority::Optional, diagnostics)? {
            self.aliases = v;
        }
        if let Some(v) = keyfile.read(group, "users", Priority::Optional, diagnostics)? {
            self.users = v;
        }
        if let Some(v) = keyfile.read(group, "groups", Priority::Optional, diagnostics)? {
            self.groups = v;
        }
        if let Some(v) = keyfile.read(group, "root-users", Priority::Optional, diagnostics)? {
            self.root_users = v;
        }
        if let Some(v) = keyfile.read(group, "root-groups", Priority::Optional, diagnostics)? {
            self.root_groups = v;
        }
        if let Some(v) =
            keyfile.read::<String>(group, "environment-filter", Priority::Optional, diagnostics)?
        {
            self.set_environment_filter(&v)?;
        }
        if let Some(v) = keyfile.read(group, "message-verbosity", Priority::Optional, diagnostics)? {
            self.verbosity = v;
        }
        if let Some(v) =
            keyfile.read(group, "preserve-environment", Priority::Optional, diagnostics)?
        {
            self.preserve_environment = v;
        }
        if let Some(v) = keyfile.read(group, "shell", Priority::Optional, diagnostics)? {
            self.default_shell = v;
        }
        if let Some(v) = keyfile.read(group, "command-prefix", Priority::Optional, diagnostics)? {
            self.command_prefix = v;
        }
        if let Some(v) = keyfile.read(group, "mount-location", Priority::Optional, diagnostics)? {
            self.mount_location = v;
        }
        if let Some(v) = keyfile.read(group, "script-config", Priority::Deprecated, diagnostics)? {
            self.script_config = v;
        }
        if let Some(v) = keyfile.read(group, "run-setup-scripts", Priority::Optional, diagnostics)? {
            self.run_setup_scripts = v;
        }
        let _: Option<String> = keyfile.read(group, "priority", Priority::Obsolete, diagnostics)?;
        let _: Option<String> =
            keyfile.read(group, "run-exec-scripts", Priority::Obsolete, diagnostics)?;

        let mut pending = self.facet_kinds();
        let mut seen = Vec::new();
        while !pending.is_empty() {
            for kind in pending.drain(..) {
                self.read_facet_keys(kind, keyfile, diagnostics)?;
                seen.push(kind);
            }
            self.resolve_dependencies();
            pending = self
                .facet_kinds()
                .into_iter()
                .filter(|kind| !seen.contains(kind))
                .collect();
        }

        check_unknown_keys(keyfile, group, &self.used_keys(), diagnostics);
        Ok(())
    }

    /// Detach one facet, let it read its keys against `self`, then reattach it
    fn read_facet_keys(
        &mut self,
        kind: FacetKind,
        keyfile: &Keyfile,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let Some(mut facet) = self.facets.remove(&kind) else {
            return Ok(());
        };
        let outcome = facet.set_keyfile(self, keyfile, diagnostics);
        self.facets.insert(kind, facet);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::MountableFacet;

    #[test]
    fn test_storage_facets_pull_in_mountable() {
        let chroot = Chroot::new("sid", BlockDeviceFacet::new("/dev/sda1"));
        assert!(chroot.has_facet(FacetKind::Mountable));
        let chroot = Chroot::new("sid", DirectoryFacet::new("/srv/sid"));
        assert!(!chroot.has_facet(FacetKind::Mountable));
    }

    #[test]
    fn test_session_excludes_session_clonable() {
        let mut chroot = Chroot::create("directory", "sid").unwrap();
        assert!(chroot.has_facet(FacetKind::SessionClonable));

        chroot.add_facet(SessionFacet::new("sid", "sid")).unwrap();
        assert!(chroot.has_facet(FacetKind::Session));
        assert!(!chroot.has_facet(FacetKind::SessionClonable));

        chroot.add_facet(SessionClonableFacet).unwrap();
        assert!(!chroot.has_facet(FacetKind::Session));
        assert!(chroot.has_facet(FacetKind::SessionClonable));
    }

    #[test]
    fn test_storage_cannot_be_swapped_or_removed() {
        let mut chroot = Chroot::create("directory", "sid").unwrap();
        assert!(chroot.add_facet(FileFacet::new("/srv/sid.tar")).is_err());
        assert!(!chroot.remove_facet::<DirectoryFacet>());
        assert!(chroot.add_facet(DirectoryFacet::new("/srv/other")).is_ok());
        assert_eq!(chroot.chroot_type(), "directory");
        assert_eq!(chroot.path(), PathBuf::from("/srv/other"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            Chroot::create("plan9", "sid"),
            Err(ChrootError::Config(ConfigError::UnknownChrootType { .. }))
        ));
    }

    #[test]
    fn test_active_union_requires_source_clonable() {
        let keyfile = Keyfile::parse(
            "[sid]\ntype=directory\ndirectory=/srv/sid\nunion-type=overlay\nsource-users=builder\n",
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let chroot = Chroot::from_keyfile(&keyfile, "sid", false, &mut diag).unwrap();

        let source = chroot.get_facet::<SourceClonableFacet>().unwrap();
        assert_eq!(source.source_users(), &["builder".to_string()]);
        assert!(chroot.session_flags().contains(SessionFlags::CLONE));
        assert!(diag.is_empty(), "{:?}", diag);
    }

    #[test]
    fn test_inactive_union_excludes_source_clonable() {
        let mut chroot = Chroot::create("block-device", "sid").unwrap();
        chroot.add_facet(SourceClonableFacet::default()).unwrap();
        assert!(!chroot.has_facet(FacetKind::SourceClonable));
    }

    #[test]
    fn test_custom_toggles_clonability() {
        let keyfile = Keyfile::parse(
            "[c]\ntype=custom\ncustom-session-cloneable=false\ncustom-source-cloneable=true\n",
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let chroot = Chroot::from_keyfile(&keyfile, "c", false, &mut diag).unwrap();
        assert!(!chroot.has_facet(FacetKind::SessionClonable));
        assert!(chroot.has_facet(FacetKind::SourceClonable));
        assert_eq!(chroot.session_flags(), SessionFlags::CLONE);
    }

    #[test]
    fn test_disallowed_and_unknown_keys() {
        let keyfile =
            Keyfile::parse("[sid]\ntype=directory\ndirectory=/srv/sid\nname=other\n").unwrap();
        let mut diag = Diagnostics::new();
        assert!(matches!(
            Chroot::from_keyfile(&keyfile, "sid", false, &mut diag),
            Err(ChrootError::Config(ConfigError::DisallowedKeyUsed { .. }))
        ));

        let keyfile =
            Keyfile::parse("[sid]\ntype=directory\ndirectory=/srv/sid\nfrob=1\nsetup.fstab=x\n")
                .unwrap();
        let mut diag = Diagnostics::new();
        let chroot = Chroot::from_keyfile(&keyfile, "sid", false, &mut diag).unwrap();
        assert_eq!(diag.warnings().len(), 1);
        assert_eq!(
            chroot.get_facet::<UserdataFacet>().unwrap().get_data("setup.fstab"),
            Some("x")
        );
    }

    #[test]
    fn test_mount_device_disallowed_outside_sessions() {
        let keyfile = Keyfile::parse(
            "[sid]\ntype=block-device\ndevice=/dev/sda1\nmount-device=/dev/sda2\n",
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        assert!(Chroot::from_keyfile(&keyfile, "sid", false, &mut diag).is_err());
        let chroot = Chroot::from_keyfile(&keyfile, "sid", true, &mut diag).unwrap();
        assert_eq!(
            chroot.get_facet::<MountableFacet>().unwrap().mount_device(),
            Path::new("/dev/sda2")
        );
    }

    #[test]
    fn test_filtered_environment() {
        let mut chroot = Chroot::create("directory", "sid").unwrap();
        let host: Environment = [("LD_PRELOAD", "x"), ("HOME", "/root"), ("SECRET", "s")]
            .into_iter()
            .collect();

        let env = chroot.filtered_environment(&host).unwrap();
        assert!(env.get("LD_PRELOAD").is_none());
        assert_eq!(env.get("HOME"), Some("/root"));

        chroot.set_environment_filter("^SECRET$").unwrap();
        let env = chroot.filtered_environment(&host).unwrap();
        assert_eq!(env.get("LD_PRELOAD"), Some("x"));
        assert!(env.get("SECRET").is_none());

        assert!(chroot.set_environment_filter("(unclosed").is_err());
    }
}
