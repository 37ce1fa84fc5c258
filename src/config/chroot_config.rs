//! Chroot configuration
//!
//! Chroots live in three namespaces: `chroot` for templates read from
//! definition files, `source` for the source clones generated from them, and
//! `session` for live sessions read back from the session directory. Names
//! and aliases are unique within a namespace. A name may be qualified as
//! `namespace:name`.

use crate::chroot::Chroot;
use crate::config::keyfile::Keyfile;
use crate::config::types::{ConfigError, Result, SessionFlags};
use crate::config::validator::Diagnostics;
use crate::observability::LogContext;
use crate::utils::identifier::{is_valid_filename, validate_chroot_name};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

pub const CHROOT_NAMESPACE: &str = "chroot";
pub const SOURCE_NAMESPACE: &str = "source";
pub const SESSION_NAMESPACE: &str = "session";

const NAMESPACES: [&str; 3] = [CHROOT_NAMESPACE, SOURCE_NAMESPACE, SESSION_NAMESPACE];

#[derive(Debug, Default)]
struct Namespace {
    chroots: BTreeMap<String, Chroot>,
    /// alias -> chroot name
    aliases: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ChrootConfig {
    log: LogContext,
    required_owner: Option<u32>,
    namespaces: BTreeMap<&'static str, Namespace>,
}

impl ChrootConfig {
    pub fn new(log: LogContext) -> Self {
        Self {
            log,
            required_owner: None,
            namespaces: NAMESPACES
                .iter()
                .map(|ns| (*ns, Namespace::default()))
                .collect(),
        }
    }

    /// Only accept definition files owned by `uid`
    pub fn with_required_owner(mut self, uid: u32) -> Self {
        self.required_owner = Some(uid);
        self
    }

    /// Load a definition file, or every eligible file in a directory
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if path.is_dir() {
            self.add_config_directory(path)
        } else {
            self.add_config_file(path)
        }
    }

    pub fn add_config_file(&mut self, path: &Path) -> Result<()> {
        self.check_file(path)?;
        let keyfile = Keyfile::load(path)?;
        debug!("Loading chroot definitions from {}", path.display());
        self.load_keyfile(&keyfile, CHROOT_NAMESPACE)
    }

    /// Load every file whose name passes the run-parts rules, in name order
    pub fn add_config_directory(&mut self, dir: &Path) -> Result<()> {
        for path in self.eligible_files(dir)? {
            self.add_config_file(&path)?;
        }
        Ok(())
    }

    /// Read back recorded sessions; a missing directory holds no sessions
    pub fn add_session_directory(&mut self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for path in self.eligible_files(dir)? {
            let keyfile = Keyfile::load(&path)?;
            self.load_keyfile(&keyfile, SESSION_NAMESPACE)?;
        }
        Ok(())
    }

    /// Add every group of `keyfile` to `namespace`.
    ///
    /// Templates that can be source-cloned also get their source chroot.
    pub fn load_keyfile(&mut self, keyfile: &Keyfile, namespace: &str) -> Result<()> {
        let session = namespace == SESSION_NAMESPACE;
        for group in keyfile.groups() {
            let mut diagnostics = Diagnostics::new();
            let chroot = Chroot::from_keyfile(keyfile, group, session, &mut diagnostics)?;
            diagnostics.report(&self.log);

            if namespace == CHROOT_NAMESPACE
                && chroot.session_flags().contains(SessionFlags::CLONE)
            {
                if let Some(source) = chroot.clone_source() {
                    self.add_chroot(source, SOURCE_NAMESPACE)?;
                }
            }
            self.add_chroot(chroot, namespace)?;
        }
        Ok(())
    }

    /// Add a chroot; its name and aliases must be new to the namespace
    pub fn add_chroot(&mut self, chroot: Chroot, namespace: &str) -> Result<()> {
        let ns = self
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| ConfigError::UnknownNamespace(namespace.to_string()))?;
        let name = chroot.name().to_string();

        if ns.chroots.contains_key(&name) {
            return Err(ConfigError::DuplicateChroot {
                namespace: namespace.to_string(),
                name,
            }
            .into());
        }
        if let Some(existing) = ns.aliases.get(&name) {
            return Err(ConfigError::DuplicateAlias {
                namespace: namespace.to_string(),
                alias: name,
                existing: existing.clone(),
            }
            .into());
        }
        for alias in chroot.aliases() {
            validate_chroot_name(alias)?;
            let existing = ns
                .aliases
                .get(alias)
                .cloned()
                .or_else(|| ns.chroots.contains_key(alias).then(|| alias.clone()))
                .or_else(|| (*alias == name).then(|| name.clone()));
            if let Some(existing) = existing {
                return Err(ConfigError::DuplicateAlias {
                    namespace: namespace.to_string(),
                    alias: alias.clone(),
                    existing,
                }
                .into());
            }
        }

        for alias in chroot.aliases() {
            ns.aliases.insert(alias.clone(), name.clone());
        }
        self.log
            .info(format!("Added {}:{} ({})", namespace, name, chroot.chroot_type()));
        ns.chroots.insert(name, chroot);
        Ok(())
    }

    /// Chroot by exact name; `name` may be qualified
    pub fn find_chroot(&self, namespace: &str, name: &str) -> Option<&Chroot> {
        let (qualifier, name) = split_qualified(name);
        self.namespaces
            .get(qualifier.unwrap_or(namespace))?
            .chroots
            .get(name)
    }

    /// Chroot by name or alias; `name` may be qualified
    pub fn find_alias(&self, namespace: &str, name: &str) -> Option<&Chroot> {
        let (qualifier, name) = split_qualified(name);
        let namespace = qualifier.unwrap_or(namespace);
        let canonical = self.lookup_alias(namespace, name)?;
        self.find_chroot(namespace, canonical)
    }

    /// Real name behind a name or alias
    pub fn lookup_alias<'a>(&'a self, namespace: &str, name: &'a str) -> Option<&'a str> {
        let (qualifier, name) = split_qualified(name);
        let ns = self.namespaces.get(qualifier.unwrap_or(namespace))?;
        if ns.chroots.contains_key(name) {
            return Some(name);
        }
        ns.aliases.get(name).map(String::as_str)
    }

    /// Qualified names of every chroot in `namespace`, sorted
    pub fn get_chroot_list(&self, namespace: &str) -> Result<Vec<String>> {
        let ns = self.namespace(namespace)?;
        Ok(ns
            .chroots
            .keys()
            .map(|name| format!("{}:{}", namespace, name))
            .collect())
    }

    /// Qualified names and aliases in `namespace`, sorted
    pub fn get_alias_list(&self, namespace: &str) -> Result<Vec<String>> {
        let ns = self.namespace(namespace)?;
        let mut names: Vec<String> = ns
            .chroots
            .keys()
            .chain(ns.aliases.keys())
            .map(|name| format!("{}:{}", namespace, name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// The requested names that resolve to nothing
    pub fn validate_chroots(&self, namespace: &str, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.find_alias(namespace, name).is_none())
            .cloned()
            .collect()
    }

    pub fn chroots(&self, namespace: &str) -> impl Iterator<Item = &Chroot> {
        self.namespaces
            .get(namespace)
            .into_iter()
            .flat_map(|ns| ns.chroots.values())
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(|ns| ns.chroots.is_empty())
    }

    fn namespace(&self, namespace: &str) -> Result<&Namespace> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| ConfigError::UnknownNamespace(namespace.to_string()).into())
    }

    fn eligible_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !is_valid_filename(name) {
                debug!("Skipping {}: not a valid definition file name", entry.path().display());
                continue;
            }
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Definition files must be regular, not world-writable, and owned by the
    /// required owner if one is set
    fn check_file(&self, path: &Path) -> Result<()> {
        let metadata = fs::metadata(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let insecure = |reason: String| ConfigError::InsecureFile {
            path: path.to_path_buf(),
            reason,
        };

        if !metadata.is_file() {
            return Err(insecure("not a regular file".to_string()).into());
        }
        if metadata.mode() & 0o002 != 0 {
            return Err(insecure("file is world-writable".to_string()).into());
        }
        if let Some(uid) = self.required_owner {
            if metadata.uid() != uid {
                return Err(insecure(format!(
                    "owned by uid {}, expected {}",
                    metadata.uid(),
                    uid
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl Default for ChrootConfig {
    fn default() -> Self {
        Self::new(LogContext::default())
    }
}

/// `ns:name` -> (Some("ns"), "name")
fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((ns, rest)) => (Some(ns), rest),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ChrootError;

    const DEFINITIONS: &str = "\
[sid]
type=directory
directory=/srv/chroot/sid
aliases=unstable,default
users=alice

[bookworm-lvm]
type=lvm-snapshot
device=/dev/vg/bookworm
lvm-snapshot-options=--size 2G
";

    fn loaded() -> ChrootConfig {
        let mut config = ChrootConfig::new(LogContext::quiet());
        let keyfile = Keyfile::parse(DEFINITIONS).unwrap();
        config.load_keyfile(&keyfile, CHROOT_NAMESPACE).unwrap();
        config
    }

    #[test]
    fn test_aliases_resolve() {
        let config = loaded();
        assert_eq!(config.lookup_alias(CHROOT_NAMESPACE, "unstable"), Some("sid"));
        assert_eq!(config.find_alias(CHROOT_NAMESPACE, "default").unwrap().name(), "sid");
        assert!(config.find_chroot(CHROOT_NAMESPACE, "unstable").is_none());
        assert_eq!(
            config.find_alias(SESSION_NAMESPACE, "chroot:unstable").unwrap().name(),
            "sid"
        );
    }

    #[test]
    fn test_source_chroots_generated() {
        let config = loaded();
        assert_eq!(
            config.get_chroot_list(SOURCE_NAMESPACE).unwrap(),
            vec!["source:bookworm-lvm".to_string()]
        );
        let source = config.find_chroot(SOURCE_NAMESPACE, "bookworm-lvm").unwrap();
        assert!(source.is_source());
        assert_eq!(source.chroot_type(), "block-device");
    }

    #[test]
    fn test_alias_list_is_sorted() {
        let config = loaded();
        assert_eq!(
            config.get_alias_list(CHROOT_NAMESPACE).unwrap(),
            vec![
                "chroot:bookworm-lvm".to_string(),
                "chroot:default".to_string(),
                "chroot:sid".to_string(),
                "chroot:unstable".to_string(),
            ]
        );
        assert!(config.get_alias_list("nowhere").is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut config = loaded();
        let mut clash = Chroot::create("directory", "sid").unwrap();
        assert!(matches!(
            config.add_chroot(clash.clone(), CHROOT_NAMESPACE),
            Err(ChrootError::Config(ConfigError::DuplicateChroot { .. }))
        ));

        clash.set_name("experimental");
        clash.set_aliases(vec!["unstable".to_string()]);
        match config.add_chroot(clash, CHROOT_NAMESPACE) {
            Err(ChrootError::Config(ConfigError::DuplicateAlias { existing, .. })) => {
                assert_eq!(existing, "sid")
            }
            other => panic!("expected duplicate alias, got {:?}", other),
        }
        assert!(config.find_chroot(CHROOT_NAMESPACE, "experimental").is_none());
    }

    #[test]
    fn test_validate_chroots() {
        let config = loaded();
        let missing = config.validate_chroots(
            CHROOT_NAMESPACE,
            &["sid".to_string(), "unstable".to_string(), "jessie".to_string()],
        );
        assert_eq!(missing, vec!["jessie".to_string()]);
    }
}
