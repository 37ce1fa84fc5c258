/// Persisted metadata for active sessions
///
/// One keyfile per session at `<session_dir>/<session_id>`. Writers hold an
/// exclusive `FileLock` on the session file while it is rewritten or removed.
use crate::chroot::Chroot;
use crate::config::keyfile::Keyfile;
use crate::config::types::{ChrootError, ConfigError, LockType, Result};
use crate::safety::lock::{FileLock, Lock};
use crate::utils::identifier::{is_valid_filename, validate_session_id};
use log::debug;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SESSION_FILE_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(session_id)
    }

    /// Write the session chroot's definition, replacing any earlier copy
    pub fn save(&self, chroot: &Chroot) -> Result<()> {
        validate_session_id(chroot.name())?;
        fs::create_dir_all(&self.dir)?;

        let mut keyfile = Keyfile::new();
        chroot.get_keyfile(&mut keyfile);

        let path = self.session_path(chroot.name());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let mut lock = FileLock::new(file, &path);
        lock.acquire(LockType::Exclusive, SESSION_FILE_LOCK_TIMEOUT)?;

        let mut writer = lock.file();
        writer.set_len(0)?;
        writer.write_all(keyfile.to_string().as_bytes())?;
        writer.sync_all()?;

        lock.release()?;
        debug!("Recorded session {} in {}", chroot.name(), path.display());
        Ok(())
    }

    /// Remove a session record; removing an absent record is not an error
    pub fn remove(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        let path = self.session_path(session_id);

        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Session {} has no record to remove", session_id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let mut lock = FileLock::new(file, &path);
        lock.acquire(LockType::Exclusive, SESSION_FILE_LOCK_TIMEOUT)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        lock.release()?;
        debug!("Removed session record {}", path.display());
        Ok(())
    }

    pub fn exists(&self, session_id: &str) -> bool {
        validate_session_id(session_id).is_ok() && self.session_path(session_id).is_file()
    }

    /// Read back a session record
    pub fn load(&self, session_id: &str) -> Result<Keyfile> {
        validate_session_id(session_id)?;
        Ok(Keyfile::load(&self.session_path(session_id))?)
    }

    /// Ids of all recorded sessions, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ChrootError::Config(ConfigError::Io {
                    path: self.dir.clone(),
                    source,
                }))
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_filename(name) && validate_session_id(name).is_ok() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::storage::DirectoryFacet;
    use crate::facet::SessionFacet;
    use tempfile::tempdir;

    fn session_chroot(name: &str) -> Chroot {
        let mut chroot = Chroot::new(name, DirectoryFacet::new("/srv/chroot/sid"));
        chroot
            .add_facet(SessionFacet::new("sid", "sid"))
            .unwrap();
        chroot
    }

    #[test]
    fn test_save_list_remove() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session"));
        assert!(store.list().unwrap().is_empty());

        store.save(&session_chroot("b-session")).unwrap();
        store.save(&session_chroot("a-session")).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a-session", "b-session"]);
        assert!(store.exists("a-session"));

        let keyfile = store.load("a-session").unwrap();
        assert_eq!(keyfile.get("a-session", "type"), Some("directory"));
        assert_eq!(keyfile.get("a-session", "original-name"), Some("sid"));

        store.remove("a-session").unwrap();
        assert!(!store.exists("a-session"));
        store.remove("a-session").unwrap();
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.remove("../escape").is_err());
        assert!(!store.exists("../escape"));
    }

    #[test]
    fn test_saved_sessions_are_listed() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        for id in ["sid-1.0", "build_42", "unstable.2"] {
            store.save(&session_chroot(id)).unwrap();
            assert!(store.list().unwrap().contains(&id.to_string()), "{} not listed", id);
        }
        assert!(store.save(&session_chroot("sid+1.0")).is_err());
    }
}
