/// Advisory locks over open files and block devices
///
/// `FileLock` uses fcntl record locks on an open file description, so every
/// `FileLock` instance is an independent holder (even within one process).
/// `DeviceLock` uses a lockdev style `LCK..<device>` file carrying JSON lock
/// info; the owner token lets a later process of the same session release it.
use crate::config::types::{LockError, LockResult, LockTarget, LockType};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Default wait for device locks during setup
pub const DEFAULT_DEVICE_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A lock that can be taken and dropped in one of the `LockType` modes
pub trait Lock {
    /// Acquire (or change to) `mode`, retrying until `timeout` elapses.
    ///
    /// `LockType::None` releases any held lock and always succeeds.
    fn acquire(&mut self, mode: LockType, timeout: Duration) -> LockResult<()>;

    /// Release the lock. Releasing an unlocked target is a no-op.
    fn release(&mut self) -> LockResult<()>;

    fn target(&self) -> LockTarget;
}

/// Sleep for the next backoff step; returns false once `deadline` has passed
fn backoff(retry_delay: &mut Duration, deadline: Instant) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    let jitter = Duration::from_millis(fastrand::u64(0..=retry_delay.as_millis() as u64));
    let sleep_for = std::cmp::min(*retry_delay + jitter, deadline - now);
    thread::sleep(sleep_for);
    *retry_delay = std::cmp::min(*retry_delay * 2, MAX_RETRY_DELAY);
    true
}

#[cfg(target_os = "linux")]
const SETLK: libc::c_int = libc::F_OFD_SETLK;
#[cfg(target_os = "linux")]
const GETLK: libc::c_int = libc::F_OFD_GETLK;
#[cfg(not(target_os = "linux"))]
const SETLK: libc::c_int = libc::F_SETLK;
#[cfg(not(target_os = "linux"))]
const GETLK: libc::c_int = libc::F_GETLK;

/// Whole-file fcntl record lock on an open file
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    held: LockType,
}

impl FileLock {
    /// Open (creating if needed) `path` for locking
    pub fn open(path: &Path) -> LockResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self::new(file, path))
    }

    /// Lock an already open file; `path` is used for error reporting only
    pub fn new(file: File, path: &Path) -> Self {
        Self {
            file,
            path: path.to_path_buf(),
            held: LockType::None,
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn held(&self) -> LockType {
        self.held
    }

    fn flock(&self, l_type: libc::c_int) -> libc::flock {
        // SAFETY: flock is a plain C struct; all-zero is a valid value.
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = l_type as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        fl.l_start = 0;
        fl.l_len = 0;
        fl.l_pid = 0;
        fl
    }

    /// Single non-blocking attempt; Ok(false) when another holder conflicts
    fn try_set(&self, l_type: libc::c_int) -> LockResult<bool> {
        let mut fl = self.flock(l_type);
        // SAFETY: fd is owned by self.file and fl is a valid flock struct.
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), SETLK, &mut fl as *mut libc::flock) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EACCES) => Ok(false),
            Some(libc::EBADF) | Some(libc::EINVAL) => Err(LockError::NotLockable {
                path: self.path.clone(),
                reason: err.to_string(),
            }),
            _ => Err(LockError::System {
                path: self.path.clone(),
                message: format!("fcntl failed: {}", err),
            }),
        }
    }

    /// Pid of a conflicting holder, where the kernel reports one
    fn conflicting_pid(&self, l_type: libc::c_int) -> Option<u32> {
        let mut fl = self.flock(l_type);
        // SAFETY: as in try_set.
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), GETLK, &mut fl as *mut libc::flock) };
        if rc != 0 || fl.l_type == libc::F_UNLCK as libc::c_short || fl.l_pid <= 0 {
            return None;
        }
        Some(fl.l_pid as u32)
    }
}

impl Lock for FileLock {
    fn acquire(&mut self, mode: LockType, timeout: Duration) -> LockResult<()> {
        let l_type = match mode {
            LockType::None => return self.release(),
            LockType::Shared => libc::F_RDLCK,
            LockType::Exclusive => libc::F_WRLCK,
        } as libc::c_int;

        let start = Instant::now();
        let deadline = start + timeout;
        let mut retry_delay = INITIAL_RETRY_DELAY;

        loop {
            if self.try_set(l_type)? {
                debug!("Acquired {} lock on {} in {:?}", mode, self.path.display(), start.elapsed());
                self.held = mode;
                return Ok(());
            }
            if !backoff(&mut retry_delay, deadline) {
                return Err(LockError::Timeout {
                    target: LockTarget::File,
                    path: self.path.clone(),
                    waited: start.elapsed(),
                    holder_pid: self.conflicting_pid(l_type),
                });
            }
        }
    }

    fn release(&mut self) -> LockResult<()> {
        if self.held == LockType::None {
            return Ok(());
        }
        self.try_set(libc::F_UNLCK as libc::c_int)?;
        self.held = LockType::None;
        Ok(())
    }

    fn target(&self) -> LockTarget {
        LockTarget::File
    }
}

/// Contents of a device lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub device: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Name of the lock file for `device`: `/dev/vg/root` becomes `LCK..vg_root`
pub fn lock_file_name(device: &Path) -> String {
    let text = device.to_string_lossy();
    let trimmed = text.strip_prefix("/dev/").unwrap_or(&text);
    let trimmed = trimmed.trim_start_matches('/');
    format!("LCK..{}", trimmed.replace('/', "_"))
}

fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

/// Exclusive lock over a block device (or backing file), kept in a lock directory
#[derive(Debug, Clone)]
pub struct DeviceLock {
    device: PathBuf,
    lock_path: PathBuf,
    owner: Option<String>,
}

enum Attempt {
    Acquired,
    Busy(Option<u32>),
    Retry,
}

impl DeviceLock {
    pub fn new(lock_dir: &Path, device: &Path) -> Self {
        Self {
            device: device.to_path_buf(),
            lock_path: lock_dir.join(lock_file_name(device)),
            owner: None,
        }
    }

    /// Tag the lock with an owner token, usually a session id
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Current holder recorded in the lock file, if any
    pub fn holder(&self) -> LockResult<Option<LockInfo>> {
        let content = match fs::read_to_string(&self.lock_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let line = content.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Err(LockError::Corrupted {
                path: self.lock_path.clone(),
                details: "empty lock file".to_string(),
            });
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| LockError::Corrupted {
                path: self.lock_path.clone(),
                details: e.to_string(),
            })
    }

    fn is_ours(&self, info: &LockInfo) -> bool {
        info.owner == self.owner && (self.owner.is_some() || info.pid == std::process::id())
    }

    /// Write our lock info to a private file, then link it into place
    fn try_create(&self) -> LockResult<bool> {
        let info = LockInfo {
            pid: std::process::id(),
            owner: self.owner.clone(),
            device: self.device.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&info).map_err(|e| LockError::System {
            path: self.lock_path.clone(),
            message: e.to_string(),
        })?;

        let tmp_path = self
            .lock_path
            .with_file_name(format!("{}.{}", lock_file_name(&self.device), info.pid));
        {
            let mut tmp = File::create(&tmp_path)?;
            writeln!(tmp, "{}", json)?;
            tmp.sync_all()?;
        }
        let linked = fs::hard_link(&tmp_path, &self.lock_path);
        let _ = fs::remove_file(&tmp_path);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the lock file if it still holds `expected` content
    fn reclaim(&self, expected: Option<&LockInfo>) -> LockResult<()> {
        let current = self.holder().ok().flatten();
        if current.as_ref() == expected {
            match fs::remove_file(&self.lock_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn try_acquire(&self) -> LockResult<Attempt> {
        if self.try_create()? {
            return Ok(Attempt::Acquired);
        }

        match self.holder() {
            Ok(None) => Ok(Attempt::Retry),
            Ok(Some(info)) if self.is_ours(&info) => Ok(Attempt::Acquired),
            Ok(Some(info)) if info.owner.is_none() && !is_process_alive(info.pid) => {
                warn!(
                    "Removing stale lock on {} (pid {} not running)",
                    self.device.display(),
                    info.pid
                );
                self.reclaim(Some(&info))?;
                Ok(Attempt::Retry)
            }
            Ok(Some(info)) => Ok(Attempt::Busy(Some(info.pid))),
            Err(LockError::Corrupted { details, .. }) => {
                warn!(
                    "Removing corrupted lock file {}: {}",
                    self.lock_path.display(),
                    details
                );
                self.reclaim(None)?;
                Ok(Attempt::Retry)
            }
            Err(e) => Err(e),
        }
    }
}

impl Lock for DeviceLock {
    /// Device locks are exclusive only; `Shared` is treated as `Exclusive`.
    fn acquire(&mut self, mode: LockType, timeout: Duration) -> LockResult<()> {
        if mode == LockType::None {
            return self.release();
        }

        if let Some(dir) = self.lock_path.parent() {
            fs::create_dir_all(dir)?;
        }

        let start = Instant::now();
        let deadline = start + timeout;
        let mut retry_delay = INITIAL_RETRY_DELAY;
        let mut immediate_retries = 0;

        loop {
            let holder_pid = match self.try_acquire()? {
                Attempt::Acquired => {
                    info!(
                        "Locked device {} ({})",
                        self.device.display(),
                        self.lock_path.display()
                    );
                    return Ok(());
                }
                Attempt::Retry if immediate_retries < 3 => {
                    immediate_retries += 1;
                    continue;
                }
                Attempt::Retry => None,
                Attempt::Busy(pid) => pid,
            };
            if !backoff(&mut retry_delay, deadline) {
                return Err(LockError::Timeout {
                    target: LockTarget::Device,
                    path: self.device.clone(),
                    waited: start.elapsed(),
                    holder_pid,
                });
            }
        }
    }

    fn release(&mut self) -> LockResult<()> {
        match self.holder() {
            Ok(None) => Ok(()),
            Ok(Some(info)) if self.is_ours(&info) => {
                fs::remove_file(&self.lock_path)?;
                info!("Unlocked device {}", self.device.display());
                Ok(())
            }
            Ok(Some(info)) => Err(LockError::HeldByOther {
                path: self.device.clone(),
                holder_pid: Some(info.pid),
            }),
            Err(LockError::Corrupted { details, .. }) => {
                warn!(
                    "Removing corrupted lock file {}: {}",
                    self.lock_path.display(),
                    details
                );
                self.reclaim(None)
            }
            Err(e) => Err(e),
        }
    }

    fn target(&self) -> LockTarget {
        LockTarget::Device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_file_name() {
        assert_eq!(lock_file_name(Path::new("/dev/testdev")), "LCK..testdev");
        assert_eq!(lock_file_name(Path::new("/dev/vg/root")), "LCK..vg_root");
        assert_eq!(
            lock_file_name(Path::new("/srv/images/sid.img")),
            "LCK..srv_images_sid.img"
        );
    }

    #[test]
    fn test_file_lock_upgrade_and_downgrade() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockfile");
        let mut lock = FileLock::open(&path).unwrap();

        lock.acquire(LockType::Shared, Duration::ZERO).unwrap();
        assert_eq!(lock.held(), LockType::Shared);
        lock.acquire(LockType::Exclusive, Duration::ZERO).unwrap();
        assert_eq!(lock.held(), LockType::Exclusive);
        lock.acquire(LockType::Shared, Duration::ZERO).unwrap();
        lock.acquire(LockType::None, Duration::ZERO).unwrap();
        assert_eq!(lock.held(), LockType::None);
    }

    #[test]
    fn test_file_lock_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut lock = FileLock::open(&dir.path().join("lockfile")).unwrap();
        lock.release().unwrap();
        lock.acquire(LockType::Exclusive, Duration::ZERO).unwrap();
        lock.release().unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn test_device_lock_writes_info() {
        let dir = tempdir().unwrap();
        let mut lock = DeviceLock::new(dir.path(), Path::new("/dev/testdev")).with_owner("sid");
        lock.acquire(LockType::Exclusive, Duration::ZERO).unwrap();

        let info = lock.holder().unwrap().unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.owner.as_deref(), Some("sid"));
        assert_eq!(info.device, PathBuf::from("/dev/testdev"));

        lock.release().unwrap();
        assert!(!lock.lock_path().exists());
        lock.release().unwrap();
    }

    #[test]
    fn test_device_lock_stale_holder_reclaimed() {
        let dir = tempdir().unwrap();
        let device = Path::new("/dev/stale");
        let stale = LockInfo {
            pid: u32::MAX - 1,
            owner: None,
            device: device.to_path_buf(),
            created_at: Utc::now(),
        };
        fs::write(
            dir.path().join(lock_file_name(device)),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let mut lock = DeviceLock::new(dir.path(), device);
        lock.acquire(LockType::Exclusive, Duration::from_millis(100)).unwrap();
        assert_eq!(lock.holder().unwrap().unwrap().pid, std::process::id());
    }

    #[test]
    fn test_device_lock_corrupted_file_reclaimed() {
        let dir = tempdir().unwrap();
        let device = Path::new("/dev/garbled");
        fs::write(dir.path().join(lock_file_name(device)), "not json").unwrap();

        let mut lock = DeviceLock::new(dir.path(), device).with_owner("s1");
        lock.acquire(LockType::Exclusive, Duration::from_millis(100)).unwrap();
        assert_eq!(lock.holder().unwrap().unwrap().owner.as_deref(), Some("s1"));
    }

    #[test]
    fn test_device_lock_release_clears_empty_file() {
        let dir = tempdir().unwrap();
        let device = Path::new("/dev/emptied");
        let path = dir.path().join(lock_file_name(device));
        fs::write(&path, "").unwrap();

        let mut lock = DeviceLock::new(dir.path(), device).with_owner("s1");
        lock.release().unwrap();
        assert!(!path.exists());
        lock.release().unwrap();
    }
}
