/// Core types and error taxonomy shared across chrootbox
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

bitflags! {
    /// Session capabilities advertised by a chroot's facets.
    ///
    /// Flags from all facets on a chroot are OR-combined.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SessionFlags: u32 {
        /// The chroot can be cloned into a session.
        const CREATE = 1 << 0;
        /// The chroot can be cloned as a source chroot.
        const CLONE = 1 << 1;
        /// The chroot is discarded after a single use.
        const PURGE = 1 << 2;
    }
}

/// Phase of the setup state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetupPhase {
    #[serde(rename = "setup-start")]
    Start,
    #[serde(rename = "setup-stop")]
    Stop,
}

impl fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupPhase::Start => write!(f, "setup-start"),
            SetupPhase::Stop => write!(f, "setup-stop"),
        }
    }
}

/// Message verbosity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Quiet => write!(f, "quiet"),
            Verbosity::Normal => write!(f, "normal"),
            Verbosity::Verbose => write!(f, "verbose"),
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "quiet" => Ok(Verbosity::Quiet),
            "normal" => Ok(Verbosity::Normal),
            "verbose" => Ok(Verbosity::Verbose),
            other => Err(format!("unknown message verbosity '{}'", other)),
        }
    }
}

/// How a persisted key is treated when a definition is read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Must be present.
    Required,
    /// May be present.
    Optional,
    /// Must not be present.
    Disallowed,
    /// Still honoured, but a warning is emitted.
    Deprecated,
    /// Ignored, and a warning is emitted.
    Obsolete,
}

/// Lock mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    None,
    Shared,
    Exclusive,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::None => write!(f, "none"),
            LockType::Shared => write!(f, "shared"),
            LockType::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// What a lock guards
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockTarget {
    File,
    Device,
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTarget::File => write!(f, "file"),
            LockTarget::Device => write!(f, "device"),
        }
    }
}

/// Fatal problems with persisted chroot definitions
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("[{group}]: required key '{key}' is missing")]
    MissingRequiredKey { group: String, key: String },

    #[error("[{group}]: key '{key}' is not permitted here")]
    DisallowedKeyUsed { group: String, key: String },

    #[error("[{group}]: invalid value '{value}' for key '{key}': {reason}")]
    InvalidValue {
        group: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("{namespace}:{name}: chroot is already defined")]
    DuplicateChroot { namespace: String, name: String },

    #[error("{namespace}:{alias}: alias is already associated with '{existing}'")]
    DuplicateAlias {
        namespace: String,
        alias: String,
        existing: String,
    },

    #[error("[{group}]: unknown chroot type '{chroot_type}'")]
    UnknownChrootType { group: String, chroot_type: String },

    #[error("unknown namespace '{0}'")]
    UnknownNamespace(String),

    #[error("{}: {reason}", path.display())]
    InsecureFile { path: PathBuf, reason: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Advisory conditions found while reading definitions.
///
/// These are never returned as an `Err`; they are collected and logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigWarning {
    UnknownKey { group: String, key: String },
    DeprecatedKeyUsed { group: String, key: String },
    ObsoleteKeyUsed { group: String, key: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::UnknownKey { group, key } => {
                write!(f, "[{}]: unknown key '{}' ignored", group, key)
            }
            ConfigWarning::DeprecatedKeyUsed { group, key } => write!(
                f,
                "[{}]: key '{}' is deprecated and will be removed in a future release",
                group, key
            ),
            ConfigWarning::ObsoleteKeyUsed { group, key } => write!(
                f,
                "[{}]: key '{}' is obsolete and no longer has any effect",
                group, key
            ),
        }
    }
}

/// Invalid paths, devices and identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("invalid path '{}': {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("invalid device '{}': {reason}", path.display())]
    InvalidDevice { path: PathBuf, reason: String },

    #[error("key '{key}' may not be modified: {reason}")]
    ProtectedKey { key: String, reason: String },
}

/// Lock acquisition and release failures
#[derive(Error, Debug)]
pub enum LockError {
    #[error(
        "timed out after {waited:?} waiting for {target} lock on {} (holder: {})",
        path.display(),
        holder_pid.map(|p| format!("PID {}", p)).unwrap_or_else(|| "unknown".to_string())
    )]
    Timeout {
        target: LockTarget,
        path: PathBuf,
        waited: Duration,
        holder_pid: Option<u32>,
    },

    #[error("{} is locked by another holder (PID {holder_pid:?})", path.display())]
    HeldByOther {
        path: PathBuf,
        holder_pid: Option<u32>,
    },

    #[error("{} cannot be locked: {reason}", path.display())]
    NotLockable { path: PathBuf, reason: String },

    #[error("lock file {} is corrupted: {details}", path.display())]
    Corrupted { path: PathBuf, details: String },

    #[error("lock system error on {}: {message}", path.display())]
    System { path: PathBuf, message: String },

    #[error("lock filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Backing device or file failed its precondition checks
#[derive(Error, Debug)]
pub enum ResourceStateError {
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a block device", path.display())]
    NotBlockDevice { path: PathBuf },

    #[error("{} is not a regular file", path.display())]
    NotRegularFile { path: PathBuf },

    #[error("{} is not a directory", path.display())]
    NotDirectory { path: PathBuf },

    #[error("{} is owned by uid {uid}, expected uid {expected}", path.display())]
    WrongOwner { path: PathBuf, uid: u32, expected: u32 },

    #[error("{} is writable by other users", path.display())]
    WorldWritable { path: PathBuf },
}

impl ResourceStateError {
    /// True when the resource could not be examined at all.
    pub fn is_stat_failure(&self) -> bool {
        matches!(self, ResourceStateError::Stat { .. })
    }
}

/// Top-level error for chroot operations
#[derive(Error, Debug)]
pub enum ChrootError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("{chroot}: {operation} is not supported by this chroot")]
    Unsupported { chroot: String, operation: String },

    #[error("resource error: {0}")]
    ResourceState(#[from] ResourceStateError),

    #[error("{chroot}: {phase} failed: {message}")]
    Setup {
        chroot: String,
        phase: SetupPhase,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChrootError {
    /// Exit status a front end should report for this error (sysexits.h values)
    pub fn exit_code(&self) -> i32 {
        match self {
            ChrootError::Config(_) => 78,
            ChrootError::Validation(_) => 65,
            ChrootError::Lock(LockError::Timeout { .. }) => 75,
            ChrootError::Lock(_) => 75,
            ChrootError::Unsupported { .. } => 69,
            ChrootError::ResourceState(_) => 66,
            ChrootError::Setup { .. } => 70,
            ChrootError::Io(_) => 74,
        }
    }
}

/// Result type alias for chrootbox operations
pub type Result<T> = std::result::Result<T, ChrootError>;
