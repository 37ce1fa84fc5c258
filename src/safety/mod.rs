//! Safety
//!
//! Advisory locking of files and devices, resource precondition checks and
//! the on-disk record of active sessions.

pub mod lock;
pub mod resource;
pub mod session_store;

pub use lock::{DeviceLock, FileLock, Lock, LockInfo};
pub use resource::{check_resource, ResourceKind};
pub use session_store::SessionStore;
