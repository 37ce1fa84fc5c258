//! Chroots
//!
//! The `Chroot` aggregate, session and source cloning, and the setup state
//! machine that runs around the site's setup scripts.

#[allow(clippy::module_inception)]
pub mod chroot;
pub mod clone;
pub mod details;
pub mod environment;
pub mod setup;

pub use chroot::{Chroot, CHROOT_TYPES};
pub use clone::{SessionRequest, SESSION_MOUNT_DIR};
pub use details::Details;
pub use environment::{Environment, DEFAULT_ENVIRONMENT_FILTER};
pub use setup::{NullRunner, SetupContext, SetupRunner};
