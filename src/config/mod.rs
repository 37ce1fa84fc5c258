//! Configuration
//!
//! Definition files, chroot namespaces, validation and shared types.

pub mod chroot_config;
pub mod keyfile;
pub mod types;
pub mod validator;

pub use chroot_config::{ChrootConfig, CHROOT_NAMESPACE, SESSION_NAMESPACE, SOURCE_NAMESPACE};
pub use keyfile::Keyfile;
pub use validator::{Diagnostics, ValidationReport};
