//! chrootbox: named chroot environments and the sessions derived from them
//!
//! A chroot is assembled from facets: one storage facet that decides how the
//! root filesystem is provided, plus cross-cutting facets for mounting,
//! session handling, union overlays and user metadata. Templates are cloned
//! into short-lived sessions whose resource names are rewritten per session,
//! and a lock state machine guards the mount boundary around setup.
//!
//! # Architecture
//!
//! ## Chroots ([`chroot`])
//! - [`chroot::chroot`]: The `Chroot` aggregate and its facet map
//! - [`chroot::clone`]: Session and source cloning
//! - [`chroot::setup`]: Lock / setup scripts / unlock state machine
//! - [`chroot::environment`]: Setup environment and host environment filtering
//! - [`chroot::details`]: Human and JSON readable chroot details
//!
//! ## Facets ([`facet`])
//! - [`facet::storage`]: block-device, loopback, lvm-snapshot, btrfs-snapshot,
//!   directory, file and custom storage
//! - Cross-cutting: mountable, session, session-clonable, source,
//!   source-clonable, union, userdata, personality
//!
//! ## Safety ([`safety`])
//! - [`safety::lock`]: File and device locks with bounded retry
//! - [`safety::resource`]: Backing resource checks
//! - [`safety::session_store`]: On-disk records of active sessions
//!
//! ## Configuration ([`config`])
//! - [`config::keyfile`]: INI-like definition files
//! - [`config::chroot_config`]: Namespaces, aliases and definition loading
//! - [`config::validator`]: Diagnostics and definition linting
//! - [`config::types`]: Shared enums and error types
//!
//! ## Observability ([`observability`])
//! - [`observability::log_context`]: Verbosity threaded through calls
//! - [`observability::audit`]: Structured lifecycle events
//!
//! # Design Principles
//!
//! 1. **Closed facet set** - Facet kinds are an enum; lookup is typed
//! 2. **No back-pointers** - Facets receive their chroot by reference
//! 3. **Advisory is not fatal** - Warnings and errors are different types
//! 4. **Teardown always proceeds** - A vanished device never blocks cleanup

pub mod chroot;
pub mod config;
pub mod facet;
pub mod observability;
pub mod safety;
pub mod utils;

pub use chroot::{
    Chroot, Details, Environment, NullRunner, SessionRequest, SetupContext, SetupRunner,
};
pub use config::chroot_config::ChrootConfig;
pub use config::types::*;
