//! Utilities
//!
//! Identifier and file name rules shared by config loading and the session store.

pub mod identifier;
