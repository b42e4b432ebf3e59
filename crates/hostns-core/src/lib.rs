//! # hostns-core
//!
//! Bind TCP listeners inside a different network namespace than the one the
//! process runs in, typically the host's default namespace seen from inside
//! a container.
//!
//! This crate provides:
//! - Network namespace handles (`setns(2)` on nsfs descriptors)
//! - A thread-pinned scope guard that switches and always switches back
//! - The listener bootstrap protocol built on both

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod listener;
pub mod namespace;
pub mod scope;

pub use bootstrap::{listen_in_namespace, listen_on_dedicated_thread, run_in_namespace};
pub use config::BootstrapConfig;
pub use error::NetnsError;
pub use listener::{ListenAddress, bind_listener};
pub use namespace::{NamespaceId, NetNs};
pub use scope::{LinuxNetns, NamespaceOps, NamespaceScope};

/// Crate-level result type
pub type Result<T> = std::result::Result<T, NetnsError>;
