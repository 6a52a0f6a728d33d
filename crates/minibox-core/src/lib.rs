//! # minibox-core
//!
//! Single-process container runtime for Linux.
//!
//! This crate provides the pieces of a minimal container launch:
//! - Linux namespaces via clone3 (uts, pid, mount, net, ipc)
//! - pivot_root into a caller-supplied root filesystem, plus /proc
//! - cgroup v1 memory limits
//! - A typed, versioned configuration handoff from launcher to initializer
//!
//! There is no user namespace; the runtime must run as root.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handoff;
pub mod init;
pub mod isolation;
pub mod launcher;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{InitConfig, LaunchConfig};
pub use error::{MemoryLimitError, MiniboxError};
pub use handoff::INIT_SENTINEL;
pub use launcher::Launcher;
pub use memory::parse_memory_limit;

/// Exit status used when the container could not be set up
///
/// A contained command may exit with the same value.
pub const SETUP_FAILURE_EXIT_CODE: u8 = 125;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, MiniboxError>;
