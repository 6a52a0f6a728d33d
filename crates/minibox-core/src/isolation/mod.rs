//! Linux isolation primitives
//!
//! This module contains the OS-facing half of the runtime:
//! - `clone3` - clone3 syscall for process creation
//! - `namespace` - namespace selection (uts, pid, mount, net, ipc)
//! - `mounts` - mount privatization, pivot_root and /proc
//! - `cgroups` - cgroup v1 memory limits
//! - `loopback` - best-effort `lo` bring-up
//! - `linux` - the [`IsolationProvider`] backed by real syscalls
//!
//! Launcher and initializer only talk to the kernel through
//! [`IsolationProvider`], which keeps their sequencing testable.

pub mod cgroups;
pub mod clone3;
pub mod linux;
pub mod loopback;
pub mod mounts;
pub mod namespace;

pub use self::cgroups::{CgroupHandle, MemoryCgroup, ResourceLimiter};
pub use self::linux::LinuxProvider;
pub use self::loopback::{Loopback, ToolLoopback};
pub use self::mounts::RootfsSetup;
pub use self::namespace::NamespaceConfig;

use crate::Result;
use nix::mount::{MntFlags, MsFlags};
use nix::unistd::Pid;
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Everything needed to create the isolated child in one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    /// Absolute path of the program to execute in the child
    pub program: PathBuf,
    /// Arguments after argv[0]
    pub args: Vec<OsString>,
    /// Namespaces the child is created in
    pub namespaces: NamespaceConfig,
    /// Length-prefixed handoff frame delivered on [`crate::handoff::HANDOFF_FD`]
    pub handoff: Vec<u8>,
}

/// Kernel operations used to build and enter a container
pub trait IsolationProvider {
    /// Create a child inside new namespaces; stdio and environment are inherited
    fn spawn_isolated(&self, spec: &ChildSpec) -> Result<Pid>;

    /// Block until `pid` terminates and return its exit code
    ///
    /// A child killed by a signal is an error, not an exit code.
    fn wait(&self, pid: Pid) -> Result<i32>;

    fn set_hostname(&self, name: &str) -> Result<()>;

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;

    fn unmount(&self, target: &Path, flags: MntFlags) -> Result<()>;

    /// Make `new_root` the root and move the old root to `put_old`
    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()>;

    fn chdir(&self, path: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()>;

    fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Replace the process image with `argv[0]`, keeping the current environment
    ///
    /// Only returns on failure.
    fn exec(&self, argv: &[OsString]) -> Result<Infallible>;
}
