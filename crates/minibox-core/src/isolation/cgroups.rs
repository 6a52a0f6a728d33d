//! Cgroups v1 memory limits
//!
//! One cgroup per container, named after the child's pid, directly under
//! the memory hierarchy root. Cgroups are never removed afterwards, and a
//! reused pid collides with a stale directory from an earlier run.

use crate::{MiniboxError, Result};
use nix::unistd::Pid;
use std::io;
use std::path::{Path, PathBuf};

/// Control file holding the hard limit in bytes
pub const LIMIT_FILE: &str = "memory.limit_in_bytes";

/// Control file listing member processes
pub const PROCS_FILE: &str = "cgroup.procs";

/// Caps a process's memory
pub trait ResourceLimiter {
    fn apply_memory_limit(&self, pid: Pid, limit_bytes: i64) -> Result<CgroupHandle>;
}

/// Filesystem operations the limiter performs on the cgroup hierarchy
pub trait ControlFs {
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl ControlFs for HostFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new().mode(0o755).create(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }
}

/// Memory controller rooted at a cgroup v1 `memory` hierarchy
#[derive(Debug, Clone)]
pub struct MemoryCgroup<F = HostFs> {
    root: PathBuf,
    fs: F,
}

impl MemoryCgroup<HostFs> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, HostFs)
    }
}

impl<F: ControlFs> MemoryCgroup<F> {
    pub fn with_fs(root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory used for `pid`
    #[must_use]
    pub fn cgroup_path(&self, pid: Pid) -> PathBuf {
        self.root.join(format!("minibox_{pid}"))
    }
}

impl<F: ControlFs> ResourceLimiter for MemoryCgroup<F> {
    fn apply_memory_limit(&self, pid: Pid, limit_bytes: i64) -> Result<CgroupHandle> {
        if !self.fs.is_dir(&self.root) {
            return Err(MiniboxError::Cgroup(format!(
                "memory hierarchy not mounted at {}",
                self.root.display()
            )));
        }

        let path = self.cgroup_path(pid);
        tracing::debug!(path = %path.display(), limit_bytes, %pid, "creating cgroup");
        self.fs
            .create_dir(&path)
            .map_err(|e| MiniboxError::fs("mkdir", &path, e))?;

        // The cap goes in before the pid so the member is never unconstrained
        let limit_path = path.join(LIMIT_FILE);
        self.fs
            .write(&limit_path, &limit_bytes.to_string())
            .map_err(|e| MiniboxError::fs("write", &limit_path, e))?;

        let procs_path = path.join(PROCS_FILE);
        self.fs
            .write(&procs_path, &pid.to_string())
            .map_err(|e| MiniboxError::fs("write", &procs_path, e))?;

        Ok(CgroupHandle::new(path))
    }
}

/// A created cgroup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupHandle {
    path: PathBuf,
}

impl CgroupHandle {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
