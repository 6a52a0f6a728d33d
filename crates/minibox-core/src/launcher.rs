//! Runtime launcher
//!
//! Creates the isolated child by re-executing this binary in initializer
//! mode, applies the memory limit while the child is already running, and
//! waits for it to finish.

use crate::handoff::{self, INIT_SENTINEL};
use crate::isolation::{ChildSpec, IsolationProvider, NamespaceConfig, ResourceLimiter};
use crate::memory::parse_memory_limit;
use crate::{LaunchConfig, MiniboxError, Result};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::path::PathBuf;

pub struct Launcher<'a, P, L> {
    provider: &'a P,
    limiter: &'a L,
}

impl<'a, P: IsolationProvider, L: ResourceLimiter> Launcher<'a, P, L> {
    pub const fn new(provider: &'a P, limiter: &'a L) -> Self {
        Self { provider, limiter }
    }

    /// Run `config.command` in a container and return its exit code
    ///
    /// A non-zero exit code from the container is a normal result. Errors
    /// are reserved for setup failures and for a child that did not exit
    /// normally.
    pub fn launch(&self, config: &LaunchConfig) -> Result<i32> {
        config.validate()?;

        let self_exe = std::env::current_exe()
            .map_err(|e| MiniboxError::fs("resolve own executable", "/proc/self/exe", e))?;
        let spec = child_spec(self_exe, config)?;

        tracing::info!(rootfs = %config.rootfs.display(), "starting child process in new namespaces");
        let pid = self.provider.spawn_isolated(&spec)?;
        tracing::info!(%pid, "child started");

        // The child is already running; the cap lands shortly after it starts
        if let Some(raw) = config.memory_limit() {
            self.limit_memory(pid, raw);
        }

        let code = self.provider.wait(pid)?;
        tracing::info!(%pid, code, "container exited");
        Ok(code)
    }

    fn limit_memory(&self, pid: Pid, raw: &str) {
        let bytes = match parse_memory_limit(raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(raw, error = %e, "could not parse memory limit");
                return;
            }
        };

        match self.limiter.apply_memory_limit(pid, bytes) {
            Ok(cgroup) => tracing::info!(
                bytes,
                %pid,
                cgroup = %cgroup.path().display(),
                "applied memory limit"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to apply memory cgroup limit"),
        }
    }
}

/// Re-exec of `self_exe` in initializer mode carrying `config`
fn child_spec(self_exe: PathBuf, config: &LaunchConfig) -> Result<ChildSpec> {
    let mut args = Vec::with_capacity(config.command.len() + 1);
    args.push(OsString::from(INIT_SENTINEL));
    args.extend(config.command.iter().cloned());

    Ok(ChildSpec {
        program: self_exe,
        args,
        namespaces: NamespaceConfig::default(),
        handoff: handoff::encode(&config.to_init_config())?,
    })
}
