//! Container initializer
//!
//! Runs as pid 1 of the new PID namespace, re-executed from the launcher's
//! binary. Sets up the container from the handoff payload and finally
//! replaces itself with the user's command.

use crate::handoff::HandoffReader;
use crate::isolation::{IsolationProvider, LinuxProvider, Loopback, RootfsSetup, ToolLoopback};
use crate::{InitConfig, MiniboxError, Result};
use std::convert::Infallible;
use std::ffi::OsString;

pub struct Initializer<'a, P, L> {
    provider: &'a P,
    loopback: &'a L,
}

impl<'a, P: IsolationProvider, L: Loopback> Initializer<'a, P, L> {
    pub const fn new(provider: &'a P, loopback: &'a L) -> Self {
        Self { provider, loopback }
    }

    /// Build the container and exec `command`
    ///
    /// Nothing on the system is touched until both `config` and `command`
    /// have been validated. Only returns on failure.
    pub fn run(&self, config: &InitConfig, command: &[OsString]) -> Result<Infallible> {
        config.validate()?;
        if command.is_empty() {
            return Err(MiniboxError::Config(
                "no command provided for container to run".into(),
            ));
        }

        tracing::debug!(rootfs = %config.rootfs.display(), "container init starting");

        if !config.hostname.is_empty() {
            self.provider.set_hostname(&config.hostname)?;
        }

        RootfsSetup::new(&config.rootfs).apply(self.provider)?;

        if let Err(e) = self.loopback.bring_up() {
            tracing::warn!(error = %e, "failed to bring up loopback");
        }

        tracing::debug!(?command, "exec");
        self.provider.exec(command)
    }
}

/// Entry point for initializer mode
///
/// Reads the configuration from the inherited handoff descriptor and runs
/// the initializer against the real kernel.
pub fn run_from_handoff(command: &[OsString]) -> Result<Infallible> {
    let config = HandoffReader::from_inherited_fd()?.read_config()?;
    Initializer::new(&LinuxProvider, &ToolLoopback::default()).run(&config, command)
}
