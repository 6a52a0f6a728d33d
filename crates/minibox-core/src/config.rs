//! Launch and handoff configuration

use crate::{MiniboxError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// Hostname used inside the container when none is given
pub const DEFAULT_HOSTNAME: &str = "mini-container";

/// Version of the [`InitConfig`] payload understood by this build
pub const HANDOFF_VERSION: u32 = 1;

/// Caller-supplied description of one container launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Directory holding an already populated root filesystem
    pub rootfs: PathBuf,

    /// Raw memory limit such as `100m`; parsed only after the child starts
    pub memory_limit: Option<String>,

    /// Hostname set inside the UTS namespace
    pub hostname: String,

    /// Program path followed by its arguments, passed through byte for byte
    pub command: Vec<OsString>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            rootfs: PathBuf::new(),
            memory_limit: None,
            hostname: DEFAULT_HOSTNAME.to_string(),
            command: Vec::new(),
        }
    }
}

impl LaunchConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> LaunchConfigBuilder {
        LaunchConfigBuilder::default()
    }

    /// Check the preconditions that must hold before any process is created
    pub fn validate(&self) -> Result<()> {
        if self.rootfs.as_os_str().is_empty() {
            return Err(MiniboxError::Config("rootfs must be specified".into()));
        }
        if !self.rootfs.is_dir() {
            return Err(MiniboxError::Config(format!(
                "rootfs {} is not an existing directory",
                self.rootfs.display()
            )));
        }
        if self.command.is_empty() {
            return Err(MiniboxError::Config(
                "must specify at least one command to run inside the container".into(),
            ));
        }
        Ok(())
    }

    /// The memory limit string, if a non-empty one was given
    ///
    /// Whitespace-only values are returned as-is so the parser reports them.
    #[must_use]
    pub fn memory_limit(&self) -> Option<&str> {
        self.memory_limit.as_deref().filter(|raw| !raw.is_empty())
    }

    /// Payload handed to the initializer across the process boundary
    #[must_use]
    pub fn to_init_config(&self) -> InitConfig {
        InitConfig {
            version: HANDOFF_VERSION,
            rootfs: self.rootfs.clone(),
            memory_limit: self.memory_limit().map(str::to_string),
            hostname: self.hostname.clone(),
        }
    }
}

/// Builder for LaunchConfig
#[derive(Debug, Default)]
pub struct LaunchConfigBuilder {
    config: LaunchConfig,
}

impl LaunchConfigBuilder {
    #[must_use]
    pub fn rootfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rootfs = path.into();
        self
    }

    #[must_use]
    pub fn memory_limit(mut self, raw: impl Into<String>) -> Self {
        self.config.memory_limit = Some(raw.into());
        self
    }

    #[must_use]
    pub fn hostname(mut self, name: impl Into<String>) -> Self {
        self.config.hostname = name.into();
        self
    }

    #[must_use]
    pub fn command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.config.command = argv.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn build(self) -> LaunchConfig {
        self.config
    }
}

/// Configuration carried from the launcher into the initializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Payload schema version, must equal [`HANDOFF_VERSION`]
    pub version: u32,
    pub rootfs: PathBuf,
    pub memory_limit: Option<String>,
    pub hostname: String,
}

impl InitConfig {
    /// Reject payloads the initializer cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.version != HANDOFF_VERSION {
            return Err(MiniboxError::Handoff(format!(
                "unsupported handoff version {} (expected {HANDOFF_VERSION})",
                self.version
            )));
        }
        if self.rootfs.as_os_str().is_empty() {
            return Err(MiniboxError::Config("rootfs not set".into()));
        }
        Ok(())
    }
}

/// Root of the cgroup v1 memory hierarchy
///
/// Returns:
/// - `$MINIBOX_CGROUP_ROOT` if set
/// - `/sys/fs/cgroup/memory` otherwise
pub fn default_cgroup_root() -> PathBuf {
    std::env::var("MINIBOX_CGROUP_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/sys/fs/cgroup/memory"))
}
