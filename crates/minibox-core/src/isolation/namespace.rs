//! Linux namespace selection

use nix::sched::CloneFlags;

/// Namespaces created for the container at clone time
///
/// No user namespace is requested, so the container's root is the host's
/// root and the runtime itself must run privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct NamespaceConfig {
    /// Create new PID namespace
    pub pid: bool,
    /// Create new mount namespace
    pub mount: bool,
    /// Create new network namespace
    pub net: bool,
    /// Create new IPC namespace
    pub ipc: bool,
    /// Create new UTS namespace
    pub uts: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            net: true,
            ipc: true,
            uts: true,
        }
    }
}

impl NamespaceConfig {
    /// Convert to nix CloneFlags
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();

        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.net {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requests_five_namespaces() {
        let flags = NamespaceConfig::default().to_clone_flags();
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC
        );
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn disabled_namespaces_are_omitted() {
        let config = NamespaceConfig {
            net: false,
            ..NamespaceConfig::default()
        };
        assert!(!config.to_clone_flags().contains(CloneFlags::CLONE_NEWNET));
    }
}
