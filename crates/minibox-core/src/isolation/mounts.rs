//! Filesystem mounting and pivot_root

use super::IsolationProvider;
use crate::{MiniboxError, Result};
use nix::mount::{MntFlags, MsFlags};
use std::path::{Path, PathBuf};

/// Directory inside the new root that briefly holds the old root
pub const PUT_OLD_DIR: &str = ".pivot_root";

/// Switches the calling process into a prepared root filesystem
///
/// Must run inside a fresh mount namespace.
#[derive(Debug, Clone)]
pub struct RootfsSetup {
    /// New root path for pivot_root
    pub new_root: PathBuf,
}

impl RootfsSetup {
    pub fn new(new_root: impl Into<PathBuf>) -> Self {
        Self {
            new_root: new_root.into(),
        }
    }

    /// Privatize mounts, pivot into the new root and mount /proc
    pub fn apply(&self, provider: &impl IsolationProvider) -> Result<()> {
        make_mounts_private(provider)?;
        self.do_pivot_root(provider)?;
        mount_proc(provider)?;
        Ok(())
    }

    fn do_pivot_root(&self, provider: &impl IsolationProvider) -> Result<()> {
        let new_root = std::path::absolute(&self.new_root)
            .map_err(|e| MiniboxError::fs("resolve absolute path of", &self.new_root, e))?;
        tracing::debug!(root = %new_root.display(), "pivot_root");

        let put_old = new_root.join(PUT_OLD_DIR);
        provider.create_dir_all(&put_old, 0o700)?;

        // pivot_root needs the new root to be a mount point of its own
        provider.mount(
            Some(new_root.as_path()),
            &new_root,
            None,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None,
        )?;

        provider.pivot_root(&new_root, &put_old)?;
        provider.chdir(Path::new("/"))?;

        let old_root = Path::new("/").join(PUT_OLD_DIR);
        provider.unmount(&old_root, MntFlags::MNT_DETACH)?;
        provider.remove_dir(&old_root)?;

        Ok(())
    }
}

/// Stop mount events propagating between this namespace and the host
pub fn make_mounts_private(provider: &impl IsolationProvider) -> Result<()> {
    tracing::debug!("remounting / as private");
    provider.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None,
    )
}

/// Mount a fresh procfs at /proc of the current root
pub fn mount_proc(provider: &impl IsolationProvider) -> Result<()> {
    tracing::debug!("mounting /proc");
    let proc = Path::new("/proc");
    provider.create_dir_all(proc, 0o555)?;
    provider.mount(
        Some(Path::new("proc")),
        proc,
        Some("proc"),
        MsFlags::empty(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingProvider};

    #[test]
    fn apply_runs_steps_in_order() {
        let provider = RecordingProvider::default();
        RootfsSetup::new("/srv/rootfs").apply(&provider).unwrap();

        let root = PathBuf::from("/srv/rootfs");
        assert_eq!(
            provider.calls(),
            vec![
                Call::Mount {
                    source: None,
                    target: "/".into(),
                    fstype: None,
                    flags: MsFlags::MS_PRIVATE | MsFlags::MS_REC,
                },
                Call::CreateDir(root.join(".pivot_root"), 0o700),
                Call::Mount {
                    source: Some(root.clone()),
                    target: root.clone(),
                    fstype: None,
                    flags: MsFlags::MS_BIND | MsFlags::MS_REC,
                },
                Call::PivotRoot {
                    new_root: root.clone(),
                    put_old: root.join(".pivot_root"),
                },
                Call::Chdir("/".into()),
                Call::Unmount {
                    target: "/.pivot_root".into(),
                    flags: MntFlags::MNT_DETACH,
                },
                Call::RemoveDir("/.pivot_root".into()),
                Call::CreateDir("/proc".into(), 0o555),
                Call::Mount {
                    source: Some("proc".into()),
                    target: "/proc".into(),
                    fstype: Some("proc".into()),
                    flags: MsFlags::empty(),
                },
            ]
        );
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let provider = RecordingProvider::default();
        RootfsSetup::new("rootfs").apply(&provider).unwrap();

        let pivot = provider
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::PivotRoot { new_root, .. } => Some(new_root),
                _ => None,
            })
            .unwrap();
        assert!(pivot.is_absolute());
        assert!(pivot.ends_with("rootfs"));
    }

    #[test]
    fn failed_pivot_aborts_remaining_steps() {
        let provider =
            RecordingProvider::failing_on(|call| matches!(call, Call::PivotRoot { .. }));
        let err = RootfsSetup::new("/srv/rootfs").apply(&provider).unwrap_err();
        assert!(err.to_string().contains("PivotRoot"));

        let calls = provider.calls();
        assert!(matches!(calls.last(), Some(Call::PivotRoot { .. })));
        assert!(!calls.iter().any(|c| matches!(c, Call::Chdir(_))));
    }

    #[test]
    fn failed_privatize_stops_before_pivot() {
        let provider = RecordingProvider::failing_on(|call| {
            matches!(call, Call::Mount { target, .. } if target == Path::new("/"))
        });
        assert!(RootfsSetup::new("/srv/rootfs").apply(&provider).is_err());
        assert_eq!(provider.calls().len(), 1);
    }
}
