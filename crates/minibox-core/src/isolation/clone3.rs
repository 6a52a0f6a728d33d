//! clone3 syscall wrapper
//!
//! Falls back to plain `clone(2)` where clone3 is unavailable, which
//! includes container seccomp profiles that answer it with `ENOSYS`.

use crate::{MiniboxError, Result, SETUP_FAILURE_EXIT_CODE};
use libc::pid_t;
use nix::errno::Errno;
use nix::sched::CloneFlags;

/// clone3 clone_args structure (from linux/sched.h)
#[repr(C)]
#[derive(Debug, Default)]
pub struct CloneArgs {
    /// Flags for the new process
    pub flags: u64,
    /// File descriptor for pidfd
    pub pidfd: u64,
    /// Pointer to store the child tid
    pub child_tid: u64,
    /// Pointer to store the parent tid
    pub parent_tid: u64,
    /// Signal to deliver on child termination
    pub exit_signal: u64,
    /// Stack pointer (0 = copy parent stack)
    pub stack: u64,
    /// Stack size (0 if using parent stack)
    pub stack_size: u64,
    /// TLS pointer
    pub tls: u64,
}

/// Wrapper around the clone3 syscall
///
/// # Safety
/// This function makes a raw syscall and forks the process. In the child
/// only async-signal-safe functions may be called.
pub unsafe fn clone3(args: &CloneArgs) -> nix::Result<pid_t> {
    // SAFETY: Making clone3 syscall with valid args
    let ret = unsafe {
        libc::syscall(
            libc::SYS_clone3,
            std::ptr::from_ref(args),
            std::mem::size_of::<CloneArgs>(),
        )
    };

    if ret == -1 {
        return Err(Errno::last());
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(ret as pid_t)
}

/// Legacy clone(2) with fork semantics
///
/// A null stack makes the child continue on a copy of the parent's stack,
/// and every pointer argument is null, so argument order differences
/// between architectures do not matter.
///
/// # Safety
/// Same contract as [`clone3`].
pub unsafe fn clone_legacy(flags: u64, exit_signal: u64) -> nix::Result<pid_t> {
    // SAFETY: Making clone syscall without stack or tid pointers
    let ret = unsafe {
        libc::syscall(
            libc::SYS_clone,
            (flags | exit_signal) as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };

    if ret == -1 {
        return Err(Errno::last());
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(ret as pid_t)
}

/// Run `primary`, and `fallback` only if the kernel does not know `primary`
fn with_clone_fallback(
    primary: impl FnOnce() -> nix::Result<pid_t>,
    fallback: impl FnOnce() -> nix::Result<pid_t>,
) -> Result<pid_t> {
    match primary() {
        Ok(pid) => Ok(pid),
        Err(Errno::ENOSYS) => {
            tracing::debug!("clone3 unavailable, falling back to clone");
            fallback().map_err(|e| MiniboxError::sys("clone", e))
        }
        Err(e) => Err(MiniboxError::sys("clone3", e)),
    }
}

/// Fork a child directly into new namespaces
///
/// The namespaces exist before `child_fn` runs, so the child never executes
/// in the host's namespaces. `child_fn` is expected to `execve`; if it
/// returns, the child exits with [`SETUP_FAILURE_EXIT_CODE`].
pub fn clone_isolated(namespaces: CloneFlags, child_fn: impl FnOnce()) -> Result<pid_t> {
    #[allow(clippy::cast_sign_loss)]
    let args = CloneArgs {
        flags: namespaces.bits() as u64,
        exit_signal: libc::SIGCHLD as u64,
        ..Default::default()
    };

    // SAFETY: We're forking the process with clone3 or clone
    let pid = with_clone_fallback(
        || unsafe { clone3(&args) },
        || unsafe { clone_legacy(args.flags, args.exit_signal) },
    )?;

    if pid == 0 {
        // Child process
        child_fn();
        // SAFETY: Exiting child process without running parent destructors
        unsafe { libc::_exit(i32::from(SETUP_FAILURE_EXIT_CODE)) };
    }

    // Parent process
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn clone_args_match_kernel_v0_size() {
        // CLONE_ARGS_SIZE_VER0
        assert_eq!(std::mem::size_of::<CloneArgs>(), 64);
    }

    #[test]
    fn enosys_falls_back_to_clone() {
        let fell_back = Cell::new(false);
        let pid = with_clone_fallback(
            || Err(Errno::ENOSYS),
            || {
                fell_back.set(true);
                Ok(77)
            },
        )
        .unwrap();

        assert_eq!(pid, 77);
        assert!(fell_back.get());
    }

    #[test]
    fn other_clone3_errors_are_not_retried() {
        let fell_back = Cell::new(false);
        let err = with_clone_fallback(
            || Err(Errno::EPERM),
            || {
                fell_back.set(true);
                Ok(77)
            },
        )
        .unwrap_err();

        assert!(err.to_string().contains("clone3"));
        assert!(!fell_back.get());
    }

    #[test]
    fn fallback_failure_names_clone() {
        let err = with_clone_fallback(|| Err(Errno::ENOSYS), || Err(Errno::EINVAL)).unwrap_err();
        assert!(matches!(
            err,
            MiniboxError::Sys { ref op, source: Errno::EINVAL } if op == "clone"
        ));
    }
}
