//! [`IsolationProvider`] backed by real Linux syscalls

use super::{clone3, ChildSpec, IsolationProvider};
use crate::handoff::{HandoffPipe, HANDOFF_FD};
use crate::{MiniboxError, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::convert::Infallible;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// The host kernel
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxProvider;

impl IsolationProvider for LinuxProvider {
    fn spawn_isolated(&self, spec: &ChildSpec) -> Result<Pid> {
        let pipe = HandoffPipe::with_frame(&spec.handoff)?;

        // Everything the child touches is built before clone3; after it the
        // child may only use async-signal-safe calls.
        let program = path_to_cstring(&spec.program)?;
        let mut argv = Vec::with_capacity(spec.args.len() + 1);
        argv.push(program.clone());
        for arg in &spec.args {
            argv.push(os_to_cstring(arg)?);
        }
        let envp = inherited_environment()?;

        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);
        let read_fd = pipe.read_fd();

        let pid = clone3::clone_isolated(spec.namespaces.to_clone_flags(), || {
            // SAFETY: only async-signal-safe calls between clone3 and execve
            unsafe {
                if read_fd == HANDOFF_FD {
                    let flags = libc::fcntl(read_fd, libc::F_GETFD);
                    if flags == -1
                        || libc::fcntl(read_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1
                    {
                        child_abort(b"minibox: failed to expose handoff descriptor\n");
                    }
                } else if libc::dup2(read_fd, HANDOFF_FD) == -1 {
                    child_abort(b"minibox: failed to expose handoff descriptor\n");
                }

                libc::execve(program.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
                child_abort(b"minibox: failed to exec initializer\n");
            }
        })?;

        // The child holds its own copy now
        drop(pipe);

        Ok(Pid::from_raw(pid))
    }

    fn wait(&self, pid: Pid) -> Result<i32> {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(code),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Err(MiniboxError::ChildSignaled {
                        pid: pid.as_raw(),
                        signal: signal.as_str().to_string(),
                    });
                }
                Ok(status) => {
                    tracing::debug!(?status, "ignoring non-terminal wait status");
                }
                Err(Errno::EINTR) => {}
                Err(e) => return Err(MiniboxError::sys(format!("waitpid({pid})"), e)),
            }
        }
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        nix::unistd::sethostname(name)
            .map_err(|e| MiniboxError::sys(format!("sethostname({name:?})"), e))
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        nix::mount::mount(source, target, fstype, flags, data).map_err(|e| {
            MiniboxError::sys(
                format!(
                    "mount({}, {}, {}, {flags:?})",
                    source.map_or_else(|| "none".into(), |s| s.display().to_string()),
                    target.display(),
                    fstype.unwrap_or("none"),
                ),
                e,
            )
        })
    }

    fn unmount(&self, target: &Path, flags: MntFlags) -> Result<()> {
        nix::mount::umount2(target, flags)
            .map_err(|e| MiniboxError::sys(format!("umount2({}, {flags:?})", target.display()), e))
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        let new_root_c = path_to_cstring(new_root)?;
        let put_old_c = path_to_cstring(put_old)?;

        // SAFETY: pivot_root syscall
        let ret = unsafe {
            libc::syscall(
                libc::SYS_pivot_root,
                new_root_c.as_ptr(),
                put_old_c.as_ptr(),
            )
        };

        if ret != 0 {
            return Err(MiniboxError::sys(
                format!("pivot_root({}, {})", new_root.display(), put_old.display()),
                Errno::last(),
            ));
        }

        Ok(())
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path)
            .map_err(|e| MiniboxError::sys(format!("chdir({})", path.display()), e))
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(|e| MiniboxError::fs("mkdir", path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path).map_err(|e| MiniboxError::fs("rmdir", path, e))
    }

    fn exec(&self, argv: &[OsString]) -> Result<Infallible> {
        let program = argv
            .first()
            .ok_or_else(|| MiniboxError::Config("no command to execute".into()))?;
        let args = argv
            .iter()
            .map(|arg| os_to_cstring(arg))
            .collect::<Result<Vec<_>>>()?;
        let path = os_to_cstring(program)?;

        nix::unistd::execv(&path, &args)
            .map_err(|e| MiniboxError::sys(format!("exec {program:?} {argv:?}"), e))
    }
}

// Helper functions

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| MiniboxError::Config(format!("invalid path {}: {e}", path.display())))
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes())
        .map_err(|e| MiniboxError::Config(format!("invalid argument {s:?}: {e}")))
}

fn inherited_environment() -> Result<Vec<CString>> {
    std::env::vars_os()
        .map(|(key, value)| {
            let mut entry = key.into_vec();
            entry.push(b'=');
            entry.extend(value.into_vec());
            CString::new(entry)
                .map_err(|e| MiniboxError::Config(format!("invalid environment entry: {e}")))
        })
        .collect()
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Report a failure from the pre-exec child and exit
///
/// # Safety
/// Uses only `write` and `_exit`, both async-signal-safe.
unsafe fn child_abort(msg: &[u8]) -> ! {
    // SAFETY: writing a static buffer to stderr, then exiting without unwinding
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(i32::from(crate::SETUP_FAILURE_EXIT_CODE))
    }
}
