//! Recording doubles for unit tests

use crate::isolation::{CgroupHandle, ChildSpec, IsolationProvider, Loopback, ResourceLimiter};
use crate::{MiniboxError, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use nix::unistd::Pid;
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Spawn(ChildSpec),
    Wait(Pid),
    SetHostname(String),
    Mount {
        source: Option<PathBuf>,
        target: PathBuf,
        fstype: Option<String>,
        flags: MsFlags,
    },
    Unmount {
        target: PathBuf,
        flags: MntFlags,
    },
    PivotRoot {
        new_root: PathBuf,
        put_old: PathBuf,
    },
    Chdir(PathBuf),
    CreateDir(PathBuf, u32),
    RemoveDir(PathBuf),
    Exec(Vec<OsString>),
}

/// How the fake child terminates
#[derive(Debug, Clone, Copy)]
pub enum WaitOutcome {
    Exit(i32),
    Signal,
}

/// Records every call; `exec` always fails since nothing can be replaced
pub struct RecordingProvider {
    calls: RefCell<Vec<Call>>,
    fail_on: Option<Box<dyn Fn(&Call) -> bool>>,
    pub wait_outcome: WaitOutcome,
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self {
            calls: RefCell::default(),
            fail_on: None,
            wait_outcome: WaitOutcome::Exit(0),
        }
    }
}

impl RecordingProvider {
    pub fn failing_on(pred: impl Fn(&Call) -> bool + 'static) -> Self {
        Self {
            fail_on: Some(Box::new(pred)),
            ..Self::default()
        }
    }

    pub fn exiting_with(outcome: WaitOutcome) -> Self {
        Self {
            wait_outcome: outcome,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        let fail = self.fail_on.as_ref().is_some_and(|pred| pred(&call));
        let op = format!("{call:?}");
        self.calls.borrow_mut().push(call);
        if fail {
            return Err(MiniboxError::sys(op, Errno::EPERM));
        }
        Ok(())
    }
}

impl IsolationProvider for RecordingProvider {
    fn spawn_isolated(&self, spec: &ChildSpec) -> Result<Pid> {
        self.record(Call::Spawn(spec.clone()))?;
        Ok(Pid::from_raw(4242))
    }

    fn wait(&self, pid: Pid) -> Result<i32> {
        self.record(Call::Wait(pid))?;
        match self.wait_outcome {
            WaitOutcome::Exit(code) => Ok(code),
            WaitOutcome::Signal => Err(MiniboxError::ChildSignaled {
                pid: pid.as_raw(),
                signal: "SIGKILL".into(),
            }),
        }
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        self.record(Call::SetHostname(name.to_string()))
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        _data: Option<&str>,
    ) -> Result<()> {
        self.record(Call::Mount {
            source: source.map(Path::to_path_buf),
            target: target.to_path_buf(),
            fstype: fstype.map(str::to_string),
            flags,
        })
    }

    fn unmount(&self, target: &Path, flags: MntFlags) -> Result<()> {
        self.record(Call::Unmount {
            target: target.to_path_buf(),
            flags,
        })
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        self.record(Call::PivotRoot {
            new_root: new_root.to_path_buf(),
            put_old: put_old.to_path_buf(),
        })
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        self.record(Call::Chdir(path.to_path_buf()))
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        self.record(Call::CreateDir(path.to_path_buf(), mode))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        self.record(Call::RemoveDir(path.to_path_buf()))
    }

    fn exec(&self, argv: &[OsString]) -> Result<Infallible> {
        self.record(Call::Exec(argv.to_vec()))?;
        Err(MiniboxError::sys("exec", Errno::ENOSYS))
    }
}

/// Loopback double that counts attempts
#[derive(Debug, Default)]
pub struct FakeLoopback {
    pub fail: bool,
    pub attempts: Cell<u32>,
}

impl Loopback for FakeLoopback {
    fn bring_up(&self) -> Result<()> {
        self.attempts.set(self.attempts.get() + 1);
        if self.fail {
            return Err(MiniboxError::Loopback("no tool".into()));
        }
        Ok(())
    }
}

/// Limiter double that remembers what it was asked to do
#[derive(Debug, Default)]
pub struct FakeLimiter {
    pub fail: bool,
    pub applied: RefCell<Vec<(Pid, i64)>>,
}

impl ResourceLimiter for FakeLimiter {
    fn apply_memory_limit(&self, pid: Pid, limit_bytes: i64) -> Result<CgroupHandle> {
        self.applied.borrow_mut().push((pid, limit_bytes));
        if self.fail {
            return Err(MiniboxError::Cgroup("not mounted".into()));
        }
        Ok(CgroupHandle::new(format!("/cg/minibox_{pid}")))
    }
}
