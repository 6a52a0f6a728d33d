//! Best-effort loopback bring-up
//!
//! A new network namespace has `lo` present but down. Bringing it up is
//! delegated to whichever configuration tool the root filesystem ships.

use crate::{MiniboxError, Result};
use std::process::{Command, Stdio};

/// Brings the loopback interface up
pub trait Loopback {
    fn bring_up(&self) -> Result<()>;
}

/// A network tool invocation that brings `lo` up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackTool {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Candidates in order of preference
pub const DEFAULT_TOOLS: &[LoopbackTool] = &[
    LoopbackTool {
        program: "ip",
        args: &["link", "set", "lo", "up"],
    },
    LoopbackTool {
        program: "ifconfig",
        args: &["lo", "up"],
    },
];

/// Runs the first candidate tool found on `PATH`
#[derive(Debug, Clone)]
pub struct ToolLoopback {
    tools: &'static [LoopbackTool],
}

impl Default for ToolLoopback {
    fn default() -> Self {
        Self::new(DEFAULT_TOOLS)
    }
}

impl ToolLoopback {
    #[must_use]
    pub const fn new(tools: &'static [LoopbackTool]) -> Self {
        Self { tools }
    }
}

impl Loopback for ToolLoopback {
    fn bring_up(&self) -> Result<()> {
        let (tool, path) = self
            .tools
            .iter()
            .find_map(|tool| which::which(tool.program).ok().map(|path| (tool, path)))
            .ok_or_else(|| {
                let names: Vec<_> = self.tools.iter().map(|t| t.program).collect();
                MiniboxError::Loopback(format!("none of {names:?} found to bring up loopback"))
            })?;

        tracing::debug!(tool = %path.display(), "bringing up loopback");
        let status = Command::new(&path)
            .args(tool.args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| MiniboxError::Loopback(format!("failed to run {}: {e}", path.display())))?;

        if !status.success() {
            return Err(MiniboxError::Loopback(format!(
                "{} {} exited with {status}",
                tool.program,
                tool.args.join(" ")
            )));
        }

        Ok(())
    }
}
