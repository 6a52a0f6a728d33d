//! Error types for minibox-core

use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiniboxError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid memory limit: {0}")]
    MemoryLimit(#[from] MemoryLimitError),

    #[error("{op}: {source}")]
    Sys {
        op: String,
        #[source]
        source: nix::Error,
    },

    #[error("{op} {}: {source}", path.display())]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cgroup error: {0}")]
    Cgroup(String),

    #[error("handoff error: {0}")]
    Handoff(String),

    #[error("loopback error: {0}")]
    Loopback(String),

    #[error("child process {pid} terminated by signal {signal}")]
    ChildSignaled { pid: i32, signal: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
}

impl MiniboxError {
    pub(crate) fn sys(op: impl Into<String>, source: nix::Error) -> Self {
        Self::Sys {
            op: op.into(),
            source,
        }
    }

    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Reasons a memory size string is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryLimitError {
    #[error("empty memory limit")]
    Empty,

    #[error("invalid memory limit suffix {0:?}")]
    InvalidSuffix(char),

    #[error("parse integer from {input:?}: {source}")]
    InvalidNumber {
        input: String,
        #[source]
        source: ParseIntError,
    },

    #[error("memory limit {input:?} overflows a 64-bit byte count")]
    Overflow { input: String },
}
