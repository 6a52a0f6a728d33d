//! Launcher to initializer configuration handoff
//!
//! The launcher encodes an [`InitConfig`] as MessagePack, frames it with a
//! 4-byte big-endian length prefix and writes it into a pipe before the
//! child exists. The child finds the read end on [`HANDOFF_FD`], reads the
//! whole frame once and validates it before touching any system state.

use crate::{InitConfig, MiniboxError, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

/// First argument that switches the binary into initializer mode
///
/// The suffix is the handoff version; a binary only answers to its own.
pub const INIT_SENTINEL: &str = "minibox-init.v1";

/// Descriptor number the child receives the handoff pipe on
pub const HANDOFF_FD: RawFd = 3;

/// Largest frame written into the handoff pipe
///
/// The frame is written before the child exists, so it must fit in the pipe
/// buffer. One page is the smallest buffer the kernel hands out, which is
/// what a user over `pipe-user-pages-soft` gets.
pub const MAX_FRAME_LEN: usize = 4096;

/// Largest payload that fits in [`MAX_FRAME_LEN`] together with its prefix
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - 4;

/// Encode a config into a length-prefixed frame
pub fn encode(config: &InitConfig) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec_named(config)
        .map_err(|e| MiniboxError::Handoff(format!("failed to serialize init config: {e}")))?;

    if body.len() > MAX_PAYLOAD_LEN {
        return Err(MiniboxError::Handoff(format!(
            "init config too large: {} bytes",
            body.len()
        )));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a frame body (without prefix) into a config
pub fn decode(body: &[u8]) -> Result<InitConfig> {
    rmp_serde::from_slice(body)
        .map_err(|e| MiniboxError::Handoff(format!("failed to deserialize init config: {e}")))
}

/// Read end of a handoff pipe whose payload has already been written
#[derive(Debug)]
pub struct HandoffPipe {
    read_end: File,
}

impl HandoffPipe {
    /// Create a pipe, write `frame` into it and close the write end
    ///
    /// Both ends are close-on-exec; the spawner moves the read end onto
    /// [`HANDOFF_FD`] in the child, which clears the flag there.
    pub fn with_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(MiniboxError::Handoff(format!(
                "handoff frame too large: {} bytes",
                frame.len()
            )));
        }

        let (read_end, mut write_end) = create_pipe()?;
        write_end.write_all(frame)?;
        write_end.flush()?;
        drop(write_end);

        Ok(Self { read_end })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_end.as_raw_fd()
    }
}

/// Reads and validates one framed [`InitConfig`]
#[derive(Debug)]
pub struct HandoffReader<R> {
    inner: R,
}

impl HandoffReader<File> {
    /// Adopt the descriptor inherited from the launcher
    ///
    /// Fails if [`HANDOFF_FD`] is not open, which means the process was not
    /// started by a minibox launcher.
    pub fn from_inherited_fd() -> Result<Self> {
        // SAFETY: F_GETFD only queries descriptor flags
        let ret = unsafe { libc::fcntl(HANDOFF_FD, libc::F_GETFD) };
        if ret == -1 {
            return Err(MiniboxError::Handoff(format!(
                "no handoff descriptor on fd {HANDOFF_FD}: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: the descriptor is open and nothing else in this process owns it
        let file = unsafe { File::from_raw_fd(HANDOFF_FD) };
        Ok(Self::new(file))
    }
}

impl<R: Read> HandoffReader<R> {
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the frame, decode it and validate the result
    ///
    /// Consumes the reader so the underlying descriptor is closed afterwards.
    pub fn read_config(mut self) -> Result<InitConfig> {
        let mut len_bytes = [0u8; 4];
        self.inner
            .read_exact(&mut len_bytes)
            .map_err(|e| MiniboxError::Handoff(format!("failed to read frame length: {e}")))?;

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(MiniboxError::Handoff(format!(
                "init config too large: {len} bytes"
            )));
        }

        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .map_err(|e| MiniboxError::Handoff(format!("failed to read init config: {e}")))?;

        let config = decode(&body)?;
        config.validate()?;
        Ok(config)
    }
}

/// Create a pipe (returns read end, write end)
fn create_pipe() -> Result<(File, File)> {
    let mut fds = [0i32; 2];

    // SAFETY: pipe2 syscall
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };

    if ret != 0 {
        return Err(MiniboxError::Io(std::io::Error::last_os_error()));
    }

    // SAFETY: We just created these file descriptors
    let read_end = unsafe { File::from_raw_fd(fds[0]) };
    let write_end = unsafe { File::from_raw_fd(fds[1]) };

    Ok((read_end, write_end))
}
