//! One-shot command handoff from the launcher to the container init.
//!
//! The launcher keeps the write end of a pipe; the child inherits the read
//! end at a fixed [`HandoffSlot`]. The message is the target command line
//! joined with single spaces, so arguments containing spaces cannot be
//! represented: they come back split.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

use burrow_common::error::{BurrowError, Result};
use nix::fcntl::OFlag;

/// Descriptor number at which the child finds the handoff read end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffSlot(RawFd);

impl HandoffSlot {
    /// The first descriptor after stdin, stdout, and stderr.
    pub const DEFAULT: Self = Self(3);

    /// Creates a slot at descriptor `fd`.
    #[must_use]
    pub const fn new(fd: RawFd) -> Self {
        Self(fd)
    }

    /// Returns the descriptor number.
    #[must_use]
    pub const fn fd(self) -> RawFd {
        self.0
    }

    fn describe(self) -> PathBuf {
        PathBuf::from(format!("handoff fd {}", self.0))
    }
}

impl Default for HandoffSlot {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Allocates a handoff channel.
///
/// Both ends are close-on-exec; the launcher moves the read end onto the
/// child's slot explicitly, which clears the flag for the child only.
///
/// # Errors
///
/// Returns an error if `pipe2(2)` fails.
pub fn channel() -> Result<(OwnedFd, HandoffWriter)> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| {
        BurrowError::io("handoff pipe", std::io::Error::from(e))
    })?;
    Ok((read, HandoffWriter(File::from(write))))
}

/// Launcher-side end of the handoff channel.
#[derive(Debug)]
pub struct HandoffWriter(File);

impl HandoffWriter {
    /// Sends `argv` joined with single spaces and closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn send_command(self, argv: &[String]) -> Result<()> {
        self.send(&argv.join(" "))
    }

    /// Sends a raw command line and closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn send(mut self, message: &str) -> Result<()> {
        self.0
            .write_all(message.as_bytes())
            .map_err(|e| BurrowError::io("handoff pipe", e))?;
        tracing::debug!(command = message, "command handed off");
        Ok(())
    }
}

/// Container-side end of the handoff channel.
#[derive(Debug)]
pub struct HandoffReader {
    file: File,
    origin: PathBuf,
}

impl HandoffReader {
    /// Wraps an already-owned read end.
    #[must_use]
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
            origin: PathBuf::from("handoff pipe"),
        }
    }

    /// Takes ownership of the descriptor at `slot`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is open at `slot`, which means the
    /// process was not started by the launcher.
    pub fn from_slot(slot: HandoffSlot) -> Result<Self> {
        // SAFETY: F_GETFD only inspects the descriptor table entry.
        if unsafe { libc::fcntl(slot.fd(), libc::F_GETFD) } == -1 {
            return Err(BurrowError::NotFound {
                kind: "handoff descriptor",
                id: format!("fd {} (was this process started by the launcher?)", slot.fd()),
            });
        }
        // SAFETY: the descriptor is open, and the launcher placed it here
        // for this process alone; nothing else in the process owns it.
        let file = unsafe { File::from_raw_fd(slot.fd()) };
        Ok(Self {
            file,
            origin: slot.describe(),
        })
    }

    /// Blocks until the launcher closes its end, then returns the argument vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, the message is not UTF-8, or the
    /// message is empty.
    pub fn read_command(mut self) -> Result<Vec<String>> {
        let mut message = String::new();
        let _ = self
            .file
            .read_to_string(&mut message)
            .map_err(|e| BurrowError::io(&self.origin, e))?;
        parse_command(&message)
    }
}

/// Splits a handoff message on single spaces.
///
/// # Errors
///
/// Returns an error if the message is empty.
pub fn parse_command(message: &str) -> Result<Vec<String>> {
    if message.is_empty() {
        return Err(BurrowError::Exec {
            command: String::new(),
            message: "launcher sent an empty command".into(),
        });
    }
    Ok(message.split(' ').map(String::from).collect())
}
