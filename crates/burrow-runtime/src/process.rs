//! The container's init process, created with `clone(2)`.
//!
//! Namespaces are requested at clone time so the child starts as PID 1 of
//! its own PID namespace. Everything the child needs before `execve(2)` is
//! prepared in the parent; between `clone` and `execve` the child only
//! issues raw syscalls.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_core::namespace::NamespaceConfig;
use nix::sched::clone;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::handoff::HandoffSlot;

/// Stack handed to the cloned child; it only runs until `execve(2)`.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit status of a child that failed before `execve(2)`.
const SETUP_FAILED: isize = 126;

/// Exit status of a child whose `execve(2)` failed.
const EXEC_FAILED: isize = 127;

/// Standard stream wiring of the child.
#[derive(Debug)]
pub enum StdioMode {
    /// Share the launcher's terminal.
    Inherit,
    /// Stdout and stderr to `log`; stdin from `/dev/null`.
    Redirect {
        /// Receives the child's stdout and stderr, including init failures.
        log: File,
        /// `/dev/null`, opened read-write.
        null: File,
    },
}

/// A not-yet-started (or started) container init process.
#[derive(Debug)]
pub struct ContainerProcess {
    program: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    cwd: CString,
    namespaces: NamespaceConfig,
    stdio: StdioMode,
    handoff: Option<OwnedFd>,
    slot: HandoffSlot,
    pid: Option<Pid>,
}

impl ContainerProcess {
    /// Describes a child running `program` with `args` in `cwd`.
    ///
    /// `handoff` is placed at `slot` in the child.
    ///
    /// # Errors
    ///
    /// Returns an error if any string contains an interior NUL byte.
    pub fn new(
        program: &Path,
        args: &[&str],
        cwd: &Path,
        handoff: OwnedFd,
        slot: HandoffSlot,
    ) -> Result<Self> {
        let program_c = to_cstring(program.as_os_str())?;
        let mut argv = vec![program_c.clone()];
        for arg in args {
            argv.push(to_cstring(OsStr::new(arg))?);
        }
        Ok(Self {
            program: program_c,
            argv,
            envp: Vec::new(),
            cwd: to_cstring(cwd.as_os_str())?,
            namespaces: NamespaceConfig::default(),
            stdio: StdioMode::Inherit,
            handoff: Some(handoff),
            slot,
            pid: None,
        })
    }

    /// Sets the namespaces the child is cloned into.
    pub fn namespaces(&mut self, namespaces: NamespaceConfig) -> &mut Self {
        self.namespaces = namespaces;
        self
    }

    /// Sets how the child's standard streams are wired.
    pub fn stdio(&mut self, stdio: StdioMode) -> &mut Self {
        self.stdio = stdio;
        self
    }

    /// Replaces the child's environment with `KEY=VALUE` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry has no `=` or contains a NUL byte.
    pub fn env<I, S>(&mut self, entries: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut envp = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            if !entry.as_bytes().contains(&b'=') {
                return Err(BurrowError::Config {
                    message: format!("environment entry must be KEY=VALUE: {}", entry.to_string_lossy()),
                });
            }
            envp.push(to_cstring(entry)?);
        }
        self.envp = envp;
        Ok(self)
    }

    /// Returns the host pid of the child once started.
    #[must_use]
    pub const fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Clones the child and returns its host pid.
    ///
    /// The parent's copy of the handoff read end is closed afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was already started or `clone(2)` fails.
    pub fn start(&mut self) -> Result<Pid> {
        let Some(handoff) = self.handoff.take() else {
            return Err(BurrowError::Config {
                message: "container process already started".into(),
            });
        };

        let image = ExecImage {
            program: self.program.as_ptr(),
            argv: null_terminated(&self.argv),
            envp: null_terminated(&self.envp),
            cwd: self.cwd.as_ptr(),
            handoff: handoff.as_raw_fd(),
            slot: self.slot.fd(),
            stdio: match &self.stdio {
                StdioMode::Inherit => None,
                StdioMode::Redirect { log, null } => Some((log.as_raw_fd(), null.as_raw_fd())),
            },
        };
        let mut stack = vec![0_u8; CHILD_STACK_SIZE];
        let flags = self.namespaces.clone_flags();

        // SAFETY: the child gets a copy of this address space, so every
        // pointer in `image` stays valid in it, and it only performs raw
        // syscalls before execve(2) or returning.
        let pid = unsafe {
            clone(
                Box::new(|| child_exec(&image)),
                &mut stack,
                flags,
                Some(libc::SIGCHLD),
            )
        }
        .map_err(|e| BurrowError::Exec {
            command: self.program.to_string_lossy().into_owned(),
            message: format!("clone failed: {e}"),
        })?;

        drop(handoff);
        self.pid = Some(pid);
        tracing::info!(pid = pid.as_raw(), ?flags, "container process started");
        Ok(pid)
    }

    /// Waits for the started child to exit and returns its exit code.
    ///
    /// A child killed by a signal reports `128 + signal`, as shells do.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was never started or `waitpid(2)` fails.
    pub fn wait(&self) -> Result<i32> {
        let Some(pid) = self.pid else {
            return Err(BurrowError::Config {
                message: "container process was never started".into(),
            });
        };
        loop {
            let status = waitpid(pid, None)
                .map_err(|e| BurrowError::io(format!("pid {pid}"), std::io::Error::from(e)))?;
            let code = match status {
                WaitStatus::Exited(_, code) => code,
                WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
                _ => continue,
            };
            tracing::info!(pid = pid.as_raw(), code, "container process exited");
            return Ok(code);
        }
    }
}

/// Raw pieces the cloned child needs, prepared before `clone(2)`.
struct ExecImage {
    program: *const libc::c_char,
    argv: Vec<*const libc::c_char>,
    envp: Vec<*const libc::c_char>,
    cwd: *const libc::c_char,
    handoff: RawFd,
    slot: RawFd,
    stdio: Option<(RawFd, RawFd)>,
}

/// Body of the cloned child. Returns only if something failed.
fn child_exec(image: &ExecImage) -> isize {
    // SAFETY: plain syscalls on descriptors and C strings owned by the
    // parent's (copied) address space; no allocation, no locks.
    unsafe {
        if let Some((log, null)) = image.stdio {
            if libc::dup2(null, libc::STDIN_FILENO) == -1
                || libc::dup2(log, libc::STDOUT_FILENO) == -1
                || libc::dup2(log, libc::STDERR_FILENO) == -1
            {
                return SETUP_FAILED;
            }
        }
        // dup2 onto itself keeps close-on-exec, so clear it by hand.
        let placed = if image.handoff == image.slot {
            libc::fcntl(image.slot, libc::F_SETFD, 0)
        } else {
            libc::dup2(image.handoff, image.slot)
        };
        if placed == -1 || libc::chdir(image.cwd) == -1 {
            return SETUP_FAILED;
        }
        libc::execve(image.program, image.argv.as_ptr(), image.envp.as_ptr());
    }
    EXEC_FAILED
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Converts an OS string into a C string.
///
/// # Errors
///
/// Returns an error if `value` contains a NUL byte.
pub(crate) fn to_cstring(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| BurrowError::Config {
        message: format!("value contains a NUL byte: {}", value.to_string_lossy()),
    })
}
