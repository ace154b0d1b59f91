//! Child side of a container launch.
//!
//! Runs as PID 1 inside the namespaces created by the launcher. Every step
//! here changes the whole process irreversibly, so it is only reachable
//! through the `init` entry point.

use std::convert::Infallible;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use burrow_common::config::RootLayering;
use burrow_common::error::{BurrowError, Result};
use burrow_core::filesystem::mount::{make_root_private, mount_dev, mount_proc};
use burrow_core::filesystem::pivot_root::swap_root;

use crate::handoff::{HandoffReader, HandoffSlot};
use crate::process::to_cstring;

/// Parameters of the container initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// Directory that becomes `/`.
    pub new_root: PathBuf,
    /// How the layered view is obtained before the swap.
    pub layering: RootLayering,
    /// Where the launcher placed the handoff read end.
    pub handoff: HandoffSlot,
}

impl InitOptions {
    /// Uses the current working directory as the new root.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined.
    pub fn from_current_dir(layering: RootLayering) -> Result<Self> {
        let new_root = std::env::current_dir().map_err(|e| BurrowError::io(".", e))?;
        Ok(Self {
            new_root,
            layering,
            handoff: HandoffSlot::DEFAULT,
        })
    }
}

/// Sets up the container and replaces this process with the target command.
///
/// Never returns on success.
///
/// # Errors
///
/// Returns an error if a mount step fails, the handoff cannot be read, or
/// the command cannot be resolved or executed.
pub fn run_container_init(options: &InitOptions) -> Result<Infallible> {
    tracing::info!(
        new_root = %options.new_root.display(),
        layering = ?options.layering,
        "initializing container"
    );
    set_up_mount_namespace(&options.new_root, options.layering)?;

    let argv = read_target_command(options.handoff)?;
    let program = resolve_command(&argv[0])?;
    tracing::info!(program = %program.display(), ?argv, "executing container command");
    exec_command(&program, &argv)
}

/// Isolates the mount tree, swaps into `new_root`, and mounts `/proc` and `/dev`.
///
/// # Errors
///
/// Returns an error if `new_root` is missing or any mount step fails.
pub fn set_up_mount_namespace(new_root: &Path, layering: RootLayering) -> Result<()> {
    make_root_private()?;
    if !new_root.exists() {
        return Err(BurrowError::NotFound {
            kind: "container root",
            id: new_root.display().to_string(),
        });
    }
    swap_root(new_root, layering)?;
    mount_proc()?;
    mount_dev()?;
    tracing::debug!("mount namespace ready");
    Ok(())
}

/// Reads the target command from the handoff slot.
///
/// # Errors
///
/// Returns an error if the slot is not open, the read fails, or the
/// command is empty.
pub fn read_target_command(slot: HandoffSlot) -> Result<Vec<String>> {
    HandoffReader::from_slot(slot)?.read_command()
}

/// Resolves `command` on the container's `PATH`.
///
/// # Errors
///
/// Returns [`BurrowError::Exec`] if the command cannot be found.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    which::which(command).map_err(|e| BurrowError::Exec {
        command: command.to_owned(),
        message: e.to_string(),
    })
}

fn exec_command(program: &Path, argv: &[String]) -> Result<Infallible> {
    let program_c = to_cstring(program.as_os_str())?;
    let argv_c = argv
        .iter()
        .map(|arg| to_cstring(arg.as_ref()))
        .collect::<Result<Vec<CString>>>()?;
    let env_c = std::env::vars_os()
        .map(|(key, value)| {
            let mut entry = key;
            entry.push("=");
            entry.push(value);
            to_cstring(&entry)
        })
        .collect::<Result<Vec<CString>>>()?;

    nix::unistd::execve(&program_c, &argv_c, &env_c).map_err(|e| BurrowError::Exec {
        command: program.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::os::fd::IntoRawFd;

    use super::*;
    use crate::handoff;

    #[test]
    fn options_default_to_working_directory() {
        let options = InitOptions::from_current_dir(RootLayering::default()).unwrap();
        assert_eq!(options.new_root, std::env::current_dir().unwrap());
        assert_eq!(options.handoff, HandoffSlot::DEFAULT);
        assert_eq!(options.layering, RootLayering::Premounted);
    }

    #[test]
    fn unknown_command_is_exec_error() {
        let err = resolve_command("burrow-no-such-command").unwrap_err();
        assert!(matches!(err, BurrowError::Exec { .. }));
    }

    #[test]
    fn absolute_command_resolves_to_itself() {
        assert_eq!(resolve_command("/bin/sh").unwrap(), PathBuf::from("/bin/sh"));
    }

    #[test]
    fn target_command_is_read_from_slot() {
        let (read, writer) = handoff::channel().unwrap();
        writer.send("sh -c ls").unwrap();
        let slot = HandoffSlot::new(read.into_raw_fd());

        assert_eq!(read_target_command(slot).unwrap(), ["sh", "-c", "ls"]);
    }

    #[test]
    fn unopened_slot_fails_before_reading() {
        let err = read_target_command(HandoffSlot::new(1019)).unwrap_err();
        assert!(matches!(err, BurrowError::NotFound { .. }));
    }

    #[test]
    fn empty_handoff_is_exec_error() {
        let (read, writer) = handoff::channel().unwrap();
        drop(writer);
        let slot = HandoffSlot::new(read.into_raw_fd());

        let err = read_target_command(slot).unwrap_err();
        assert!(matches!(err, BurrowError::Exec { .. }));
    }
}
