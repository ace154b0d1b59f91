//! `burrow run`: start a command in a new container.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use burrow_common::config::BurrowConfig;
use burrow_common::constants::CONFIG_ENV;
use burrow_common::types::{ContainerName, ContainerState, ResourceConfig, Volume};
use burrow_core::cgroup::resolver::CgroupPathResolver;
use burrow_core::cgroup::{CgroupManager, SubsystemRegistry};
use burrow_runtime::handoff::HandoffWriter;
use burrow_runtime::launcher::{ContainerLauncher, LaunchRequest};
use burrow_runtime::process::ContainerProcess;
use burrow_runtime::state::{ContainerRecord, remove_record, save_record};
use burrow_runtime::workspace::ContainerWorkspace;
use clap::Args;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Attach the container to this terminal and clean up when it exits.
    #[arg(short = 't', long)]
    pub tty: bool,

    /// Container name. A random one is generated when absent.
    #[arg(long)]
    pub name: Option<String>,

    /// Base image directory. Defaults to the configured image.
    #[arg(long)]
    pub image: Option<String>,

    /// Bind a host directory into the container, as `host:container`.
    #[arg(short, long)]
    pub volume: Option<String>,

    /// Extra environment entry, as `KEY=VALUE`.
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Memory limit, e.g. `100m`.
    #[arg(short, long)]
    pub memory: Option<String>,

    /// Relative CPU weight.
    #[arg(long)]
    pub cpu_shares: Option<String>,

    /// Maximum number of tasks.
    #[arg(long)]
    pub pids_max: Option<String>,

    /// Command to run inside the container.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn resources(&self) -> ResourceConfig {
        ResourceConfig {
            memory_limit: self.memory.clone(),
            cpu_shares: self.cpu_shares.clone(),
            pids_max: self.pids_max.clone(),
        }
    }
}

/// Everything created for one container, for cleanup.
struct Launched {
    name: ContainerName,
    workspace: ContainerWorkspace,
    cgroup: CgroupManager,
}

impl Launched {
    fn clean_up(&self, config: &BurrowConfig) {
        if let Err(e) = self.cgroup.destroy() {
            tracing::warn!(container = %self.name, error = %e, "failed to remove cgroup");
        }
        if let Err(e) = self.workspace.teardown() {
            tracing::warn!(container = %self.name, error = %e, "failed to tear down workspace");
        }
        if let Err(e) = remove_record(config, self.name.as_str()) {
            tracing::warn!(container = %self.name, error = %e, "failed to remove record");
        }
    }
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if any launch step fails.
pub fn execute(
    args: &RunArgs,
    config: BurrowConfig,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let name = match &args.name {
        Some(name) => ContainerName::new(name.as_str())?,
        None => ContainerName::generate(),
    };
    let volume = Volume::parse(args.volume.as_deref().unwrap_or_default())?;
    let mut extra_env = args.env.clone();
    if let Some(path) = config_path {
        // The child loads the same file before its cwd moves into the container.
        let path = std::path::absolute(path)
            .with_context(|| format!("resolving {}", path.display()))?;
        extra_env.push(format!("{CONFIG_ENV}={}", path.display()));
    }

    let request = LaunchRequest {
        interactive: args.tty,
        container_name: name.clone(),
        base_image: args
            .image
            .as_ref()
            .map_or_else(|| config.default_image.clone(), Into::into),
        volume: volume.clone(),
        extra_env,
    };
    let launcher = ContainerLauncher::new(config);
    let config = launcher.config();

    let (mut process, writer) = launcher.construct(&request)?;
    let launched = Launched {
        name: name.clone(),
        workspace: launcher.workspace(&request),
        cgroup: CgroupManager::new(
            name.as_str(),
            SubsystemRegistry::with_defaults(&Arc::new(CgroupPathResolver::new())),
        ),
    };

    let mut record = ContainerRecord::new(name.as_str(), args.command.clone(), volume);
    let pid = launch(&mut process, writer, &launched, args, config, &mut record)?;

    if !args.tty {
        print_detached(&name, pid);
        return Ok(());
    }

    let code = process.wait()?;
    launched.clean_up(config);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[allow(clippy::print_stdout, clippy::print_stderr)]
fn print_detached(name: &ContainerName, pid: u32) {
    println!("{name}\t{pid}");
    eprintln!("  Running detached. Use {BOLD}burrow logs {name}{RESET} to see its output.");
}

/// Runs [`start`]; on failure the child is reaped and everything created
/// for it removed before the error is returned.
fn launch(
    process: &mut ContainerProcess,
    writer: HandoffWriter,
    launched: &Launched,
    args: &RunArgs,
    config: &BurrowConfig,
    record: &mut ContainerRecord,
) -> anyhow::Result<u32> {
    match start(process, writer, launched, args, config, record) {
        Ok(pid) => Ok(pid),
        Err(e) => {
            // The writer is gone by now, so a waiting child sees EOF.
            if process.pid().is_some() {
                let _ = process.wait();
            }
            launched.clean_up(config);
            Err(e)
        }
    }
}

/// Starts the child, confines it, records it as running, and hands off
/// the command.
fn start(
    process: &mut ContainerProcess,
    writer: HandoffWriter,
    launched: &Launched,
    args: &RunArgs,
    config: &BurrowConfig,
    record: &mut ContainerRecord,
) -> anyhow::Result<u32> {
    save_record(config, record)?;
    let pid = process.start()?;
    let pid = u32::try_from(pid.as_raw()).context("kernel returned a negative pid")?;

    launched.cgroup.set(&args.resources())?;
    launched.cgroup.apply(pid)?;

    record.pid = Some(pid);
    record.state = ContainerState::Running;
    save_record(config, record)?;
    tracing::info!(container = %launched.name, pid, "container running");

    writer.send_command(&args.command)?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use burrow_common::config::BurrowConfig;
    use burrow_common::types::ContainerName;
    use burrow_core::cgroup::resolver::CgroupPathResolver;
    use burrow_core::cgroup::{CgroupManager, SubsystemRegistry};
    use burrow_core::namespace::NamespaceConfig;
    use burrow_runtime::handoff::{self, HandoffSlot};
    use burrow_runtime::process::ContainerProcess;
    use burrow_runtime::state::ContainerRecord;
    use burrow_runtime::workspace::ContainerWorkspace;
    use clap::Parser;

    use super::{Launched, launch};
    use crate::commands::{Cli, Command};

    fn parse(argv: &[&str]) -> super::RunArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn command_keeps_its_own_flags() {
        let args = parse(&["burrow", "run", "-t", "sh", "-c", "ls -l"]);
        assert!(args.tty);
        assert_eq!(args.command, ["sh", "-c", "ls -l"]);
    }

    #[test]
    fn limits_map_onto_resources() {
        let args = parse(&["burrow", "run", "-m", "100m", "--pids-max", "64", "top"]);
        let resources = args.resources();
        assert_eq!(resources.memory_limit.as_deref(), Some("100m"));
        assert_eq!(resources.pids_max.as_deref(), Some("64"));
        assert!(resources.cpu_shares.is_none());
    }

    #[test]
    fn repeated_env_flags_accumulate() {
        let args = parse(&["burrow", "run", "-e", "A=1", "-e", "B=2", "env"]);
        assert_eq!(args.env, ["A=1", "B=2"]);
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["burrow", "run", "-t"]).is_err());
    }

    /// A launch whose cgroup lives in a fake unified hierarchy under `dir`.
    fn launched_in(dir: &Path, config: &BurrowConfig) -> Launched {
        let filesystems = dir.join("filesystems");
        std::fs::write(&filesystems, "nodev\tcgroup\nnodev\tcgroup2\n").unwrap();
        std::fs::create_dir_all(dir.join("cgroup")).unwrap();
        let resolver = CgroupPathResolver::with_paths(
            filesystems,
            dir.join("mountinfo"),
            dir.join("cgroup"),
        );
        let name = ContainerName::new("web").unwrap();
        Launched {
            workspace: ContainerWorkspace::new(config, &name, dir.join("busybox"), None),
            cgroup: CgroupManager::new("web", SubsystemRegistry::with_defaults(&Arc::new(resolver))),
            name,
        }
    }

    #[test]
    fn failed_handoff_reaps_child_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BurrowConfig {
            root_dir: dir.path().join("root"),
            mount_root: dir.path().join("mnt"),
            info_root: dir.path().join("run"),
            ..BurrowConfig::default()
        };
        let launched = launched_in(dir.path(), &config);

        // The child never reads, so a command larger than the pipe buffer
        // blocks until it exits and the write then fails.
        let (read, writer) = handoff::channel().unwrap();
        let mut process = ContainerProcess::new(
            Path::new("/bin/true"),
            &[],
            dir.path(),
            read,
            HandoffSlot::DEFAULT,
        )
        .unwrap();
        let _ = process.namespaces(NamespaceConfig {
            pid: false,
            mount: false,
            network: false,
            ipc: false,
            uts: false,
        });
        let big = "x".repeat(1 << 20);
        let args = parse(&["burrow", "run", big.as_str()]);
        let mut record = ContainerRecord::new("web", args.command.clone(), None);

        let result = launch(&mut process, writer, &launched, &args, &config, &mut record);

        assert!(result.is_err());
        assert!(process.pid().is_some());
        assert!(process.wait().is_err(), "child should already be reaped");
        assert!(!config.info_dir("web").exists());
        assert!(!dir.path().join("cgroup/web").exists());
    }
}
