//! `burrow logs`: print a detached container's output.

use burrow_common::config::BurrowConfig;
use burrow_common::types::ContainerName;
use clap::Args;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container name.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the name is invalid or the log cannot be read.
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn execute(args: &LogsArgs, config: &BurrowConfig) -> anyhow::Result<()> {
    let name = ContainerName::new(&args.container)?;
    let logs = burrow_runtime::logs::read_logs(config, name.as_str())?;

    if logs.is_empty() {
        eprintln!("No logs available for container: {name}");
    } else {
        print!("{logs}");
    }
    Ok(())
}
