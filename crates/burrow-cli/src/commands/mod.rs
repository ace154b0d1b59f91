//! CLI command definitions and dispatch.

pub mod init;
pub mod logs;
pub mod run;

use std::path::PathBuf;

use burrow_common::config::BurrowConfig;
use burrow_common::constants::CONFIG_ENV;
use clap::{Parser, Subcommand};

/// Burrow: a minimal container engine.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a JSON configuration file.
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command in a new container.
    Run(run::RunArgs),
    /// Initialize a container from the inside. Started by `run`; not meant
    /// to be called directly.
    #[command(hide = true)]
    Init,
    /// Print the log of a detached container.
    Logs(logs::LogsArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = BurrowConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => run::execute(&args, config, cli.config.as_deref()),
        Command::Init => init::execute(&config),
        Command::Logs(args) => logs::execute(&args, &config),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn init_takes_no_arguments() {
        let cli = Cli::try_parse_from(["burrow", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
    }
}
