//! `burrow init`: the container side of `run`.

use burrow_common::config::BurrowConfig;
use burrow_runtime::init::{InitOptions, run_container_init};

/// Executes the `init` command.
///
/// Only returns if initialization failed.
///
/// # Errors
///
/// Returns the initialization or exec failure.
pub fn execute(config: &BurrowConfig) -> anyhow::Result<()> {
    let options = InitOptions::from_current_dir(config.root_layering)?;
    match run_container_init(&options) {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!(error = %e, "container init failed");
            Err(e.into())
        }
    }
}
