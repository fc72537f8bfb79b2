//! Pause command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Command;

use super::commons::{self, TopologyArgs};

/// Arguments for the pause command.
#[derive(Args)]
pub struct PauseArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the pause command.
pub fn execute(args: PauseArgs) -> Result<()> {
    commons::run_with_topology(Command::Pause, &args.topology)
}
