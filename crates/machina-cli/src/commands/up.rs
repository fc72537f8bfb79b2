//! Up command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Command;

use super::commons::{self, TopologyArgs};

/// Arguments for the up command.
#[derive(Args)]
pub struct UpArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the up command.
pub fn execute(args: UpArgs) -> Result<()> {
    commons::run_with_topology(Command::Up, &args.topology)
}
