//! Down command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Command;

use super::commons::{self, TopologyArgs};

/// Arguments for the down command.
#[derive(Args)]
pub struct DownArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the down command.
pub fn execute(args: DownArgs) -> Result<()> {
    commons::run_with_topology(Command::Down, &args.topology)
}
