//! Net command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Command;

use super::commons::{self, TopologyArgs};

/// Arguments for the net command.
#[derive(Args)]
pub struct NetArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the net command.
pub fn execute(args: NetArgs) -> Result<()> {
    commons::run_with_topology(Command::Net, &args.topology)
}
