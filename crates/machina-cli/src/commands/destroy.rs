//! Destroy command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Command;

use super::commons::{self, TopologyArgs};

/// Arguments for the destroy command.
#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the destroy command.
pub fn execute(args: DestroyArgs) -> Result<()> {
    commons::run_with_topology(Command::Destroy, &args.topology)
}
