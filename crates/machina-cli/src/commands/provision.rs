//! Provision command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Command;

use super::commons::{self, TopologyArgs};

/// Arguments for the provision command.
#[derive(Args)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the provision command.
pub fn execute(args: ProvisionArgs) -> Result<()> {
    commons::run_with_topology(Command::Provision, &args.topology)
}
