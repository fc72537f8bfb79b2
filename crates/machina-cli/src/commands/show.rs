//! Show command implementation.

use anyhow::Result;
use clap::Args;
use machina_core::Registry;

use super::commons::{self, TopologyArgs};

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub topology: TopologyArgs,
}

/// Executes the show command.
///
/// Prints the resolved machines without scheduling anything.
pub fn execute(args: ShowArgs) -> Result<()> {
    let registry = Registry::with_builtins();
    let topology = commons::load_topology(&args.topology, &registry)?;

    println!(
        "{:<20} {:<12} {:<12} UUID",
        "NAME", "CLASS", "STATE"
    );
    for machine in topology.machines() {
        println!(
            "{:<20} {:<12} {:<12} {}",
            machine.name(),
            machine.class_name(),
            machine.state(),
            machine.uuid()
        );
    }

    Ok(())
}
