//! CLI command implementations.
//!
//! Each convergence subcommand (up, down, pause, destroy, net, provision)
//! loads the topology, asks it for that command's task edges, and drives
//! the scheduler through `commons::run_with_topology`. `show` and `import`
//! are inspection and box-management commands that never schedule.

use clap::{Parser, Subcommand};

pub mod commons;
pub mod destroy;
pub mod down;
pub mod import;
pub mod net;
pub mod pause;
pub mod provision;
pub mod show;
pub mod up;

/// Machina - converge declared VM topologies
#[derive(Parser)]
#[command(name = "machina")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create, power up, and configure the topology's machines
    Up(up::UpArgs),

    /// Power machines down
    Down(down::DownArgs),

    /// Pause running machines
    Pause(pause::PauseArgs),

    /// Power down and remove machines
    Destroy(destroy::DestroyArgs),

    /// Create and bring up networks and interfaces only
    Net(net::NetArgs),

    /// Run provisioners on running machines
    Provision(provision::ProvisionArgs),

    /// Show each machine's name, class, state, and identifier
    Show(show::ShowArgs),

    /// Fetch a box archive into local storage
    Import(import::ImportArgs),
}
