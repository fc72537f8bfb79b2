//! Machina CLI - declarative VM topology convergence.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    let filter = if cli.debug {
        "machina=debug,machina_cli=debug"
    } else {
        "machina=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Up(args) => commands::up::execute(args),
        Commands::Down(args) => commands::down::execute(args),
        Commands::Pause(args) => commands::pause::execute(args),
        Commands::Destroy(args) => commands::destroy::execute(args),
        Commands::Net(args) => commands::net::execute(args),
        Commands::Provision(args) => commands::provision::execute(args),
        Commands::Show(args) => commands::show::execute(args),
        Commands::Import(args) => commands::import::execute(args),
    }
}
