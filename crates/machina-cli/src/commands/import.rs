//! Import command implementation.

use anyhow::{Context, Result};
use clap::Args;
use machina_core::Config;
use machina_core::boxes::{BoxStorage, FileFetcher};

/// Arguments for the import command.
#[derive(Args)]
pub struct ImportArgs {
    /// Box name in local storage
    #[arg(long)]
    pub name: String,

    /// Archive location (file path or file:// URL)
    #[arg(long)]
    pub url: String,
}

/// Executes the import command.
pub fn execute(args: ImportArgs) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    let storage = BoxStorage::new(config.boxes_dir());
    let archive = storage.ensure(&args.name, &args.url, &FileFetcher)?;

    println!("{}", archive.display());
    Ok(())
}
