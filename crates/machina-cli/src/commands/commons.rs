//! Shared plumbing for topology-driven commands.

use anyhow::{Context, Result, bail};
use clap::Args;
use machina_core::{Command, Config, Registry, Scheduler, Topology};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File names tried when no topology file is given.
const CANDIDATES: [&str; 2] = ["machina.yaml", "topology.yaml"];

/// Arguments shared by every topology-driven command.
#[derive(Args)]
pub struct TopologyArgs {
    /// Topology file (defaults to machina.yaml or topology.yaml in the
    /// current directory)
    #[arg(short = 't', long)]
    pub topology: Option<PathBuf>,
}

impl TopologyArgs {
    /// Resolves the topology file, guessing well-known names when omitted.
    ///
    /// # Errors
    ///
    /// Fails when nothing was given and no candidate file exists.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.topology {
            return Ok(path.clone());
        }
        let cwd = std::env::current_dir()?;
        match guess_topology_file(&cwd) {
            Some(path) => Ok(path),
            None => bail!(
                "no topology file given and none of {} found here",
                CANDIDATES.join(", ")
            ),
        }
    }
}

/// Looks for a well-known topology file name in `dir`.
#[must_use]
pub fn guess_topology_file(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Loads the topology named by `args`.
///
/// # Errors
///
/// Propagates configuration and topology loading failures.
pub fn load_topology(args: &TopologyArgs, registry: &Registry) -> Result<Topology> {
    let config = Config::load().context("loading configuration")?;
    let path = args.resolve()?;
    Ok(Topology::load(&path, registry, &config)?)
}

/// Loads the topology, schedules one command's tasks, and runs them.
///
/// State is saved whenever at least one action completed, including after a
/// failed run, so partial progress survives a later failure.
///
/// # Errors
///
/// Returns the first scheduler or task failure.
pub fn run_with_topology(command: Command, args: &TopologyArgs) -> Result<()> {
    let registry = Registry::with_builtins();
    let topology = load_topology(args, &registry)?;

    let mut scheduler = Scheduler::new();
    scheduler.append(topology.tasks(command, &registry)?);
    let outcome = scheduler.run(true);

    if scheduler.num_completed() > 0 {
        if let Err(save_err) = topology.save_state() {
            if outcome.is_ok() {
                return Err(save_err.into());
            }
            warn!(error = %save_err, "could not save state after a failed run");
        }
    }

    info!(
        command = %command,
        completed = scheduler.num_completed(),
        "run finished"
    );
    outcome.map_err(Into::into)
}
