//! Provisioner plugins.
//!
//! A provisioner plugin turns a provisioner spec node into commands executed
//! through the machine's communicator. The built-in `shell` class runs an
//! inline script body or uploads and runs a local script file.

use crate::comm::Communicator;
use crate::error::{CoreError, Result};
use crate::topology::machine::MachineNode;
use crate::topology::node::NodeRef;
use tracing::info;

/// Executes one provisioner spec against a machine.
pub trait ProvisionerPlugin {
    /// Runs the provisioner.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed spec, a communicator
    /// error for transport failures, and a provider error when the script
    /// exits non-zero.
    fn provision(
        &self,
        machine: &MachineNode,
        spec: &NodeRef,
        comm: &dyn Communicator,
    ) -> Result<()>;
}

/// Shell script provisioner.
#[derive(Debug, Default)]
pub struct ShellProvisioner;

impl ShellProvisioner {
    fn run_checked(comm: &dyn Communicator, cmd: Vec<String>, what: &str) -> Result<()> {
        let out = comm.sudo(&cmd)?;
        if out.success() {
            Ok(())
        } else {
            Err(CoreError::provider(format!(
                "{what} exited with {}: {}",
                out.exit_code,
                out.stderr.trim()
            )))
        }
    }
}

impl ProvisionerPlugin for ShellProvisioner {
    fn provision(
        &self,
        machine: &MachineNode,
        spec: &NodeRef,
        comm: &dyn Communicator,
    ) -> Result<()> {
        let inline = spec.get_str("inline").unwrap_or_default();
        let path = spec.get_str("path").unwrap_or_default();

        if !inline.is_empty() {
            info!(
                machine = machine.name(),
                provisioner = spec.name(),
                "running inline script"
            );
            return Self::run_checked(
                comm,
                vec!["sh".to_string(), "-c".to_string(), inline],
                "inline script",
            );
        }

        if !path.is_empty() {
            info!(
                machine = machine.name(),
                provisioner = spec.name(),
                script = path.as_str(),
                "running script file"
            );
            let content = std::fs::read(&path)?;
            let remote = format!("/tmp/machina-{}.sh", spec.name());
            comm.write_file(&content, &remote)?;
            return Self::run_checked(comm, vec!["sh".to_string(), remote], "script");
        }

        Err(CoreError::configuration(format!(
            "provisioner \"{}\" declares neither inline nor path",
            spec.name()
        )))
    }
}
