//! Guest OS adapters.
//!
//! A [`GuestAdapter`] expresses guest-side operations purely as command
//! vectors pushed through a [`Communicator`]; it never touches the
//! hypervisor. The built-in `linux` adapter covers any distribution with
//! the usual coreutils plus `hostnamectl` and `ip`.

use crate::comm::{CommandOutput, Communicator};
use crate::error::{CoreError, Result};
use crate::topology::node::NodeRef;
use crate::topology::{interface, shared};

/// Guest-side operations for one OS family.
pub trait GuestAdapter {
    /// Creates a directory (and parents) in the guest.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-zero exit.
    fn mkdir(&self, comm: &dyn Communicator, path: &str) -> Result<()>;

    /// Mounts a shared folder at its remote path.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-zero exit.
    fn mount(&self, comm: &dyn Communicator, folder: &NodeRef) -> Result<()>;

    /// Initiates a clean guest shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-zero exit.
    fn shutdown(&self, comm: &dyn Communicator) -> Result<()>;

    /// Lists the guest's IP addresses.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-zero exit.
    fn get_ips(&self, comm: &dyn Communicator) -> Result<Vec<String>>;

    /// Sets the guest hostname.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-zero exit.
    fn change_hostname(&self, comm: &dyn Communicator, hostname: &str) -> Result<()>;

    /// Configures an interface inside the guest.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-zero exit.
    fn setup_interface(&self, comm: &dyn Communicator, iface: &NodeRef, device: &str)
        -> Result<()>;
}

fn checked(out: CommandOutput, what: &str) -> Result<()> {
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

/// Linux guest adapter.
#[derive(Debug, Default)]
pub struct LinuxGuest;

impl LinuxGuest {
    fn sudo(comm: &dyn Communicator, cmd: &[&str], what: &str) -> Result<()> {
        let cmd: Vec<String> = cmd.iter().map(|s| (*s).to_string()).collect();
        checked(comm.sudo(&cmd)?, what)
    }
}

impl GuestAdapter for LinuxGuest {
    fn mkdir(&self, comm: &dyn Communicator, path: &str) -> Result<()> {
        Self::sudo(comm, &["mkdir", "-p", path], "mkdir")
    }

    fn mount(&self, comm: &dyn Communicator, folder: &NodeRef) -> Result<()> {
        let remote = folder.get_str("remote").unwrap_or_default();
        let options = shared::mount_options(folder);
        Self::sudo(
            comm,
            &[
                "mount",
                "-t",
                "vboxsf",
                "-o",
                options,
                &folder.name(),
                &remote,
            ],
            "mount",
        )
    }

    fn shutdown(&self, comm: &dyn Communicator) -> Result<()> {
        Self::sudo(comm, &["shutdown", "-h", "now"], "shutdown")
    }

    fn get_ips(&self, comm: &dyn Communicator) -> Result<Vec<String>> {
        let out = comm.run(
            &["hostname".to_string(), "-I".to_string()],
            &std::collections::BTreeMap::new(),
        )?;
        checked(out.clone(), "hostname -I")?;
        Ok(out.stdout.split_whitespace().map(str::to_string).collect())
    }

    fn change_hostname(&self, comm: &dyn Communicator, hostname: &str) -> Result<()> {
        Self::sudo(
            comm,
            &["hostnamectl", "set-hostname", hostname],
            "hostnamectl",
        )
    }

    fn setup_interface(
        &self,
        comm: &dyn Communicator,
        iface: &NodeRef,
        device: &str,
    ) -> Result<()> {
        if interface::uses_dhcp(iface) {
            Self::sudo(comm, &["dhclient", device], "dhclient")
        } else {
            let ip = iface.get_str("ip").unwrap_or_default();
            Self::sudo(comm, &["ip", "addr", "add", &ip, "dev", device], "ip addr")
        }
    }
}
