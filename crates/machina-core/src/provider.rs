//! Provider drivers.
//!
//! A provider plugin supplies two things: the driver that talks to the
//! hypervisor, and the attribute schemas for the subtree it manages, so one
//! `class` selector per machine yields a fully-typed machine, its
//! interfaces, networks, and shared folders.
//!
//! Every driver operation must be safe to call when the machine is already
//! in the target state. Task generation calls them defensively, and
//! convergence re-runs would otherwise fail on work already done.

use crate::error::Result;
use crate::topology::attr::AttrDescriptor;
use crate::topology::machine::{MachineNode, MachineState};
use crate::topology::node::{NodeFamily, NodeRef};
use crate::topology::schema_for;
use std::rc::Rc;
use tracing::{debug, info};
use uuid::Uuid;

/// Hypervisor-facing operations on one machine.
pub trait ProviderDriver {
    /// Powers the machine up. No-op when already running.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn power_up(&self, machine: &MachineNode) -> Result<()>;

    /// Powers the machine down. No-op when already off.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn power_down(&self, machine: &MachineNode) -> Result<()>;

    /// Pauses a running machine. No-op otherwise.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn pause(&self, machine: &MachineNode) -> Result<()>;

    /// Removes the machine from the hypervisor. No-op when never created.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn destroy(&self, machine: &MachineNode) -> Result<()>;

    /// Maps the hypervisor's native state into the canonical set.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn query_state(&self, machine: &MachineNode) -> Result<MachineState>;

    /// Creates the machine from a box appliance. No-op when it exists.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn import_appliance(&self, box_node: Option<&NodeRef>, machine: &MachineNode) -> Result<()>;

    /// Ensures the network exists and is up. No-op when it already is.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn create_network(&self, machine: &MachineNode, network: &NodeRef) -> Result<()>;

    /// Attaches and configures an adapter for the interface.
    ///
    /// # Errors
    ///
    /// Returns a provider error on hypervisor failure.
    fn setup_interface(&self, machine: &MachineNode, interface: &NodeRef) -> Result<()>;
}

/// A registered provider class.
pub trait ProviderPlugin: std::fmt::Debug {
    /// The driver instance for machines of this class.
    fn driver(&self) -> Rc<dyn ProviderDriver>;

    /// Attribute schema for the given node family.
    ///
    /// The default is the provider-agnostic schema; providers override this
    /// to add their own recognized fields.
    fn schema(&self, family: NodeFamily) -> &'static [AttrDescriptor] {
        schema_for(family)
    }
}

/// Dry-run provider.
///
/// Tracks canonical state transitions on the node itself and mints
/// identifiers, without talking to any hypervisor. It is the default
/// provider class and the workhorse of the test suite.
#[derive(Debug, Default)]
pub struct NoopProvider;

impl ProviderPlugin for NoopProvider {
    fn driver(&self) -> Rc<dyn ProviderDriver> {
        Rc::new(NoopDriver)
    }
}

/// Driver behind [`NoopProvider`].
#[derive(Debug, Default)]
pub struct NoopDriver;

impl ProviderDriver for NoopDriver {
    fn power_up(&self, machine: &MachineNode) -> Result<()> {
        if machine.state() == MachineState::Running {
            debug!(machine = machine.name(), "already running");
            return Ok(());
        }
        info!(machine = machine.name(), "powering up");
        machine.set_state(MachineState::Running);
        Ok(())
    }

    fn power_down(&self, machine: &MachineNode) -> Result<()> {
        if machine.state() == MachineState::PowerDown {
            return Ok(());
        }
        info!(machine = machine.name(), "powering down");
        machine.set_state(MachineState::PowerDown);
        Ok(())
    }

    fn pause(&self, machine: &MachineNode) -> Result<()> {
        if machine.state() != MachineState::Running {
            return Ok(());
        }
        info!(machine = machine.name(), "pausing");
        machine.set_state(MachineState::Paused);
        Ok(())
    }

    fn destroy(&self, machine: &MachineNode) -> Result<()> {
        if machine.uuid().is_empty() {
            return Ok(());
        }
        info!(machine = machine.name(), "destroying");
        machine.set_uuid("");
        machine.clear_state();
        Ok(())
    }

    fn query_state(&self, machine: &MachineNode) -> Result<MachineState> {
        Ok(machine.state())
    }

    fn import_appliance(&self, box_node: Option<&NodeRef>, machine: &MachineNode) -> Result<()> {
        if !machine.uuid().is_empty() {
            debug!(machine = machine.name(), "already created");
            return Ok(());
        }
        let box_name = box_node.map(|b| b.name()).unwrap_or_default();
        info!(machine = machine.name(), box_name, "creating machine");
        machine.set_uuid(&Uuid::new_v4().to_string());
        machine.set_state(MachineState::PowerDown);
        Ok(())
    }

    fn create_network(&self, machine: &MachineNode, network: &NodeRef) -> Result<()> {
        info!(machine = machine.name(), network = network.name(), "ensuring network");
        Ok(())
    }

    fn setup_interface(&self, machine: &MachineNode, interface: &NodeRef) -> Result<()> {
        info!(
            machine = machine.name(),
            interface = interface.name(),
            "configuring interface"
        );
        Ok(())
    }
}
