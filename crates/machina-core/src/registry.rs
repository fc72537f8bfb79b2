//! Plugin registry.
//!
//! Maps the textual `class` field of a topology entry to a concrete
//! implementation, one independent table per capability family. The registry
//! is built once at process start, populated with the built-ins (plus
//! whatever the embedder registers), and treated as read-only for the rest
//! of the run. There is deliberately no global instance: the topology loader
//! receives a reference.

use crate::comm::{Communicator, LocalShell, NullCommunicator};
use crate::error::{CoreError, Result};
use crate::guest::{GuestAdapter, LinuxGuest};
use crate::provider::{NoopProvider, ProviderPlugin};
use crate::provision::{ProvisionerPlugin, ShellProvisioner};
use crate::topology::attr::resolve_all;
use crate::topology::node::{Node, NodeFamily, NodeRef};
use crate::topology::schema_for;
use serde_yaml::Mapping;
use std::collections::HashMap;
use std::rc::Rc;

/// Name-to-implementation tables for every capability family.
#[derive(Default)]
pub struct Registry {
    providers: HashMap<String, Rc<dyn ProviderPlugin>>,
    provisioners: HashMap<String, Rc<dyn ProvisionerPlugin>>,
    guests: HashMap<String, Rc<dyn GuestAdapter>>,
    communicators: HashMap<String, Rc<dyn Communicator>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry populated with the built-in plugins.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_provider("noop", Rc::new(NoopProvider));
        registry.register_provisioner("shell", Rc::new(ShellProvisioner));
        registry.register_guest("linux", Rc::new(LinuxGuest));
        registry.register_communicator("null", Rc::new(NullCommunicator));
        registry.register_communicator("local", Rc::new(LocalShell));
        registry
    }

    /// Registers a provider plugin. Re-registering a name overwrites it.
    pub fn register_provider(&mut self, name: impl Into<String>, plugin: Rc<dyn ProviderPlugin>) {
        self.providers.insert(name.into(), plugin);
    }

    /// Registers a provisioner plugin. Re-registering a name overwrites it.
    pub fn register_provisioner(
        &mut self,
        name: impl Into<String>,
        plugin: Rc<dyn ProvisionerPlugin>,
    ) {
        self.provisioners.insert(name.into(), plugin);
    }

    /// Registers a guest adapter. Re-registering a name overwrites it.
    pub fn register_guest(&mut self, name: impl Into<String>, guest: Rc<dyn GuestAdapter>) {
        self.guests.insert(name.into(), guest);
    }

    /// Registers a communicator. Re-registering a name overwrites it.
    pub fn register_communicator(&mut self, name: impl Into<String>, comm: Rc<dyn Communicator>) {
        self.communicators.insert(name.into(), comm);
    }

    /// Looks up a provider plugin by class name.
    ///
    /// # Errors
    ///
    /// Returns a component-not-found error for an unregistered class.
    pub fn provider(&self, name: &str) -> Result<Rc<dyn ProviderPlugin>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("provider", name))
    }

    /// Looks up a provisioner plugin by class name.
    ///
    /// # Errors
    ///
    /// Returns a component-not-found error for an unregistered class.
    pub fn provisioner(&self, name: &str) -> Result<Rc<dyn ProvisionerPlugin>> {
        self.provisioners
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("provisioner", name))
    }

    /// Looks up a guest adapter by class name.
    ///
    /// # Errors
    ///
    /// Returns a component-not-found error for an unregistered class.
    pub fn guest(&self, name: &str) -> Result<Rc<dyn GuestAdapter>> {
        self.guests
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("guest", name))
    }

    /// Looks up a communicator by class name.
    ///
    /// # Errors
    ///
    /// Returns a component-not-found error for an unregistered class.
    pub fn communicator(&self, name: &str) -> Result<Rc<dyn Communicator>> {
        self.communicators
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("communicator", name))
    }

    /// Builds a child node of the given family from a raw document mapping.
    ///
    /// The owning node becomes both the configuration ancestor (for
    /// inherited reads) and the structural container of the child.
    ///
    /// # Errors
    ///
    /// Propagates attribute resolution failures.
    pub fn build_child(
        &self,
        family: NodeFamily,
        raw: &Mapping,
        owner: &NodeRef,
    ) -> Result<NodeRef> {
        let child = Node::new(family, schema_for(family));
        child.set_parent(Some(owner));
        child.set_container(Some(owner));
        resolve_all(&child, raw, self)?;
        Ok(child)
    }
}

fn not_found(family: &'static str, name: &str) -> CoreError {
    CoreError::ComponentNotFound {
        family,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = Registry::with_builtins();
        assert!(registry.provider("noop").is_ok());
        assert!(registry.provisioner("shell").is_ok());
        assert!(registry.guest("linux").is_ok());
        assert!(registry.communicator("null").is_ok());
        assert!(registry.communicator("local").is_ok());
    }

    #[test]
    fn test_unknown_class_is_component_not_found() {
        let registry = Registry::with_builtins();
        let err = registry.provider("vaporware").unwrap_err();
        assert!(err.is_component_not_found());
        assert!(err.to_string().contains("vaporware"));
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = Registry::with_builtins();
        registry.register_provider("noop", Rc::new(NoopProvider));
        assert!(registry.provider("noop").is_ok());
    }

    #[test]
    fn test_build_child_sets_both_back_references() {
        let registry = Registry::with_builtins();
        let owner = Node::new(NodeFamily::Machine, schema_for(NodeFamily::Machine));

        let mut raw = Mapping::new();
        raw.insert("name".into(), "eth0".into());
        let child = registry
            .build_child(NodeFamily::Interface, &raw, &owner)
            .unwrap();

        assert_eq!(child.name(), "eth0");
        assert!(child.parent().is_some());
        assert!(child.container().is_some());
    }
}
