//! The base unit of the topology tree.
//!
//! A [`Node`] owns its resolved attributes and two distinct non-owning
//! back-references:
//!
//! - `parent`: the configuration ancestor used for inherited attribute
//!   fallback (for machines, the anonymous global node).
//! - `container`: the structural owner (for an interface, its machine).
//!
//! The owning tree ([`crate::topology::Topology`]) holds the only strong
//! references, so weak back-pointers can never keep a subtree alive.

use crate::error::{CoreError, Result};
use crate::topology::attr::{AttrDescriptor, AttrMode, AttrValue};
use serde_yaml::Mapping;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Shared handle to a topology node.
pub type NodeRef = Rc<Node>;

/// The type of a topology node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeFamily {
    /// A virtual machine (or the anonymous global defaults node).
    Machine,
    /// A virtual network.
    Network,
    /// A network interface attached to a machine.
    Interface,
    /// A folder shared between host and guest.
    SharedFolder,
    /// A provisioner run inside a machine.
    Provisioner,
    /// A machine template (appliance archive).
    Box,
}

impl fmt::Display for NodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Machine => "machine",
            Self::Network => "network",
            Self::Interface => "interface",
            Self::SharedFolder => "shared folder",
            Self::Provisioner => "provisioner",
            Self::Box => "box",
        };
        f.write_str(name)
    }
}

/// A typed element of the topology tree.
pub struct Node {
    family: NodeFamily,
    schema: &'static [AttrDescriptor],
    attrs: RefCell<BTreeMap<&'static str, AttrValue>>,
    parent: RefCell<Weak<Node>>,
    container: RefCell<Weak<Node>>,
    /// Ordinal counters for numbering same-family children.
    counters: RefCell<BTreeMap<NodeFamily, i64>>,
}

impl Node {
    /// Creates an empty node of the given family and schema.
    #[must_use]
    pub fn new(family: NodeFamily, schema: &'static [AttrDescriptor]) -> NodeRef {
        Rc::new(Self {
            family,
            schema,
            attrs: RefCell::new(BTreeMap::new()),
            parent: RefCell::new(Weak::new()),
            container: RefCell::new(Weak::new()),
            counters: RefCell::new(BTreeMap::new()),
        })
    }

    /// Returns the node family.
    #[must_use]
    pub fn family(&self) -> NodeFamily {
        self.family
    }

    /// Returns the attribute schema for this node type.
    #[must_use]
    pub fn schema(&self) -> &'static [AttrDescriptor] {
        self.schema
    }

    /// Returns the descriptor for a recognized attribute name.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&'static AttrDescriptor> {
        self.schema.iter().find(|d| d.name == name)
    }

    /// Sets the configuration ancestor.
    pub fn set_parent(&self, parent: Option<&NodeRef>) {
        *self.parent.borrow_mut() = parent.map_or_else(Weak::new, Rc::downgrade);
    }

    /// Sets the structural owner.
    pub fn set_container(&self, container: Option<&NodeRef>) {
        *self.container.borrow_mut() = container.map_or_else(Weak::new, Rc::downgrade);
    }

    /// Returns the configuration ancestor, if still alive.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.borrow().upgrade()
    }

    /// Returns the structural owner, if still alive.
    #[must_use]
    pub fn container(&self) -> Option<NodeRef> {
        self.container.borrow().upgrade()
    }

    /// Two-tier attribute lookup.
    ///
    /// Checks local storage first; for inherited attributes with no local
    /// value the read delegates to the parent chain, then to the schema
    /// default (materialized fresh per read, never shared between nodes).
    /// Returns `None` when no value exists anywhere, and callers decide
    /// whether that is an error.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AttrValue> {
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(value.clone());
        }
        let desc = self.descriptor(name)?;
        if desc.mode == AttrMode::Inherited {
            if let Some(parent) = self.parent() {
                if let Some(value) = parent.get(name) {
                    return Some(value);
                }
            }
        }
        desc.default.map(crate::topology::attr::AttrDefault::materialize)
    }

    /// Stores a local attribute value.
    ///
    /// Never touches the parent: resolution must not mutate ancestor state.
    pub fn set(&self, name: &'static str, value: AttrValue) {
        self.attrs.borrow_mut().insert(name, value);
    }

    /// Returns a snapshot of the locally stored attributes.
    #[must_use]
    pub fn local_attrs(&self) -> Vec<(&'static str, AttrValue)> {
        self.attrs
            .borrow()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// String attribute, or `None` when unset everywhere.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|v| v.as_str().map(str::to_string))
    }

    /// String attribute that must be present.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the attribute when it has no
    /// value and no ancestor supplies one.
    pub fn require_str(&self, name: &str) -> Result<String> {
        self.get_str(name).ok_or_else(|| {
            CoreError::configuration(format!(
                "unknown attribute \"{name}\" on {} \"{}\"",
                self.family,
                self.name()
            ))
        })
    }

    /// Integer attribute, or `None` when unset everywhere.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_int())
    }

    /// Boolean attribute, or `None` when unset everywhere.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| v.as_bool())
    }

    /// Nested node attribute.
    #[must_use]
    pub fn get_node(&self, name: &str) -> Option<NodeRef> {
        self.get(name).and_then(|v| v.as_node().map(Rc::clone))
    }

    /// Nested node-list attribute (empty when unset).
    #[must_use]
    pub fn get_nodes(&self, name: &str) -> Vec<NodeRef> {
        self.get(name).map(|v| v.nodes()).unwrap_or_default()
    }

    /// The node name (empty for the anonymous global node).
    #[must_use]
    pub fn name(&self) -> String {
        self.get_str("name").unwrap_or_default()
    }

    /// The class selector used for plugin lookup.
    #[must_use]
    pub fn class_name(&self) -> String {
        self.get_str("class").unwrap_or_default()
    }

    /// The external-system identifier (empty until provisioned).
    #[must_use]
    pub fn uuid(&self) -> String {
        self.get_str("uuid").unwrap_or_default()
    }

    /// Returns the next ordinal for numbering same-family children.
    ///
    /// Counters live on the container so that siblings of one family get
    /// consecutive numbers regardless of declaration interleaving.
    #[must_use]
    pub fn next_ordinal(&self, family: NodeFamily) -> i64 {
        let mut counters = self.counters.borrow_mut();
        let counter = counters.entry(family).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        ordinal
    }

    /// Collects the state-persisted attributes as a YAML mapping.
    ///
    /// Empty strings and empty lists are omitted; nested nodes contribute
    /// their own (possibly empty) state dictionaries. Iteration follows the
    /// schema order, so output is deterministic.
    #[must_use]
    pub fn state_dict(&self) -> Mapping {
        let mut out = Mapping::new();
        for desc in self.schema {
            if !desc.persist {
                continue;
            }
            let Some(value) = self.get(desc.name) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if let Some(yaml) = state_value(&value) {
                out.insert(serde_yaml::Value::String(desc.name.to_string()), yaml);
            }
        }
        out
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("family", &self.family)
            .field("name", &self.name())
            .field("class", &self.class_name())
            .finish_non_exhaustive()
    }
}

fn state_value(value: &AttrValue) -> Option<serde_yaml::Value> {
    match value {
        AttrValue::Str(s) => Some(serde_yaml::Value::String(s.clone())),
        AttrValue::Int(i) => Some(serde_yaml::Value::Number((*i).into())),
        AttrValue::Bool(b) => Some(serde_yaml::Value::Bool(*b)),
        AttrValue::Node(n) => {
            let dict = n.state_dict();
            if dict.is_empty() {
                None
            } else {
                Some(serde_yaml::Value::Mapping(dict))
            }
        }
        AttrValue::List(items) => {
            let converted: Vec<_> = items.iter().filter_map(state_value).collect();
            if converted.is_empty() {
                None
            } else {
                Some(serde_yaml::Value::Sequence(converted))
            }
        }
    }
}

/// Base attributes shared by every node type.
///
/// `uuid` is state-persisted so a re-run can recognize previously
/// provisioned nodes. `name` is not: the state store keys records by name
/// itself, so persisting it here would duplicate the key.
pub const BASE_NAME: AttrDescriptor =
    AttrDescriptor::new("name", crate::topology::attr::AttrKind::Str)
        .with_default(crate::topology::attr::AttrDefault::Str(""));

/// Base `class` descriptor.
pub const BASE_CLASS: AttrDescriptor =
    AttrDescriptor::new("class", crate::topology::attr::AttrKind::Str)
        .with_default(crate::topology::attr::AttrDefault::Str(""));

/// Base `uuid` descriptor.
pub const BASE_UUID: AttrDescriptor =
    AttrDescriptor::new("uuid", crate::topology::attr::AttrKind::Str)
        .with_default(crate::topology::attr::AttrDefault::Str(""))
        .persisted();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::attr::{AttrDefault, AttrKind, deep_copy};

    const TEST_SCHEMA: &[AttrDescriptor] = &[
        BASE_NAME,
        BASE_CLASS,
        BASE_UUID,
        AttrDescriptor::new("a", AttrKind::Str),
        AttrDescriptor::new("b", AttrKind::Int).copied(),
        AttrDescriptor::new("flag", AttrKind::Bool).with_default(AttrDefault::Bool(true)),
    ];

    fn test_node() -> NodeRef {
        Node::new(NodeFamily::Machine, TEST_SCHEMA)
    }

    #[test]
    fn test_inherited_is_a_live_reference() {
        let parent = test_node();
        parent.set("a", AttrValue::Str("8".into()));

        let child = test_node();
        child.set_parent(Some(&parent));

        assert_eq!(child.get_str("a").as_deref(), Some("8"));

        // Mutating the parent is visible through the child.
        parent.set("a", AttrValue::Str("changed".into()));
        assert_eq!(child.get_str("a").as_deref(), Some("changed"));
    }

    #[test]
    fn test_copy_is_a_snapshot() {
        let parent = test_node();
        parent.set("b", AttrValue::Int(9));

        let child = test_node();
        child.set_parent(Some(&parent));
        // Simulate the resolver's copy step.
        let copied = deep_copy(&parent.get("b").unwrap(), &child);
        child.set("b", copied);

        assert_eq!(child.get_int("b"), Some(9));

        parent.set("b", AttrValue::Int(100));
        assert_eq!(child.get_int("b"), Some(9));
    }

    #[test]
    fn test_local_override_shadows_parent() {
        let parent = test_node();
        parent.set("a", AttrValue::Str("global".into()));

        let child = test_node();
        child.set_parent(Some(&parent));
        child.set("a", AttrValue::Str("local".into()));

        assert_eq!(child.get_str("a").as_deref(), Some("local"));
        assert_eq!(parent.get_str("a").as_deref(), Some("global"));
    }

    #[test]
    fn test_missing_without_parent_is_none() {
        let node = test_node();
        assert!(node.get("a").is_none());
        assert!(node.require_str("a").is_err());
    }

    #[test]
    fn test_unknown_attribute_is_none() {
        let node = test_node();
        assert!(node.get("no-such-field").is_none());
    }

    #[test]
    fn test_ordinal_counters_per_family() {
        let node = test_node();
        assert_eq!(node.next_ordinal(NodeFamily::Network), 0);
        assert_eq!(node.next_ordinal(NodeFamily::Network), 1);
        assert_eq!(node.next_ordinal(NodeFamily::Interface), 0);
    }

    #[test]
    fn test_state_dict_keeps_persisted_non_empty_fields_only() {
        let node = test_node();
        node.set("name", AttrValue::Str("vm1".into()));
        node.set("uuid", AttrValue::Str("abc-123".into()));

        let dict = node.state_dict();
        assert!(dict.contains_key(serde_yaml::Value::String("uuid".into())));
        // Not flagged for persistence.
        assert!(!dict.contains_key(serde_yaml::Value::String("name".into())));

        // Cleared uuid drops out of the dictionary entirely.
        node.set("uuid", AttrValue::Str(String::new()));
        assert!(node.state_dict().is_empty());
    }
}
