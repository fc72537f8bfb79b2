//! Attribute descriptors and the resolution algorithm.
//!
//! Every node type declares a static schema: the set of recognized fields,
//! how raw document values are constructed into typed values, a default, and
//! the inheritance mode. Two modes exist:
//!
//! - `Inherited`: absent fields store nothing locally; reads delegate to the
//!   parent chain, so later parent mutations stay visible.
//! - `Copy`: absent fields are snapshotted from the parent at construction
//!   time and are independent afterwards. `appending()` additionally
//!   concatenates locally declared entries after the copied parent list.

use crate::error::{CoreError, Result};
use crate::registry::Registry;
use crate::topology::node::{Node, NodeFamily, NodeRef};
use serde_yaml::{Mapping, Value};
use std::rc::Rc;

/// Inheritance mode for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    /// Reads fall through to the parent chain when no local value exists.
    Inherited,
    /// The parent value is deep-copied at construction time.
    Copy,
}

/// Value constructor selector for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// String scalar (numbers and booleans are coerced).
    Str,
    /// Integer scalar.
    Int,
    /// Boolean scalar.
    Bool,
    /// A single nested node of the given family.
    Node(NodeFamily),
    /// A list of nested nodes of the given family.
    NodeList(NodeFamily),
}

/// Static default for an attribute.
///
/// Defaults are materialized as a fresh value per node, never shared.
#[derive(Debug, Clone, Copy)]
pub enum AttrDefault {
    /// String default.
    Str(&'static str),
    /// Integer default.
    Int(i64),
    /// Boolean default.
    Bool(bool),
    /// Empty list default.
    EmptyList,
}

impl AttrDefault {
    pub(crate) fn materialize(self) -> AttrValue {
        match self {
            Self::Str(s) => AttrValue::Str(s.to_string()),
            Self::Int(i) => AttrValue::Int(i),
            Self::Bool(b) => AttrValue::Bool(b),
            Self::EmptyList => AttrValue::List(Vec::new()),
        }
    }
}

/// Declaration of one recognized attribute on a node type.
#[derive(Debug, Clone, Copy)]
pub struct AttrDescriptor {
    /// Field name in the topology document.
    pub name: &'static str,
    /// Value constructor.
    pub kind: AttrKind,
    /// Inheritance mode.
    pub mode: AttrMode,
    /// Concatenate local entries after the copied parent list.
    pub append_to_parent: bool,
    /// Include in the persisted state dictionary.
    pub persist: bool,
    /// Default when neither the document nor the parent supplies a value.
    pub default: Option<AttrDefault>,
}

impl AttrDescriptor {
    /// Creates an inherited, non-persisted descriptor with no default.
    #[must_use]
    pub const fn new(name: &'static str, kind: AttrKind) -> Self {
        Self {
            name,
            kind,
            mode: AttrMode::Inherited,
            append_to_parent: false,
            persist: false,
            default: None,
        }
    }

    /// Switches the descriptor to copy mode.
    #[must_use]
    pub const fn copied(mut self) -> Self {
        self.mode = AttrMode::Copy;
        self
    }

    /// Concatenates local entries after the copied parent value.
    #[must_use]
    pub const fn appending(mut self) -> Self {
        self.append_to_parent = true;
        self
    }

    /// Marks the attribute as state-persisted.
    #[must_use]
    pub const fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Sets the attribute default.
    #[must_use]
    pub const fn with_default(mut self, default: AttrDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// A resolved attribute value.
///
/// Cloning is shallow for node values (the `Rc` is shared); deep copies are
/// explicit via [`deep_copy`].
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// String scalar.
    Str(String),
    /// Integer scalar.
    Int(i64),
    /// Boolean scalar.
    Bool(bool),
    /// Homogeneous list.
    List(Vec<AttrValue>),
    /// Nested node.
    Node(NodeRef),
}

impl AttrValue {
    /// Returns the string content, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the nested node, if this is a node value.
    #[must_use]
    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Collects nested nodes from a node or node-list value.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeRef> {
        match self {
            Self::Node(n) => vec![Rc::clone(n)],
            Self::List(items) => items
                .iter()
                .filter_map(|v| v.as_node().map(Rc::clone))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true for values the state dictionary would omit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// Looks up a key in a YAML mapping.
pub(crate) fn yaml_get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

/// Resolves all declared attributes of `node` from the raw document fields.
///
/// Implements the resolution order: copy-from-parent (with optional local
/// append), then local construction, then nothing. Absent fields store no
/// local value: reads delegate to the parent chain for inherited attributes
/// and fall back to the schema default, so a default on this node never
/// shadows an override declared on an ancestor.
///
/// # Errors
///
/// Returns a `Configuration` error for malformed raw values and propagates
/// registry failures when nested nodes name an unknown class.
pub fn resolve_all(node: &NodeRef, raw: &Mapping, registry: &Registry) -> Result<()> {
    for desc in node.schema() {
        let raw_value = yaml_get(raw, desc.name);

        if desc.mode == AttrMode::Copy {
            if let Some(parent) = node.parent() {
                // Parent's resolved value, falling softly to the default.
                let base = parent
                    .get(desc.name)
                    .or_else(|| desc.default.map(AttrDefault::materialize));
                let mut value = base.map(|v| deep_copy(&v, node));

                if desc.append_to_parent {
                    if let Some(rv) = raw_value {
                        let local = construct(rv, desc.kind, node, registry)?;
                        value = Some(concat(value, local));
                    }
                }

                if let Some(v) = value {
                    node.set(desc.name, v);
                }
                continue;
            }
        }

        if let Some(rv) = raw_value {
            let value = construct(rv, desc.kind, node, registry)?;
            node.set(desc.name, value);
        }
    }
    Ok(())
}

/// Constructs a typed value from a raw document value.
///
/// Constructors are recursive: lists construct once per element and mappings
/// with a node kind build a nested node whose container is `owner`.
fn construct(raw: &Value, kind: AttrKind, owner: &NodeRef, registry: &Registry) -> Result<AttrValue> {
    match kind {
        AttrKind::Str => scalar_str(raw),
        AttrKind::Int => scalar_int(raw),
        AttrKind::Bool => scalar_bool(raw),
        AttrKind::Node(family) => construct_node(raw, family, owner, registry),
        AttrKind::NodeList(family) => match raw {
            Value::Sequence(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    nodes.push(construct_node(item, family, owner, registry)?);
                }
                Ok(AttrValue::List(nodes))
            }
            // A single mapping is accepted as a one-element list.
            Value::Mapping(_) => Ok(AttrValue::List(vec![construct_node(
                raw, family, owner, registry,
            )?])),
            other => Err(CoreError::configuration(format!(
                "expected a list of {family} entries, got {}",
                type_name(other)
            ))),
        },
    }
}

fn construct_node(
    raw: &Value,
    family: NodeFamily,
    owner: &NodeRef,
    registry: &Registry,
) -> Result<AttrValue> {
    let map = raw.as_mapping().ok_or_else(|| {
        CoreError::configuration(format!(
            "a {family} entry must be a mapping, got {}",
            type_name(raw)
        ))
    })?;
    let child = registry.build_child(family, map, owner)?;
    Ok(AttrValue::Node(child))
}

fn scalar_str(raw: &Value) -> Result<AttrValue> {
    match raw {
        Value::String(s) => Ok(AttrValue::Str(s.clone())),
        Value::Number(n) => Ok(AttrValue::Str(n.to_string())),
        Value::Bool(b) => Ok(AttrValue::Str(b.to_string())),
        other => Err(CoreError::configuration(format!(
            "expected a string, got {}",
            type_name(other)
        ))),
    }
}

fn scalar_int(raw: &Value) -> Result<AttrValue> {
    match raw {
        Value::Number(n) => n.as_i64().map(AttrValue::Int).ok_or_else(|| {
            CoreError::configuration(format!("expected an integer, got {n}"))
        }),
        Value::String(s) => s
            .parse::<i64>()
            .map(AttrValue::Int)
            .map_err(|_| CoreError::configuration(format!("expected an integer, got \"{s}\""))),
        other => Err(CoreError::configuration(format!(
            "expected an integer, got {}",
            type_name(other)
        ))),
    }
}

fn scalar_bool(raw: &Value) -> Result<AttrValue> {
    match raw {
        Value::Bool(b) => Ok(AttrValue::Bool(*b)),
        Value::String(s) => match s.as_str() {
            "true" | "yes" | "on" => Ok(AttrValue::Bool(true)),
            "false" | "no" | "off" => Ok(AttrValue::Bool(false)),
            _ => Err(CoreError::configuration(format!(
                "expected a boolean, got \"{s}\""
            ))),
        },
        other => Err(CoreError::configuration(format!(
            "expected a boolean, got {}",
            type_name(other)
        ))),
    }
}

/// Deep-copies a value, re-pointing any nested nodes at `new_owner`.
///
/// Scalars are plain clones; node values are recursively duplicated so that
/// later mutation of the original is never observed through the copy.
pub fn deep_copy(value: &AttrValue, new_owner: &NodeRef) -> AttrValue {
    match value {
        AttrValue::Str(s) => AttrValue::Str(s.clone()),
        AttrValue::Int(i) => AttrValue::Int(*i),
        AttrValue::Bool(b) => AttrValue::Bool(*b),
        AttrValue::List(items) => {
            AttrValue::List(items.iter().map(|v| deep_copy(v, new_owner)).collect())
        }
        AttrValue::Node(n) => AttrValue::Node(deep_clone_node(n, new_owner)),
    }
}

fn deep_clone_node(node: &NodeRef, new_owner: &NodeRef) -> NodeRef {
    let clone = Node::new(node.family(), node.schema());
    clone.set_parent(Some(new_owner));
    clone.set_container(Some(new_owner));
    for (name, value) in node.local_attrs() {
        let copied = deep_copy(&value, &clone);
        clone.set(name, copied);
    }
    clone
}

fn concat(copied: Option<AttrValue>, local: AttrValue) -> AttrValue {
    let mut items = match copied {
        Some(AttrValue::List(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    };
    match local {
        AttrValue::List(mut extra) => items.append(&mut extra),
        single => items.push(single),
    }
    AttrValue::List(items)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_coercion() {
        let v = scalar_str(&Value::Number(8.into())).unwrap();
        assert_eq!(v.as_str(), Some("8"));

        let v = scalar_int(&Value::String("42".into())).unwrap();
        assert_eq!(v.as_int(), Some(42));

        let v = scalar_bool(&Value::String("yes".into())).unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn test_scalar_rejects_collections() {
        assert!(scalar_str(&Value::Sequence(vec![])).is_err());
        assert!(scalar_int(&Value::Mapping(Mapping::new())).is_err());
    }

    #[test]
    fn test_defaults_are_fresh_values() {
        let a = AttrDefault::EmptyList.materialize();
        let b = AttrDefault::EmptyList.materialize();
        match (a, b) {
            (AttrValue::List(a), AttrValue::List(b)) => {
                assert!(a.is_empty() && b.is_empty());
            }
            _ => panic!("expected lists"),
        }
    }
}
