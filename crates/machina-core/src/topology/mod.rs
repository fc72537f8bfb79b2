//! The topology tree.
//!
//! A topology is a tree of typed nodes: one anonymous global node carrying
//! defaults, the machines parented to it, and per-machine children
//! (interfaces, shared folders, provisioners, a box). Attribute reads climb
//! the tree for inherited fields, so a value declared once in the `default`
//! section applies to every machine that does not override it.

pub mod attr;
pub mod box_node;
pub mod interface;
pub mod machine;
pub mod network;
pub mod node;
pub mod provisioner;
pub mod root;
pub mod shared;

pub use root::Topology;

use attr::AttrDescriptor;
use node::NodeFamily;

/// Provider-agnostic attribute schema for a node family.
///
/// Provider plugins may override per-family schemas to add recognized
/// fields; this is the baseline every built-in uses.
#[must_use]
pub fn schema_for(family: NodeFamily) -> &'static [AttrDescriptor] {
    match family {
        NodeFamily::Machine => machine::SCHEMA,
        NodeFamily::Network => network::SCHEMA,
        NodeFamily::Interface => interface::SCHEMA,
        NodeFamily::SharedFolder => shared::SCHEMA,
        NodeFamily::Provisioner => provisioner::SCHEMA,
        NodeFamily::Box => box_node::SCHEMA,
    }
}
