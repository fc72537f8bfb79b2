//! Box (machine template) nodes.

use crate::topology::attr::{AttrDefault, AttrDescriptor, AttrKind};
use crate::topology::node::{BASE_CLASS, BASE_NAME, BASE_UUID, NodeRef};

/// Attribute schema for box nodes.
///
/// `missing` starts true and is flipped once box storage confirms the
/// archive is available locally.
pub const SCHEMA: &[AttrDescriptor] = &[
    BASE_NAME,
    BASE_CLASS,
    BASE_UUID,
    AttrDescriptor::new("url", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("path", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("missing", AttrKind::Bool).with_default(AttrDefault::Bool(true)),
];

/// True until the archive is known to be in local storage.
#[must_use]
pub fn is_missing(node: &NodeRef) -> bool {
    node.get_bool("missing") != Some(false)
}
