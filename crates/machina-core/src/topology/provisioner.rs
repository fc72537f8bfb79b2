//! Provisioner spec nodes.
//!
//! A provisioner node describes what to run inside a machine; the matching
//! plugin class (see [`crate::provision`]) decides how to run it.

use crate::topology::attr::{AttrDefault, AttrDescriptor, AttrKind};
use crate::topology::node::{BASE_CLASS, BASE_NAME, BASE_UUID};

/// Attribute schema for provisioner nodes.
///
/// Exactly one of `inline` (a script body) or `path` (a local script file)
/// is expected; the shell plugin rejects specs carrying neither.
pub const SCHEMA: &[AttrDescriptor] = &[
    BASE_NAME,
    BASE_CLASS,
    BASE_UUID,
    AttrDescriptor::new("inline", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("path", AttrKind::Str).with_default(AttrDefault::Str("")),
];
