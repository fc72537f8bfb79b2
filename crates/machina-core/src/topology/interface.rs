//! Interface nodes.

use crate::topology::attr::{AttrDefault, AttrDescriptor, AttrKind};
use crate::topology::node::{BASE_CLASS, BASE_NAME, BASE_UUID, NodeRef};

/// Attribute schema for interface nodes.
///
/// `network` names a topology-level network; `ip` is either `dhcp` or a
/// static address.
pub const SCHEMA: &[AttrDescriptor] = &[
    BASE_NAME,
    BASE_CLASS,
    BASE_UUID,
    AttrDescriptor::new("network", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("ip", AttrKind::Str).with_default(AttrDefault::Str("dhcp")),
    AttrDescriptor::new("mac", AttrKind::Str).with_default(AttrDefault::Str("")),
];

/// Guest device name for the interface, `ethN` when unnamed.
#[must_use]
pub fn device_name(iface: &NodeRef, ordinal: i64) -> String {
    let name = iface.name();
    if name.is_empty() {
        format!("eth{ordinal}")
    } else {
        name
    }
}

/// True when the interface acquires its address over DHCP.
#[must_use]
pub fn uses_dhcp(iface: &NodeRef) -> bool {
    iface.get_str("ip").as_deref() == Some("dhcp")
}
