//! Network nodes.
//!
//! Address fields may carry a `{num}` placeholder that is substituted with
//! the network's ordinal within the topology, so a default network template
//! declared once in the global section yields distinct subnets per network.

use crate::error::{CoreError, Result};
use crate::topology::attr::{AttrDefault, AttrDescriptor, AttrKind, AttrValue};
use crate::topology::node::{BASE_CLASS, BASE_NAME, BASE_UUID, NodeRef};

/// NAT scope: guests reach out, nothing reaches in.
pub const SCOPE_NAT: &str = "nat";
/// Host-only scope.
pub const SCOPE_PRIVATE: &str = "private";

/// Attribute schema for network nodes.
pub const SCHEMA: &[AttrDescriptor] = &[
    BASE_NAME,
    BASE_CLASS,
    BASE_UUID,
    AttrDescriptor::new("scope", AttrKind::Str).with_default(AttrDefault::Str(SCOPE_PRIVATE)),
    AttrDescriptor::new("netmask", AttrKind::Str).with_default(AttrDefault::Str("255.255.255.0")),
    AttrDescriptor::new("ip", AttrKind::Str).with_default(AttrDefault::Str("192.168.{num}.1")),
    AttrDescriptor::new("dhcp", AttrKind::Bool).with_default(AttrDefault::Bool(true)),
    AttrDescriptor::new("dhcp_start", AttrKind::Str)
        .with_default(AttrDefault::Str("192.168.{num}.100")),
    AttrDescriptor::new("dhcp_end", AttrKind::Str)
        .with_default(AttrDefault::Str("192.168.{num}.200")),
];

/// Address-template fields subject to `{num}` substitution.
const TEMPLATE_FIELDS: [&str; 3] = ["ip", "dhcp_start", "dhcp_end"];

/// Checks the declared scope.
///
/// # Errors
///
/// Returns a `Configuration` error for a scope outside `nat`/`private`.
pub fn validate(node: &NodeRef) -> Result<()> {
    let scope = node.get_str("scope").unwrap_or_default();
    if scope != SCOPE_NAT && scope != SCOPE_PRIVATE {
        return Err(CoreError::configuration(format!(
            "network \"{}\" has invalid scope \"{scope}\" (expected \"{SCOPE_NAT}\" or \"{SCOPE_PRIVATE}\")",
            node.name()
        )));
    }
    Ok(())
}

/// Substitutes `{num}` in the address-template fields with `ordinal`.
///
/// Fields without the placeholder are left untouched.
pub fn expand_ordinal(node: &NodeRef, ordinal: i64) {
    for field in TEMPLATE_FIELDS {
        let Some(value) = node.get_str(field) else {
            continue;
        };
        if value.contains("{num}") {
            let expanded = value.replace("{num}", &ordinal.to_string());
            node.set(field, AttrValue::Str(expanded));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::node::{Node, NodeFamily};

    fn test_network(name: &str) -> NodeRef {
        let node = Node::new(NodeFamily::Network, SCHEMA);
        node.set("name", AttrValue::Str(name.into()));
        node
    }

    #[test]
    fn test_default_scope_is_private() {
        let net = test_network("lan0");
        assert_eq!(net.get_str("scope").as_deref(), Some(SCOPE_PRIVATE));
        validate(&net).unwrap();
    }

    #[test]
    fn test_invalid_scope_is_rejected() {
        let net = test_network("lan0");
        net.set("scope", AttrValue::Str("public".into()));
        let err = validate(&net).unwrap_err();
        assert!(err.to_string().contains("public"));
    }

    #[test]
    fn test_ordinal_substitution() {
        let net = test_network("lan0");
        expand_ordinal(&net, 3);

        assert_eq!(net.get_str("ip").as_deref(), Some("192.168.3.1"));
        assert_eq!(net.get_str("dhcp_start").as_deref(), Some("192.168.3.100"));
        assert_eq!(net.get_str("dhcp_end").as_deref(), Some("192.168.3.200"));
    }

    #[test]
    fn test_explicit_address_is_untouched() {
        let net = test_network("lan0");
        net.set("ip", AttrValue::Str("10.1.2.1".into()));
        expand_ordinal(&net, 7);
        assert_eq!(net.get_str("ip").as_deref(), Some("10.1.2.1"));
    }
}
