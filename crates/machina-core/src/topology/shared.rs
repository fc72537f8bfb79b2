//! Shared folder nodes.

use crate::error::{CoreError, Result};
use crate::topology::attr::{AttrDefault, AttrDescriptor, AttrKind};
use crate::topology::node::{BASE_CLASS, BASE_NAME, BASE_UUID, NodeRef};

/// Attribute schema for shared folder nodes.
pub const SCHEMA: &[AttrDescriptor] = &[
    BASE_NAME,
    BASE_CLASS,
    BASE_UUID,
    AttrDescriptor::new("local", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("remote", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("writable", AttrKind::Bool).with_default(AttrDefault::Bool(true)),
    AttrDescriptor::new("automount", AttrKind::Bool).with_default(AttrDefault::Bool(true)),
];

/// Checks that both endpoints of the share are declared.
///
/// # Errors
///
/// Returns a `Configuration` error when `local` or `remote` is empty.
pub fn validate(node: &NodeRef) -> Result<()> {
    let local = node.get_str("local").unwrap_or_default();
    let remote = node.get_str("remote").unwrap_or_default();
    if local.is_empty() || remote.is_empty() {
        return Err(CoreError::configuration(format!(
            "shared folder \"{}\" needs both local and remote paths",
            node.name()
        )));
    }
    Ok(())
}

/// Mount options for the guest side.
#[must_use]
pub fn mount_options(node: &NodeRef) -> &'static str {
    if node.get_bool("writable") == Some(true) {
        "rw"
    } else {
        "ro"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::attr::AttrValue;
    use crate::topology::node::{Node, NodeFamily};

    fn test_folder() -> NodeRef {
        let node = Node::new(NodeFamily::SharedFolder, SCHEMA);
        node.set("name", AttrValue::Str("src".into()));
        node
    }

    #[test]
    fn test_validate_requires_both_paths() {
        let folder = test_folder();
        assert!(validate(&folder).is_err());

        folder.set("local", AttrValue::Str("/home/dev/src".into()));
        assert!(validate(&folder).is_err());

        folder.set("remote", AttrValue::Str("/mnt/src".into()));
        validate(&folder).unwrap();
    }

    #[test]
    fn test_mount_options_follow_writable() {
        let folder = test_folder();
        assert_eq!(mount_options(&folder), "rw");

        folder.set("writable", AttrValue::Bool(false));
        assert_eq!(mount_options(&folder), "ro");
    }
}
