//! Protocol operations for store package resolution.
//!
//! Each operation is an inherent async method on
//! [`StoreClient`](crate::client::StoreClient) taking primitive parameters
//! plus a cancellation token, mirroring the protocol steps:
//!
//! - [`cookie`] - anonymous device-identity cookie handshake
//! - [`appinfo`] - product catalog lookup (display info + WU category id)
//! - [`filelist`] - WU file-list SOAP retrieval
//! - [`appx`] - file/fragment correlation and secured URL resolution
//! - [`nonappx`] - package-manifest lookup for EXE/MSI/MSIX installers
//!
//! All WU response handling matches elements and attributes by local name
//! only; the upstream service is inconsistent about namespace prefixes.

pub mod appinfo;
pub mod appx;
pub mod cookie;
pub mod filelist;
pub mod nonappx;

use roxmltree::Node;

/// Finds the first descendant element with the given local name, in
/// document order (the scope node itself is not considered).
pub(crate) fn descendant_named<'a, 'input>(
    scope: Node<'a, 'input>,
    name: &str,
) -> Option<Node<'a, 'input>> {
    scope
        .descendants()
        .filter(|node| node.id() != scope.id())
        .find(|node| node.is_element() && node.tag_name().name() == name)
}

/// Reads an attribute by local name, ignoring any namespace prefix.
pub(crate) fn attr_named<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == name)
        .map(|attr| attr.value())
}
