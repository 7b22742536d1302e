//! Native graph nodes.

use rustc_hash::FxHashMap;
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a node in the host graph. Opaque, comparable, and
    /// generational — a destroyed node's handle never resolves again.
    pub struct NativeNode;
}

/// A node in the host evaluation graph.
///
/// Only the data the sync engine needs is modeled: hierarchy links, a
/// name, and the string-valued attribute storage the persisted blobs
/// round-trip through.
#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    /// Node name; path segment within the graph.
    pub name: String,
    /// Parent node handle (None for root nodes).
    pub(crate) parent: Option<NativeNode>,
    /// Child node handles.
    pub(crate) children: Vec<NativeNode>,
    /// String-valued attributes, keyed by attribute name.
    pub(crate) attributes: FxHashMap<String, String>,
}

impl GraphNode {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            attributes: FxHashMap::default(),
        }
    }

    /// Returns the parent node handle, if any.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NativeNode> {
        self.parent
    }

    /// Returns a read-only slice of child node handles.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NativeNode] {
        &self.children
    }
}
