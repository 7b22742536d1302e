//! The host evaluation graph.
//!
//! A slotmap arena of [`GraphNode`]s with parent/child links, plus the
//! operations the sync engine delegates to the host: node creation and
//! recursive destruction, string attribute round-trips, dependency
//! dirty propagation, and node↔path resolution.

use slotmap::SlotMap;

use crate::graph::node::{GraphNode, NativeNode};

/// Host-graph collaborator owning the native node hierarchy.
#[derive(Default)]
pub struct HostGraph {
    nodes: SlotMap<NativeNode, GraphNode>,
    root_nodes: Vec<NativeNode>,
    dirty_propagations: u64,
}

impl HostGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node, attaching it under `parent` when given and to
    /// the graph root otherwise.
    pub fn create_node(&mut self, name: &str, parent: Option<NativeNode>) -> NativeNode {
        let mut node = GraphNode::new(name);
        node.parent = parent;
        let id = self.nodes.insert(node);
        match parent {
            Some(p) if self.nodes.contains_key(p) => self.nodes[p].children.push(id),
            Some(_) => {
                log::error!("create_node: parent handle is dead, attaching {name:?} at root");
                self.nodes[id].parent = None;
                self.root_nodes.push(id);
            }
            None => self.root_nodes.push(id),
        }
        id
    }

    /// Destroys a node and its entire subtree.
    pub fn destroy_node(&mut self, id: NativeNode) {
        let children = match self.nodes.get(id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.destroy_node(child);
        }

        let parent = self.nodes.get(id).and_then(GraphNode::parent);
        if let Some(parent_id) = parent {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                if let Some(pos) = parent.children.iter().position(|&c| c == id) {
                    parent.children.remove(pos);
                }
            }
        } else if let Some(pos) = self.root_nodes.iter().position(|&c| c == id) {
            self.root_nodes.remove(pos);
        }

        self.nodes.remove(id);
    }

    /// Read-only node access.
    #[must_use]
    pub fn get(&self, id: NativeNode) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// True while the handle resolves to a live node.
    #[must_use]
    pub fn contains(&self, id: NativeNode) -> bool {
        self.nodes.contains_key(id)
    }

    /// Root node handles.
    #[must_use]
    pub fn root_nodes(&self) -> &[NativeNode] {
        &self.root_nodes
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Writes a string attribute on a node.
    pub fn write_attr(&mut self, id: NativeNode, key: &str, value: String) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.attributes.insert(key.to_string(), value);
        } else {
            log::error!("write_attr: dead node handle for attribute {key:?}");
        }
    }

    /// Reads a string attribute from a node.
    #[must_use]
    pub fn read_attr(&self, id: NativeNode, key: &str) -> Option<&str> {
        self.nodes
            .get(id)
            .and_then(|node| node.attributes.get(key))
            .map(String::as_str)
    }

    /// Takes a string attribute, clearing the stored value. Used by
    /// the restore path so consumed fields never accumulate.
    pub fn take_attr(&mut self, id: NativeNode, key: &str) -> Option<String> {
        self.nodes.get_mut(id).and_then(|node| node.attributes.remove(key))
    }

    // ========================================================================
    // Dirty propagation & path resolution
    // ========================================================================

    /// Propagates dependency dirt downstream of a node. The model
    /// here only counts propagations; the real host walks its
    /// dependency network.
    pub fn propagate_dirty(&mut self, id: NativeNode) {
        if self.nodes.contains_key(id) {
            self.dirty_propagations += 1;
            log::trace!("propagate_dirty: {id:?}");
        }
    }

    /// Number of dirty propagations performed so far.
    #[must_use]
    pub fn dirty_propagations(&self) -> u64 {
        self.dirty_propagations
    }

    /// Resolves a node to its absolute slash-delimited graph path.
    #[must_use]
    pub fn node_path(&self, id: NativeNode) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.nodes.get(c)?;
            segments.push(node.name.clone());
            current = node.parent;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    /// Resolves an absolute graph path back to a node handle.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<NativeNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = *self
            .root_nodes
            .iter()
            .find(|&&r| self.nodes[r].name == first)?;
        for segment in segments {
            current = *self.nodes[current]
                .children
                .iter()
                .find(|&&c| self.nodes[c].name == segment)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_removes_subtree() {
        let mut graph = HostGraph::new();
        let root = graph.create_node("root", None);
        let child = graph.create_node("child", Some(root));
        let grandchild = graph.create_node("leaf", Some(child));

        graph.destroy_node(child);
        assert!(graph.contains(root));
        assert!(!graph.contains(child));
        assert!(!graph.contains(grandchild));
        assert!(graph.get(root).unwrap().children().is_empty());
    }

    #[test]
    fn paths_round_trip() {
        let mut graph = HostGraph::new();
        let root = graph.create_node("root", None);
        let child = graph.create_node("child", Some(root));

        let path = graph.node_path(child).unwrap();
        assert_eq!(path, "/root/child");
        assert_eq!(graph.find_by_path(&path), Some(child));
        assert_eq!(graph.find_by_path("/root/missing"), None);
    }

    #[test]
    fn take_attr_clears_the_value() {
        let mut graph = HostGraph::new();
        let node = graph.create_node("n", None);
        graph.write_attr(node, "payload", "abc".to_string());

        assert_eq!(graph.read_attr(node, "payload"), Some("abc"));
        assert_eq!(graph.take_attr(node, "payload"), Some("abc".to_string()));
        assert_eq!(graph.read_attr(node, "payload"), None);
    }
}
