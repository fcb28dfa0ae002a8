use crate::model::{ContextTree, Node, PathIdentity};
use std::collections::HashSet;
use tracing::debug;

/// Last published context tree plus the focused (innermost) symbol.
///
/// Holds at most one node per path. Only the sync controller mutates it.
#[derive(Debug, Default)]
pub struct ContextTreeCache {
    tree: ContextTree,
    focused: Option<Node>,
}

impl ContextTreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly resolved tree. Repeated paths keep their first
    /// occurrence; the deepest symbol node becomes the focused symbol.
    pub fn replace(&mut self, tree: ContextTree) {
        let mut seen = HashSet::with_capacity(tree.len());
        let before = tree.len();
        let tree: ContextTree = tree
            .into_iter()
            .filter(|node| seen.insert(node.path.clone()))
            .collect();
        if tree.len() != before {
            debug!("dropped {} duplicate nodes from context tree", before - tree.len());
        }
        self.focused = tree
            .iter()
            .rev()
            .find(|node| node.item_type.is_symbol() || node.path.is_symbol())
            .cloned();
        self.tree = tree;
    }

    /// Update the description of every node at `path`. Returns how many tree
    /// nodes changed.
    pub fn patch_description(&mut self, path: &PathIdentity, description: &str) -> usize {
        let mut patched = 0;
        for node in self.tree.iter_mut().filter(|node| &node.path == path) {
            node.description = description.to_string();
            patched += 1;
        }
        if let Some(focused) = self.focused.as_mut().filter(|node| &node.path == path) {
            focused.description = description.to_string();
        }
        patched
    }

    pub fn snapshot(&self) -> ContextTree {
        self.tree.clone()
    }

    pub fn focused(&self) -> Option<&Node> {
        self.focused.as_ref()
    }

    pub fn get(&self, path: &PathIdentity) -> Option<&Node> {
        self.tree.iter().find(|node| &node.path == path)
    }

    pub fn contains(&self, path: &PathIdentity) -> bool {
        self.get(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.focused = None;
    }
}
