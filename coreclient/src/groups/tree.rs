// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The ratchet tree: an array of leaf and parent slots in heap layout.
//! Blank slots carry no key material. Public keys are stored in the
//! uncompressed hex form they travel in.

use loomcommon::crypto::identity::IdentityPublicKey;
use serde::{Deserialize, Serialize};

use super::tree_math;

/// Occupied leaf: the member's position and current node public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafNode {
    pub index: u32,
    pub public_key: String,
}

/// One slot of the tree array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Node {
    Leaf {
        node: Option<LeafNode>,
    },
    Parent {
        public_key: Option<String>,
        unmerged_leaves: Vec<u32>,
    },
}

impl Node {
    fn blank_for(index: usize) -> Self {
        if tree_math::is_leaf(index) {
            Node::Leaf { node: None }
        } else {
            Node::Parent {
                public_key: None,
                unmerged_leaves: Vec::new(),
            }
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Node::Leaf { node } => node.is_none(),
            Node::Parent { public_key, .. } => public_key.is_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetTree {
    nodes: Vec<Node>,
}

impl RatchetTree {
    /// Tree with `n_leaves` blank leaves.
    pub fn new(n_leaves: usize) -> Self {
        let nodes = (0..tree_math::node_width(n_leaves))
            .map(Node::blank_for)
            .collect();
        Self { nodes }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.len().div_ceil(2)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Public key visible at a node, leaf or parent.
    pub fn public_key(&self, index: usize) -> Option<&str> {
        match self.nodes.get(index)? {
            Node::Leaf { node } => node.as_ref().map(|leaf| leaf.public_key.as_str()),
            Node::Parent { public_key, .. } => public_key.as_deref(),
        }
    }

    pub fn leaf(&self, position: usize) -> Option<&LeafNode> {
        match self.nodes.get(tree_math::leaf_index(position))? {
            Node::Leaf { node } => node.as_ref(),
            Node::Parent { .. } => None,
        }
    }

    pub fn set_leaf(&mut self, position: usize, public_key: &IdentityPublicKey) {
        let index = tree_math::leaf_index(position);
        if let Some(slot) = self.nodes.get_mut(index) {
            *slot = Node::Leaf {
                node: Some(LeafNode {
                    index: position as u32,
                    public_key: public_key.to_hex(),
                }),
            };
        }
    }

    pub fn blank_leaf(&mut self, position: usize) {
        let index = tree_math::leaf_index(position);
        if let Some(slot) = self.nodes.get_mut(index) {
            *slot = Node::Leaf { node: None };
        }
    }

    /// Marks a freshly added leaf as unmerged on a keyed parent, so the
    /// parent's resolution keeps covering it until the next key refresh.
    pub fn add_unmerged_leaf(&mut self, index: usize, leaf: u32) {
        if let Some(Node::Parent {
            public_key: Some(_),
            unmerged_leaves,
        }) = self.nodes.get_mut(index)
            && !unmerged_leaves.contains(&leaf)
        {
            unmerged_leaves.push(leaf);
        }
    }

    /// Drops a leaf from every unmerged list.
    pub fn remove_unmerged_leaf(&mut self, leaf: u32) {
        for node in &mut self.nodes {
            if let Node::Parent {
                unmerged_leaves, ..
            } = node
            {
                unmerged_leaves.retain(|unmerged| *unmerged != leaf);
            }
        }
    }

    /// Installs a parent public key, clearing the unmerged list.
    pub fn set_parent_key(&mut self, index: usize, public_key: String) {
        if let Some(slot) = self.nodes.get_mut(index) {
            *slot = Node::Parent {
                public_key: Some(public_key),
                unmerged_leaves: Vec::new(),
            };
        }
    }

    pub fn blank_node(&mut self, index: usize) {
        if let Some(slot) = self.nodes.get_mut(index) {
            *slot = Node::blank_for(index);
        }
    }

    pub fn is_blank(&self, index: usize) -> bool {
        self.nodes.get(index).is_none_or(Node::is_blank)
    }

    /// First blank leaf position, if any.
    pub fn first_blank_leaf(&self) -> Option<usize> {
        (0..self.n_leaves()).find(|position| self.leaf(*position).is_none())
    }

    /// Doubles the leaf capacity (next size class). Existing node indices
    /// are stable under left-balanced growth.
    pub fn extend(&mut self) {
        let new_leaves = (self.n_leaves() * 2).max(2);
        let new_width = tree_math::node_width(new_leaves);
        for index in self.nodes.len()..new_width {
            self.nodes.push(Node::blank_for(index));
        }
    }

    /// Smallest set of populated nodes covering the subtree below `index`:
    /// the node itself plus its unmerged leaves when populated, otherwise
    /// the union over its children. Blank leaves resolve to nothing.
    pub fn resolution(&self, index: usize) -> Vec<usize> {
        let Some(node) = self.nodes.get(index) else {
            return Vec::new();
        };
        match node {
            Node::Leaf { node } => {
                if node.is_some() {
                    vec![index]
                } else {
                    Vec::new()
                }
            }
            Node::Parent {
                public_key,
                unmerged_leaves,
            } => {
                if public_key.is_some() {
                    let mut out = vec![index];
                    out.extend(
                        unmerged_leaves
                            .iter()
                            .map(|leaf| tree_math::leaf_index(*leaf as usize)),
                    );
                    out
                } else {
                    let n = self.n_leaves();
                    let mut out = self.resolution(tree_math::left(index));
                    out.extend(self.resolution(tree_math::right(index, n)));
                    out
                }
            }
        }
    }

    /// Occupied leaf positions.
    pub fn occupied_leaves(&self) -> Vec<usize> {
        (0..self.n_leaves())
            .filter(|position| self.leaf(*position).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use loomcommon::crypto::identity::IdentityPrivateKey;

    use super::*;

    fn keys(n: usize) -> Vec<IdentityPublicKey> {
        (0..n)
            .map(|_| IdentityPrivateKey::generate().public_key())
            .collect()
    }

    #[test]
    fn new_tree_is_blank() {
        let tree = RatchetTree::new(3);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.n_leaves(), 3);
        assert!(tree.first_blank_leaf() == Some(0));
        assert!(tree.resolution(3).is_empty());
    }

    #[test]
    fn resolution_skips_blank_parents() {
        let keys = keys(3);
        let mut tree = RatchetTree::new(3);
        tree.set_leaf(0, &keys[0]);
        tree.set_leaf(2, &keys[2]);
        // Root is blank, so the resolution descends to populated nodes.
        assert_eq!(tree.resolution(3), vec![0, 4]);
        tree.set_parent_key(1, "aa".into());
        assert_eq!(tree.resolution(3), vec![1, 4]);
    }

    #[test]
    fn extend_preserves_existing_indices() {
        let keys = keys(2);
        let mut tree = RatchetTree::new(2);
        tree.set_leaf(0, &keys[0]);
        tree.set_leaf(1, &keys[1]);
        let leaf0 = tree.leaf(0).cloned();
        tree.extend();
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.leaf(0).cloned(), leaf0);
        assert_eq!(tree.first_blank_leaf(), Some(2));
    }

    #[test]
    fn blanking_leaves() {
        let keys = keys(2);
        let mut tree = RatchetTree::new(2);
        tree.set_leaf(0, &keys[0]);
        tree.set_leaf(1, &keys[1]);
        tree.blank_leaf(1);
        assert!(tree.leaf(1).is_none());
        assert_eq!(tree.occupied_leaves(), vec![0]);
    }
}
