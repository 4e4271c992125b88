use alloc::vec::Vec;
use core::fmt;

use crate::raw::{Handle, Node, RawBPlusTree};

/// Kind of node in a [`TreeDump`] entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Internal,
    Leaf,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Internal => f.write_str("Internal"),
            NodeKind::Leaf => f.write_str("Leaf"),
        }
    }
}

/// One node of a [`TreeDump`]: its depth below the root, its kind and its keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDump<'a, K> {
    pub level: usize,
    pub kind: NodeKind,
    pub keys: &'a [K],
}

/// A pre-order listing of every node in a [`BPlusTree`](crate::BPlusTree).
///
/// The `Display` impl renders one node per line, indented two spaces per
/// level:
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut tree = BPlusTree::new(4).unwrap();
/// for k in [10, 20, 5, 6] {
///     tree.insert(k, ());
/// }
/// assert_eq!(
///     tree.dump().to_string(),
///     "Internal: [10]\n  Leaf: [5, 6]\n  Leaf: [10, 20]\n",
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeDump<'a, K> {
    nodes: Vec<NodeDump<'a, K>>,
}

impl<'a, K> TreeDump<'a, K> {
    pub(crate) fn new<V>(tree: &'a RawBPlusTree<K, V>) -> Self {
        let mut nodes = Vec::with_capacity(tree.node_count());
        if let Some(root) = tree.root() {
            // Explicit stack; children are pushed in reverse to keep pre-order.
            let mut stack: Vec<(Handle, usize)> = alloc::vec![(root, 0)];
            while let Some((handle, level)) = stack.pop() {
                match tree.node(handle) {
                    Node::Internal(internal) => {
                        nodes.push(NodeDump {
                            level,
                            kind: NodeKind::Internal,
                            keys: internal.keys(),
                        });
                        stack.extend(internal.children().iter().rev().map(|&child| (child, level + 1)));
                    }
                    Node::Leaf(leaf) => nodes.push(NodeDump {
                        level,
                        kind: NodeKind::Leaf,
                        keys: leaf.keys(),
                    }),
                }
            }
        }
        TreeDump { nodes }
    }

    /// The dumped nodes in pre-order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeDump<'a, K>] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, NodeDump<'a, K>> {
        self.nodes.iter()
    }
}

impl<'a, 'd, K> IntoIterator for &'d TreeDump<'a, K> {
    type Item = &'d NodeDump<'a, K>;
    type IntoIter = core::slice::Iter<'d, NodeDump<'a, K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl<K: fmt::Debug> fmt::Display for NodeDump<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{}: {:?}", "", self.kind, self.keys, indent = self.level * 2)
    }
}

impl<K: fmt::Debug> fmt::Display for TreeDump<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}
