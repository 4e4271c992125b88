use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use super::handle::Handle;
use super::node::Node;
use super::raw_bplus_tree::RawBPlusTree;
use crate::error::{Error, Result};

/// Walk state shared by the recursive structure check.
struct Audit<'a, K> {
    leaves: Vec<Handle>,
    in_order: Vec<&'a K>,
    visited: usize,
    errors: Vec<String>,
}

impl<K: Clone + Ord, V> RawBPlusTree<K, V> {
    /// Audits every structural invariant and reports all violations at once.
    pub(crate) fn check_invariants(&self) -> Result<()> {
        let mut audit = Audit {
            leaves: Vec::new(),
            in_order: Vec::new(),
            visited: 0,
            errors: Vec::new(),
        };

        match self.root() {
            None => {
                if self.len() != 0 || self.height() != 0 || self.node_count() != 0 {
                    audit.errors.push(format!(
                        "rootless tree reports len={}, height={}, nodes={}",
                        self.len(),
                        self.height(),
                        self.node_count()
                    ));
                }
            }
            Some(root) => {
                if let Some(node) = self.try_node(root)
                    && node.parent().is_some()
                {
                    audit.errors.push(format!("root {root} has a parent link"));
                }
                self.audit_node(root, None, 1, None, None, &mut audit);
                self.audit_chain(&mut audit);

                if audit.in_order.len() != self.len() {
                    audit.errors.push(format!("len is {} but the tree holds {} keys", self.len(), audit.in_order.len()));
                }
                if audit.visited != self.node_count() {
                    audit.errors.push(format!(
                        "{} nodes reachable from the root but {} allocated",
                        audit.visited,
                        self.node_count()
                    ));
                }
            }
        }

        if audit.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::StructuralViolation(audit.errors.join("\n")))
        }
    }

    /// Walks the leaf chain from the leftmost leaf and checks it against an
    /// in-order walk of the tree. Returns the chained keys.
    pub(crate) fn verify_chain(&self) -> Result<Vec<&K>> {
        let mut in_order = Vec::with_capacity(self.len());
        if let Some(root) = self.root() {
            self.collect_in_order(root, &mut in_order);
        }

        let mut chained: Vec<&K> = Vec::with_capacity(self.len());
        let mut current = self.first_leaf();
        let mut hops = 0;
        while let Some(handle) = current {
            hops += 1;
            if hops > self.node_count() {
                return Err(Error::StructuralViolation(format!("leaf chain is cyclic near {handle}")));
            }
            let leaf = self.node(handle).as_leaf();
            chained.extend(leaf.keys());
            current = leaf.next();
        }

        if let Some(i) = chained.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(Error::StructuralViolation(format!("leaf chain is not strictly increasing at position {i}")));
        }
        if chained != in_order {
            return Err(Error::StructuralViolation(format!(
                "leaf chain holds {} keys, in-order walk holds {}, or their contents differ",
                chained.len(),
                in_order.len()
            )));
        }
        Ok(chained)
    }

    fn collect_in_order<'a>(&'a self, handle: Handle, out: &mut Vec<&'a K>) {
        match self.node(handle) {
            Node::Leaf(leaf) => out.extend(leaf.keys()),
            Node::Internal(internal) => {
                for &child in internal.children() {
                    self.collect_in_order(child, out);
                }
            }
        }
    }

    /// Checks one subtree whose keys must lie in `[lower, upper)`.
    fn audit_node<'a>(
        &'a self,
        handle: Handle,
        parent: Option<Handle>,
        depth: usize,
        lower: Option<&'a K>,
        upper: Option<&'a K>,
        audit: &mut Audit<'a, K>,
    ) {
        let Some(node) = self.try_node(handle) else {
            audit.errors.push(format!("dangling handle {handle}"));
            return;
        };
        audit.visited += 1;

        let config = self.config();
        let keys = node.keys();
        let is_root = parent.is_none();

        if node.parent() != parent {
            audit.errors.push(format!("node {handle} links to parent {:?}, expected {:?}", node.parent(), parent));
        }
        if keys.len() > config.max_keys() {
            audit.errors.push(format!("node {handle} holds {} keys, max is {}", keys.len(), config.max_keys()));
        }
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            audit.errors.push(format!("keys of node {handle} are not strictly increasing"));
        }
        if let Some(lower) = lower
            && keys.first().is_some_and(|first| first < lower)
        {
            audit.errors.push(format!("node {handle} holds a key below its separator range"));
        }
        if let Some(upper) = upper
            && keys.last().is_some_and(|last| last >= upper)
        {
            audit.errors.push(format!("node {handle} holds a key at or above its separator range"));
        }

        // Leaves split sparsely may sit below the leaf minimum.
        let relaxed = node.is_leaf() && self.has_sparse_splits();
        if !is_root && !relaxed && keys.len() < node.min_keys(config) {
            audit.errors.push(format!(
                "non-root node {handle} holds {} keys, min is {}",
                keys.len(),
                node.min_keys(config)
            ));
        }

        match node {
            Node::Leaf(leaf) => {
                if depth != self.height() {
                    audit.errors.push(format!("leaf {handle} at depth {depth}, tree height is {}", self.height()));
                }
                audit.leaves.push(handle);
                audit.in_order.extend(leaf.keys());
            }
            Node::Internal(internal) => {
                if internal.child_count() != internal.key_count() + 1 {
                    audit.errors.push(format!(
                        "internal node {handle} has {} keys and {} children",
                        internal.key_count(),
                        internal.child_count()
                    ));
                    return;
                }
                if is_root && internal.key_count() == 0 {
                    audit.errors.push(format!("internal root {handle} has no keys"));
                }
                for (i, &child) in internal.children().iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(internal.key(i - 1)) };
                    let child_upper = if i == internal.key_count() { upper } else { Some(internal.key(i)) };
                    self.audit_node(child, Some(handle), depth + 1, child_lower, child_upper, audit);
                }
            }
        }
    }

    /// The chain from the leftmost leaf must visit exactly the leaves found by
    /// the tree walk, in the same order.
    fn audit_chain(&self, audit: &mut Audit<'_, K>) {
        let mut current = self.first_leaf();
        let mut position = 0;
        while let Some(handle) = current {
            if audit.leaves.get(position) != Some(&handle) {
                audit.errors.push(format!(
                    "leaf chain visits {handle} at position {position}, tree walk expects {:?}",
                    audit.leaves.get(position)
                ));
                return;
            }
            position += 1;
            current = match self.try_node(handle) {
                Some(Node::Leaf(leaf)) => leaf.next(),
                _ => None,
            };
        }
        if position != audit.leaves.len() {
            audit.errors.push(format!("leaf chain ends after {position} of {} leaves", audit.leaves.len()));
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::config::{SplitPolicy, TreeConfig};
    use crate::error::Error;
    use crate::raw::RawBPlusTree;
    use alloc::vec::Vec;

    fn filled(order: usize, keys: impl IntoIterator<Item = i32>) -> RawBPlusTree<i32, ()> {
        let mut tree = RawBPlusTree::new(TreeConfig::new(order).unwrap());
        for k in keys {
            tree.insert(k, (), SplitPolicy::Dense);
        }
        tree
    }

    #[test]
    fn empty_tree_is_valid() {
        let tree = filled(4, []);
        assert_eq!(tree.check_invariants(), Ok(()));
        assert!(tree.verify_chain().unwrap().is_empty());
    }

    #[test]
    fn chain_matches_in_order_walk() {
        let tree = filled(5, (0..100).rev());
        let chained: Vec<i32> = tree.verify_chain().unwrap().into_iter().copied().collect();
        assert_eq!(chained, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn broken_chain_is_reported() {
        let mut tree = filled(4, 0..20);
        let first = tree.first_leaf().unwrap();
        tree.node_mut(first).as_leaf_mut().set_next(None);

        assert!(matches!(tree.check_invariants(), Err(Error::StructuralViolation(_))));
        assert!(matches!(tree.verify_chain(), Err(Error::StructuralViolation(_))));
    }
}
