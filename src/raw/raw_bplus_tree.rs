use core::borrow::Borrow;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, LeafNode, Node, SearchResult};
use crate::config::{SplitPolicy, TreeConfig};
use crate::tracing_helpers::{debug_log, trace_log};

/// The core B+Tree engine backing `BPlusTree`.
///
/// Every node records its parent's handle, so split propagation and underflow
/// recovery walk upward without re-searching from the root.
#[derive(Clone)]
pub(crate) struct RawBPlusTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Handle to the root node; `None` until the first insertion.
    root: Option<Handle>,
    /// Number of key-value pairs.
    len: usize,
    /// Number of levels; 0 without a root, 1 for a root leaf.
    height: usize,
    config: TreeConfig,
    /// Set once any leaf was split with [`SplitPolicy::Sparse`].
    sparse_splits: bool,
}

impl<K, V> RawBPlusTree<K, V> {
    pub(crate) const fn new(config: TreeConfig) -> Self {
        Self {
            nodes: Arena::new(),
            root: None,
            len: 0,
            height: 0,
            config,
            sparse_splits: false,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn height(&self) -> usize {
        self.height
    }

    pub(crate) const fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) const fn has_sparse_splits(&self) -> bool {
        self.sparse_splits
    }

    /// Number of live nodes, internal and leaf.
    pub(crate) const fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root(&self) -> Option<Handle> {
        self.root
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    #[cfg(test)]
    pub(crate) fn node_mut(&mut self, handle: Handle) -> &mut Node<K, V> {
        self.nodes.get_mut(handle)
    }

    /// Like [`RawBPlusTree::node`], but tolerates dangling handles.
    pub(crate) fn try_node(&self, handle: Handle) -> Option<&Node<K, V>> {
        self.nodes.try_get(handle)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
        self.height = 0;
        self.sparse_splits = false;
    }

    /// Leftmost leaf, reached by following first children from the root.
    pub(crate) fn first_leaf(&self) -> Option<Handle> {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(0),
                Node::Leaf(_) => return Some(current),
            }
        }
    }

    /// Rightmost leaf, reached by following last children from the root.
    pub(crate) fn last_leaf(&self) -> Option<Handle> {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.child_count() - 1),
                Node::Leaf(_) => return Some(current),
            }
        }
    }

    /// Re-points the parent link of every child of `handle` at `handle`.
    fn adopt_children(&mut self, handle: Handle) {
        let child_count = self.nodes.get(handle).as_internal().child_count();
        for index in 0..child_count {
            let child = self.nodes.get(handle).as_internal().child(index);
            self.nodes.get_mut(child).set_parent(Some(handle));
        }
    }
}

impl<K: Clone + Ord, V> RawBPlusTree<K, V> {
    /// Descends to the leaf whose key range contains `key`.
    pub(crate) fn locate_leaf<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.search_child(key)),
                Node::Leaf(_) => return Some(current),
            }
        }
    }

    /// Searches for a key and returns the leaf handle and index if found.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf_handle = self.locate_leaf(key)?;
        match self.nodes.get(leaf_handle).as_leaf().search(key) {
            SearchResult::Found(idx) => Some((leaf_handle, idx)),
            SearchResult::NotFound(_) => None,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, idx) = self.search(key)?;
        Some(self.nodes.get(leaf_handle).as_leaf().value(idx))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, idx) = self.search(key)?;
        Some(self.nodes.get_mut(leaf_handle).as_leaf_mut().value_mut(idx))
    }

    pub(crate) fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, idx) = self.search(key)?;
        let leaf = self.nodes.get(leaf_handle).as_leaf();
        Some((leaf.key(idx), leaf.value(idx)))
    }

    pub(crate) fn first_key_value(&self) -> Option<(&K, &V)> {
        let leaf = self.nodes.get(self.first_leaf()?).as_leaf();
        if leaf.key_count() == 0 {
            return None;
        }
        Some((leaf.key(0), leaf.value(0)))
    }

    pub(crate) fn last_key_value(&self) -> Option<(&K, &V)> {
        let leaf = self.nodes.get(self.last_leaf()?).as_leaf();
        let last = leaf.key_count().checked_sub(1)?;
        Some((leaf.key(last), leaf.value(last)))
    }

    /// Inserts a key-value pair, splitting the target leaf with `policy` if it
    /// fills up. Returns the old value if the key was already present.
    pub(crate) fn insert(&mut self, key: K, value: V, policy: SplitPolicy) -> Option<V> {
        let Some(leaf_handle) = self.locate_leaf(&key) else {
            let mut leaf = LeafNode::new();
            leaf.push_back(key, value);
            self.root = Some(self.nodes.alloc(Node::Leaf(leaf)));
            self.len = 1;
            self.height = 1;
            return None;
        };

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        match leaf.search(&key) {
            SearchResult::Found(idx) => Some(core::mem::replace(leaf.value_mut(idx), value)),
            SearchResult::NotFound(idx) => {
                leaf.insert(idx, key, value);
                self.len += 1;

                if self.nodes.get(leaf_handle).is_full(&self.config) {
                    self.split_leaf(leaf_handle, policy);
                }
                None
            }
        }
    }

    /// Splits a full leaf and links the new right sibling into the chain and
    /// into the parent.
    fn split_leaf(&mut self, leaf_handle: Handle, policy: SplitPolicy) {
        let order = self.config.order();
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let mid = policy.split_point(order, leaf.key_count());
        let right = leaf.split_at(mid);
        let separator = right.first_key().expect("`RawBPlusTree::split_leaf()` - empty right half!").clone();

        let right_handle = self.nodes.alloc(Node::Leaf(right));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));

        if policy == SplitPolicy::Sparse {
            self.sparse_splits = true;
        }
        trace_log!(?policy, mid, left = %leaf_handle, right = %right_handle, "leaf split");

        self.insert_in_parent(leaf_handle, separator, right_handle);
    }

    /// Splits a full internal node at the dense midpoint, promoting its median.
    fn split_internal(&mut self, handle: Handle) {
        let order = self.config.order();
        let node = self.nodes.get_mut(handle).as_internal_mut();
        let mid = SplitPolicy::Dense.split_point(order, node.key_count());
        let (median, right) = node.split_at(mid);

        let right_handle = self.nodes.alloc(Node::Internal(right));
        self.adopt_children(right_handle);
        trace_log!(mid, left = %handle, right = %right_handle, "internal split");

        self.insert_in_parent(handle, median, right_handle);
    }

    /// Hooks `right` into the tree next to its freshly split sibling `left`.
    fn insert_in_parent(&mut self, left: Handle, separator: K, right: Handle) {
        let Some(parent_handle) = self.nodes.get(left).parent() else {
            let root = self.nodes.alloc(Node::Internal(InternalNode::new_root(left, separator, right)));
            self.nodes.get_mut(left).set_parent(Some(root));
            self.nodes.get_mut(right).set_parent(Some(root));
            self.root = Some(root);
            self.height += 1;
            debug_log!(root = %root, height = self.height, "root split, tree grew");
            return;
        };

        let parent = self.nodes.get_mut(parent_handle).as_internal_mut();
        let idx = parent
            .child_index_of(left)
            .expect("`RawBPlusTree::insert_in_parent()` - split node missing from its parent!");
        parent.insert_child(idx, separator, right);

        if self.nodes.get(parent_handle).is_full(&self.config) {
            self.split_internal(parent_handle);
        }
    }

    /// Removes a key from the tree and returns the key-value pair.
    pub(crate) fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, idx) = self.search(key)?;
        let entry = self.nodes.get_mut(leaf_handle).as_leaf_mut().remove(idx);
        self.len -= 1;

        if self.nodes.get(leaf_handle).is_underflowing(&self.config) {
            self.rebalance(leaf_handle);
        }
        Some(entry)
    }

    /// Restores minimum occupancy of a non-root node by borrowing from a
    /// sibling, or merging with one when neither can lend.
    fn rebalance(&mut self, handle: Handle) {
        let Some(parent_handle) = self.nodes.get(handle).parent() else {
            return;
        };

        let parent = self.nodes.get(parent_handle).as_internal();
        let idx = parent
            .child_index_of(handle)
            .expect("`RawBPlusTree::rebalance()` - underflowing node missing from its parent!");
        let left = idx.checked_sub(1).map(|i| parent.child(i));
        let right = (idx + 1 < parent.child_count()).then(|| parent.child(idx + 1));

        if let Some(left) = left
            && self.nodes.get(left).can_lend(&self.config)
        {
            self.borrow_from_left(handle, left, parent_handle, idx);
            return;
        }

        if let Some(right) = right
            && self.nodes.get(right).can_lend(&self.config)
        {
            self.borrow_from_right(handle, right, parent_handle, idx);
            return;
        }

        match (left, right) {
            (Some(left), _) => self.merge(left, handle, parent_handle, idx - 1),
            (None, Some(right)) => self.merge(handle, right, parent_handle, idx),
            (None, None) => panic!("`RawBPlusTree::rebalance()` - non-root node {handle} has no siblings!"),
        }
    }

    /// Moves the last entry of `left` to the front of `handle`.
    fn borrow_from_left(&mut self, handle: Handle, left: Handle, parent_handle: Handle, idx: usize) {
        trace_log!(node = %handle, sibling = %left, "borrow from left");

        if self.nodes.get(handle).is_leaf() {
            let (key, value) = self.nodes.get_mut(left).as_leaf_mut().pop_back().expect("lender is empty");
            let separator = key.clone();
            self.nodes.get_mut(handle).as_leaf_mut().push_front(key, value);
            self.nodes.get_mut(parent_handle).as_internal_mut().replace_key(idx - 1, separator);
        } else {
            // Rotate through the parent: the left sibling's last key goes up,
            // the old separator comes down in front of the node.
            let (key, child) = self.nodes.get_mut(left).as_internal_mut().pop_back().expect("lender is empty");
            let separator = self.nodes.get_mut(parent_handle).as_internal_mut().replace_key(idx - 1, key);
            self.nodes.get_mut(handle).as_internal_mut().push_front(child, separator);
            self.nodes.get_mut(child).set_parent(Some(handle));
        }
    }

    /// Moves the first entry of `right` to the end of `handle`.
    fn borrow_from_right(&mut self, handle: Handle, right: Handle, parent_handle: Handle, idx: usize) {
        trace_log!(node = %handle, sibling = %right, "borrow from right");

        if self.nodes.get(handle).is_leaf() {
            let lender = self.nodes.get_mut(right).as_leaf_mut();
            let (key, value) = lender.pop_front().expect("lender is empty");
            let separator = lender.first_key().expect("lender left empty").clone();
            self.nodes.get_mut(handle).as_leaf_mut().push_back(key, value);
            self.nodes.get_mut(parent_handle).as_internal_mut().replace_key(idx, separator);
        } else {
            let (child, key) = self.nodes.get_mut(right).as_internal_mut().pop_front().expect("lender is empty");
            let separator = self.nodes.get_mut(parent_handle).as_internal_mut().replace_key(idx, key);
            self.nodes.get_mut(handle).as_internal_mut().push_back(separator, child);
            self.nodes.get_mut(child).set_parent(Some(handle));
        }
    }

    /// Absorbs `right` into its left neighbour `left`, removing the separator
    /// at `separator_idx` from the parent, then repairs the parent.
    fn merge(&mut self, left: Handle, right: Handle, parent_handle: Handle, separator_idx: usize) {
        let (separator, absorbed) = self.nodes.get_mut(parent_handle).as_internal_mut().remove_child(separator_idx);
        debug_assert_eq!(absorbed, right, "separator index does not match the absorbed sibling");

        match self.nodes.take(right) {
            Node::Leaf(right_leaf) => {
                self.nodes.get_mut(left).as_leaf_mut().merge_with_right(right_leaf);
            }
            Node::Internal(right_internal) => {
                self.nodes.get_mut(left).as_internal_mut().merge_with_right(separator, right_internal);
                self.adopt_children(left);
            }
        }
        trace_log!(into = %left, absorbed = %right, "merge");

        let parent = self.nodes.get(parent_handle);
        if parent.parent().is_none() {
            if parent.key_count() == 0 {
                self.collapse_root(parent_handle);
            }
        } else if parent.is_underflowing(&self.config) {
            self.rebalance(parent_handle);
        }
    }

    /// Replaces a key-less internal root by its only child.
    fn collapse_root(&mut self, root: Handle) {
        let child = self.nodes.get(root).as_internal().child(0);
        self.nodes.free(root);
        self.nodes.get_mut(child).set_parent(None);
        self.root = Some(child);
        self.height -= 1;
        debug_log!(root = %child, height = self.height, "root collapsed, tree shrank");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn tree(order: usize) -> RawBPlusTree<i32, i32> {
        RawBPlusTree::new(TreeConfig::new(order).unwrap())
    }

    fn leaf_keys(tree: &RawBPlusTree<i32, i32>) -> Vec<Vec<i32>> {
        let mut leaves = Vec::new();
        let mut current = tree.first_leaf();
        while let Some(handle) = current {
            let leaf = tree.node(handle).as_leaf();
            leaves.push(leaf.keys().to_vec());
            current = leaf.next();
        }
        leaves
    }

    fn root_keys(tree: &RawBPlusTree<i32, i32>) -> Vec<i32> {
        tree.node(tree.root().unwrap()).keys().to_vec()
    }

    #[test]
    fn first_insert_creates_root_leaf() {
        let mut tree = tree(4);
        assert_eq!(tree.root(), None);
        assert_eq!(tree.height(), 0);

        assert_eq!(tree.insert(1, 10, SplitPolicy::Dense), None);
        assert_eq!(tree.height(), 1);
        assert!(tree.node(tree.root().unwrap()).is_leaf());
        assert_eq!(tree.get(&1), Some(&10));
    }

    #[test]
    fn existing_key_replaces_value() {
        let mut tree = tree(4);
        tree.insert(1, 10, SplitPolicy::Dense);
        assert_eq!(tree.insert(1, 11, SplitPolicy::Dense), Some(10));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&1), Some(&11));
    }

    #[test]
    fn dense_leaf_split_copies_first_right_key_up() {
        let mut tree = tree(4);
        for k in [10, 20, 5, 6] {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        assert_eq!(tree.height(), 2);
        assert_eq!(root_keys(&tree), [10]);
        assert_eq!(leaf_keys(&tree), [alloc::vec![5, 6], alloc::vec![10, 20]]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn sparse_leaf_split_moves_one_key() {
        let mut tree = tree(4);
        for k in 1..=4 {
            tree.insert(k, k, SplitPolicy::Sparse);
        }
        assert!(tree.has_sparse_splits());
        assert_eq!(root_keys(&tree), [4]);
        assert_eq!(leaf_keys(&tree), [alloc::vec![1, 2, 3], alloc::vec![4]]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn internal_split_promotes_median_without_duplicating_it() {
        let mut tree = tree(4);
        for k in 1..=10 {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        // Leaves: [1,2] [3,4] [5,6] [7,8] [9,10]; the old root [3,5,7,9]
        // split around 7.
        assert_eq!(tree.height(), 3);
        assert_eq!(root_keys(&tree), [7]);
        let root = tree.node(tree.root().unwrap()).as_internal();
        assert_eq!(tree.node(root.child(0)).keys(), &[3, 5]);
        assert_eq!(tree.node(root.child(1)).keys(), &[9]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn borrow_from_left_updates_separator() {
        let mut tree = tree(4);
        for k in [10, 20, 30, 40, 5] {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        // [5,10,20] [30,40]
        assert_eq!(leaf_keys(&tree), [alloc::vec![5, 10, 20], alloc::vec![30, 40]]);
        tree.remove_entry(&40);
        assert_eq!(leaf_keys(&tree), [alloc::vec![5, 10], alloc::vec![20, 30]]);
        assert_eq!(root_keys(&tree), [20]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn borrow_from_right_updates_separator() {
        let mut tree = tree(4);
        for k in [10, 20, 30, 40, 50] {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        // [10,20] [30,40,50]
        tree.remove_entry(&10);
        assert_eq!(leaf_keys(&tree), [alloc::vec![20, 30], alloc::vec![40, 50]]);
        assert_eq!(root_keys(&tree), [40]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn merge_collapses_root() {
        let mut tree = tree(4);
        for k in [10, 20, 30, 40] {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.node_count(), 3);

        tree.remove_entry(&40);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(leaf_keys(&tree), [alloc::vec![10, 20, 30]]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn emptied_root_leaf_stays() {
        let mut tree = tree(4);
        tree.insert(1, 1, SplitPolicy::Dense);
        assert_eq!(tree.remove_entry(&1), Some((1, 1)));
        assert_eq!(tree.remove_entry(&1), None);
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.first_key_value(), None);
        assert_eq!(tree.last_key_value(), None);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn cascading_merge_shrinks_height() {
        let mut tree = tree(3);
        for k in 0..64 {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        let grown = tree.height();
        assert!(grown >= 4);

        for k in 0..63 {
            tree.remove_entry(&k);
            tree.check_invariants().unwrap();
        }
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.first_key_value(), Some((&63, &63)));
    }

    #[test]
    fn parent_links_survive_internal_borrow_and_merge() {
        let mut tree = tree(4);
        for k in 0..200 {
            tree.insert(k, k, SplitPolicy::Dense);
        }
        for k in (0..200).step_by(3).chain((1..200).step_by(3)) {
            tree.remove_entry(&k);
            tree.check_invariants().unwrap();
        }
        let remaining: Vec<i32> = leaf_keys(&tree).concat();
        assert_eq!(remaining, (2..200).step_by(3).collect::<Vec<_>>());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        InsertSparse(i32),
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..1000).prop_map(Op::Insert),
            1 => (0i32..1000).prop_map(Op::InsertSparse),
            2 => (0i32..1000).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn invariants_hold_after_every_operation(
            order in 3usize..9,
            ops in prop::collection::vec(op_strategy(), 0..400),
        ) {
            let mut tree = tree(order);
            let mut model = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        prop_assert_eq!(tree.insert(key, key * 2, SplitPolicy::Dense), model.insert(key, key * 2));
                    }
                    Op::InsertSparse(key) => {
                        prop_assert_eq!(tree.insert(key, key * 3, SplitPolicy::Sparse), model.insert(key, key * 3));
                    }
                    Op::Remove(key) => {
                        prop_assert_eq!(tree.remove_entry(&key), model.remove_entry(&key));
                    }
                }
                prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
                prop_assert_eq!(tree.len(), model.len());
            }

            let chained: Vec<i32> = leaf_keys(&tree).concat();
            let expected: Vec<i32> = model.keys().copied().collect();
            prop_assert_eq!(chained, expected);
        }

        #[test]
        fn dense_trees_keep_minimum_occupancy(keys in prop::collection::vec(0i32..500, 0..300)) {
            let mut tree = tree(5);
            for &key in &keys {
                tree.insert(key, key, SplitPolicy::Dense);
            }
            for &key in keys.iter().step_by(2) {
                tree.remove_entry(&key);
            }
            prop_assert!(!tree.has_sparse_splits());
            prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
        }
    }
}
