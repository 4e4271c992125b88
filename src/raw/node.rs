use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::config::TreeConfig;

/// Keys kept inline before a node spills to the heap. Orders up to
/// `INLINE_KEYS + 1` never allocate per node.
pub(crate) const INLINE_KEYS: usize = 16;

pub(crate) type Keys<K> = SmallVec<[K; INLINE_KEYS]>;
pub(crate) type Children = SmallVec<[Handle; INLINE_KEYS + 1]>;
pub(crate) type Values<V> = SmallVec<[V; INLINE_KEYS]>;

#[derive(Clone)]
#[allow(clippy::large_enum_variant)]
pub(crate) enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

// Separators are exclusive upper bounds of the child on their left:
// every key under children[i] is < keys[i] <= every key under children[i + 1].
#[derive(Clone)]
pub(crate) struct InternalNode<K> {
    parent: Option<Handle>,
    // Holds up to `order` keys transiently, right before a split.
    keys: Keys<K>,
    children: Children,
}

#[derive(Clone)]
pub(crate) struct LeafNode<K, V> {
    parent: Option<Handle>,
    next: Option<Handle>,
    keys: Keys<K>,
    values: Values<V>,
}

/// Result of searching for a key in a leaf.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

impl<K, V> Node<K, V> {
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Internal(internal) => &internal.keys,
            Node::Leaf(leaf) => &leaf.keys,
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys().len()
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        match self {
            Node::Internal(internal) => internal.parent,
            Node::Leaf(leaf) => leaf.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Handle>) {
        match self {
            Node::Internal(internal) => internal.parent = parent,
            Node::Leaf(leaf) => leaf.parent = parent,
        }
    }

    /// A node must split once it holds `order` keys.
    pub(crate) fn is_full(&self, config: &TreeConfig) -> bool {
        self.key_count() >= config.order()
    }

    /// Minimum key count for this kind of node when it is not the root.
    pub(crate) fn min_keys(&self, config: &TreeConfig) -> usize {
        match self {
            Node::Internal(_) => config.min_internal_keys(),
            Node::Leaf(_) => config.min_leaf_keys(),
        }
    }

    /// True for a non-root node below its minimum occupancy.
    pub(crate) fn is_underflowing(&self, config: &TreeConfig) -> bool {
        self.parent().is_some() && self.key_count() < self.min_keys(config)
    }

    /// True if the node can give a key to a sibling and stay at or above its minimum.
    pub(crate) fn can_lend(&self, config: &TreeConfig) -> bool {
        self.key_count() > self.min_keys(config)
    }
}

impl<K> InternalNode<K> {
    pub(crate) fn new() -> Self {
        Self {
            parent: None,
            keys: SmallVec::new(),
            children: SmallVec::new(),
        }
    }

    /// Creates a root with one separator over two children.
    pub(crate) fn new_root(left: Handle, separator: K, right: Handle) -> Self {
        let mut root = Self::new();
        root.keys.push(separator);
        root.children.push(left);
        root.children.push(right);
        root
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Position of `child` in this node's child list.
    pub(crate) fn child_index_of(&self, child: Handle) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Index of the child whose range contains `key`: the first `i` with
    /// `key < keys[i]`, or the last child.
    #[inline]
    pub(crate) fn search_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow().cmp(key).is_le())
    }

    /// Inserts `key` at `index` and `child` right after the child at `index`.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the separator at `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Replaces the separator at `index`, returning the old one.
    pub(crate) fn replace_key(&mut self, index: usize, key: K) -> K {
        core::mem::replace(&mut self.keys[index], key)
    }

    /// Appends a separator and the child to its right.
    pub(crate) fn push_back(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Prepends a child and the separator to its right.
    pub(crate) fn push_front(&mut self, child: Handle, key: K) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Removes the last separator and the last child.
    pub(crate) fn pop_back(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop().expect("`InternalNode::pop_back()` - child list shorter than key list!");
        Some((key, child))
    }

    /// Removes the first child and the separator to its right.
    pub(crate) fn pop_front(&mut self) -> Option<(Handle, K)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.children.remove(0), self.keys.remove(0)))
    }

    /// Splits at `mid`: `keys[mid]` is removed and returned as the promoted
    /// separator, `keys[mid + 1..]` and `children[mid + 1..]` move to the new
    /// right node.
    pub(crate) fn split_at(&mut self, mid: usize) -> (K, InternalNode<K>) {
        let mut right = InternalNode::new();
        right.keys = self.keys.drain(mid + 1..).collect();
        right.children = self.children.drain(mid + 1..).collect();
        right.parent = self.parent;

        let median = self.keys.pop().expect("`InternalNode::split_at()` - split point out of range!");
        (median, right)
    }

    /// Absorbs `right`, pulling `separator` down between the two key runs.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            parent: None,
            next: None,
            keys: SmallVec::new(),
            values: SmallVec::new(),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> &V {
        &self.values[index]
    }

    #[inline]
    pub(crate) fn value_mut(&mut self, index: usize) -> &mut V {
        &mut self.values[index]
    }

    pub(crate) fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Index of the first key that is not less than `key`.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow().cmp(key).is_lt())
    }

    pub(crate) fn insert(&mut self, index: usize, key: K, value: V) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    pub(crate) fn remove(&mut self, index: usize) -> (K, V) {
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        (key, value)
    }

    pub(crate) fn push_back(&mut self, key: K, value: V) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub(crate) fn push_front(&mut self, key: K, value: V) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    pub(crate) fn pop_back(&mut self) -> Option<(K, V)> {
        let key = self.keys.pop()?;
        let value = self.values.pop().expect("`LeafNode::pop_back()` - value list shorter than key list!");
        Some((key, value))
    }

    pub(crate) fn pop_front(&mut self) -> Option<(K, V)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.values.remove(0)))
    }

    /// Moves `keys[mid..]` and their values into a new right leaf. The caller
    /// links the new leaf into the chain once it has a handle.
    pub(crate) fn split_at(&mut self, mid: usize) -> LeafNode<K, V> {
        let mut right = LeafNode::new();
        right.keys = self.keys.drain(mid..).collect();
        right.values = self.values.drain(mid..).collect();
        right.parent = self.parent;
        right.next = self.next;
        right
    }

    /// Absorbs `right` and takes over its place in the leaf chain.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K, V>) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }
}
