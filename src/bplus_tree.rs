use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::config::{SplitPolicy, TreeConfig};
use crate::error::{Error, Result};
use crate::raw::{Handle, RawBPlusTree};
use crate::tracing_helpers::debug_log;

mod dump;

pub use dump::{NodeDump, NodeKind, TreeDump};

/// An in-memory ordered index based on a [B+Tree].
///
/// Keys live in the leaves, in ascending order, together with their values.
/// Internal nodes hold separator keys only: every key under the child left of
/// a separator is smaller than it, every key under the child to its right is
/// greater than or equal to it. Leaves are chained left to right, so
/// [`range_search`](BPlusTree::range_search) and [`iter`](BPlusTree::iter)
/// descend once and then walk the chain.
///
/// The `order` of the tree is the maximum number of children of an internal
/// node. A node holds at most `order - 1` keys and splits as soon as an
/// insertion brings it to `order` keys. How a full leaf is split is chosen
/// per insertion with a [`SplitPolicy`]; internal nodes always split in the
/// middle.
///
/// Each key is stored once. Inserting a key that is already present replaces
/// its value.
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut index = BPlusTree::new(4).unwrap();
/// for k in [10, 20, 5, 6, 12, 30, 7, 17] {
///     index.insert(k, k * 100);
/// }
///
/// assert_eq!(index.search(&12), Some(&1200));
/// assert_eq!(index.search(&13), None);
///
/// let keys: Vec<_> = index.range_search(&6, &17).unwrap().map(|(k, _)| *k).collect();
/// assert_eq!(keys, [6, 7, 10, 12, 17]);
///
/// assert!(index.delete(&6));
/// assert!(!index.delete(&6));
/// assert_eq!(index.len(), 7);
/// ```
///
/// Loading skewed, mostly ascending data with sparse splits keeps the leaves
/// packed:
///
/// ```
/// use bplus_index::{BPlusTree, SplitPolicy};
///
/// let mut log = BPlusTree::new(4).unwrap();
/// log.bulk_load((1..=12).map(|seq| (seq, ())), SplitPolicy::Sparse);
///
/// let leaves = log.dump().iter().filter(|node| node.keys.len() == 3).count();
/// assert!(leaves >= 3);
/// assert!(log.has_sparse_splits());
/// ```
///
/// [B+Tree]: https://en.wikipedia.org/wiki/B%2B_tree
pub struct BPlusTree<K, V> {
    raw: RawBPlusTree<K, V>,
}

/// An iterator over the entries of a `BPlusTree`, in key order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`].
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    leaf: Option<Handle>,
    index: usize,
    remaining: usize,
}

/// An iterator over the keys of a `BPlusTree`.
///
/// This `struct` is created by the [`keys`] method on [`BPlusTree`].
///
/// [`keys`]: BPlusTree::keys
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

/// An iterator over the values of a `BPlusTree`.
///
/// This `struct` is created by the [`values`] method on [`BPlusTree`].
///
/// [`values`]: BPlusTree::values
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

/// An iterator over the entries of a `BPlusTree` whose keys lie in an
/// inclusive range.
///
/// This `struct` is created by the [`range_search`] method on [`BPlusTree`].
/// It walks the leaf chain from the leaf holding the low bound and stops at
/// the first key above the high bound.
///
/// [`range_search`]: BPlusTree::range_search
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct RangeSearch<'a, K, V, Q: ?Sized> {
    tree: &'a RawBPlusTree<K, V>,
    leaf: Option<Handle>,
    index: usize,
    high: &'a Q,
}

impl<K, V> BPlusTree<K, V> {
    /// Makes a new, empty `BPlusTree` of the given order with the default
    /// [`SplitPolicy::Dense`].
    ///
    /// Does not allocate anything on its own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order < 3`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let tree: BPlusTree<u32, &str> = BPlusTree::new(4).unwrap();
    /// assert!(tree.is_empty());
    /// assert_eq!(tree.order(), 4);
    ///
    /// assert_eq!(BPlusTree::<u32, &str>::new(2).err(), Some(Error::InvalidOrder { order: 2 }));
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Ok(Self::with_config(TreeConfig::new(order)?))
    }

    /// Makes a new, empty `BPlusTree` from a validated configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, SplitPolicy, TreeConfig};
    ///
    /// let config = TreeConfig::new(8).unwrap().with_split_policy(SplitPolicy::Sparse);
    /// let tree: BPlusTree<u64, ()> = BPlusTree::with_config(config);
    /// assert_eq!(tree.config().split_policy(), SplitPolicy::Sparse);
    /// ```
    #[must_use]
    pub const fn with_config(config: TreeConfig) -> Self {
        BPlusTree {
            raw: RawBPlusTree::new(config),
        }
    }

    /// Returns the number of entries in the tree.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree contains no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of levels: 0 before the first insertion, 1 while
    /// the root is a leaf.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.raw.height()
    }

    #[must_use]
    pub const fn order(&self) -> usize {
        self.raw.config().order()
    }

    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        self.raw.config()
    }

    /// Returns the number of live nodes, internal and leaf.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.raw.node_count()
    }

    /// Returns `true` once any leaf has been split with
    /// [`SplitPolicy::Sparse`]. Such trees may hold leaves below the minimum
    /// occupancy.
    #[must_use]
    pub const fn has_sparse_splits(&self) -> bool {
        self.raw.has_sparse_splits()
    }

    /// Clears the tree, removing all entries and nodes. The order and split
    /// policy are kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3).unwrap();
    /// tree.insert(1, "a");
    /// tree.clear();
    /// assert!(tree.is_empty());
    /// assert_eq!(tree.height(), 0);
    /// ```
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Gets an iterator over the entries of the tree, sorted by key.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3).unwrap();
    /// tree.insert(3, "c");
    /// tree.insert(2, "b");
    /// tree.insert(1, "a");
    ///
    /// for (key, value) in tree.iter() {
    ///     println!("{key}: {value}");
    /// }
    ///
    /// let (first_key, first_value) = tree.iter().next().unwrap();
    /// assert_eq!((*first_key, *first_value), (1, "a"));
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: &self.raw,
            leaf: self.raw.first_leaf(),
            index: 0,
            remaining: self.raw.len(),
        }
    }

    /// Gets an iterator over the keys of the tree, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values of the tree, in order by key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Lists every node in pre-order with its level, kind and keys.
    ///
    /// The listing borrows the tree; render it with `Display` or walk
    /// [`TreeDump::nodes`].
    pub fn dump(&self) -> TreeDump<'_, K> {
        TreeDump::new(&self.raw)
    }
}

impl<K: Clone + Ord, V> BPlusTree<K, V> {
    /// Inserts a key-value pair, splitting full leaves with the configured
    /// [`SplitPolicy`].
    ///
    /// If the tree did not have this key present, `None` is returned.
    ///
    /// If the tree did have this key present, the value is updated, and the old
    /// value is returned. The key is not updated.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// assert_eq!(tree.insert(37, "a"), None);
    /// assert_eq!(tree.is_empty(), false);
    ///
    /// tree.insert(37, "b");
    /// assert_eq!(tree.insert(37, "c"), Some("b"));
    /// assert_eq!(tree.search(&37), Some(&"c"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let policy = self.raw.config().split_policy();
        self.raw.insert(key, value, policy)
    }

    /// Inserts a key-value pair, splitting a full leaf with `policy` instead
    /// of the configured one.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, SplitPolicy};
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// for k in 1..=4 {
    ///     tree.insert_with_policy(k, (), SplitPolicy::Sparse);
    /// }
    /// // The sparse split moved only the newest key to the right.
    /// assert_eq!(tree.dump().to_string(), "Internal: [4]\n  Leaf: [1, 2, 3]\n  Leaf: [4]\n");
    /// ```
    pub fn insert_with_policy(&mut self, key: K, value: V, policy: SplitPolicy) -> Option<V> {
        self.raw.insert(key, value, policy)
    }

    /// Inserts every pair of `entries` in iteration order with `policy`.
    ///
    /// Later duplicates overwrite earlier values.
    pub fn bulk_load<I>(&mut self, entries: I, policy: SplitPolicy)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.raw.insert(key, value, policy);
        }
        debug_log!(?policy, len = self.raw.len(), height = self.raw.height(), "bulk load");
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the tree's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3).unwrap();
    /// tree.insert(String::from("alpha"), 1);
    /// assert_eq!(tree.search("alpha"), Some(&1));
    /// assert_eq!(tree.search("beta"), None);
    /// ```
    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Same as [`search`](BPlusTree::search).
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns the stored key and its value.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_key_value(key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3).unwrap();
    /// tree.insert(1, "a");
    /// if let Some(x) = tree.get_mut(&1) {
    ///     *x = "b";
    /// }
    /// assert_eq!(tree.search(&1), Some(&"b"));
    /// ```
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.search(key).is_some()
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.raw.first_key_value()
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.raw.last_key_value()
    }

    /// Deletes a key, rebalancing the tree if a node drops below its minimum
    /// occupancy. Returns `false` if the key was absent; the tree is then left
    /// untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// tree.extend((1..=10).map(|k| (k, ())));
    /// for k in [5, 6, 7] {
    ///     assert!(tree.delete(&k));
    /// }
    /// assert!(!tree.delete(&5));
    /// assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 2, 3, 4, 8, 9, 10]);
    /// ```
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_entry(key).is_some()
    }

    /// Removes a key, returning its value if the key was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes a key, returning the stored key and value if the key was
    /// present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_entry(key)
    }

    /// Returns the entries whose keys lie in the inclusive range
    /// `[low, high]`, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `low > high`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// tree.extend([(1, "a"), (5, "e"), (8, "h"), (13, "m")]);
    ///
    /// let hits: Vec<_> = tree.range_search(&4, &8).unwrap().collect();
    /// assert_eq!(hits, [(&5, &"e"), (&8, &"h")]);
    ///
    /// assert!(tree.range_search(&9, &12).unwrap().next().is_none());
    /// assert_eq!(tree.range_search(&8, &4).err(), Some(Error::InvalidRange));
    /// ```
    pub fn range_search<'a, Q>(&'a self, low: &Q, high: &'a Q) -> Result<RangeSearch<'a, K, V, Q>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if low > high {
            return Err(Error::InvalidRange);
        }

        let leaf = self.raw.locate_leaf(low);
        let index = leaf.map_or(0, |handle| self.raw.node(handle).as_leaf().lower_bound(low));
        Ok(RangeSearch {
            tree: &self.raw,
            leaf,
            index,
            high,
        })
    }

    /// Walks the leaf chain from the leftmost leaf and returns its keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructuralViolation`] if the chain is not strictly
    /// increasing or differs from an in-order walk of the tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<_, _> = [(3, ()), (1, ()), (2, ())].into_iter().collect();
    /// assert_eq!(tree.verify_chain().unwrap(), [&1, &2, &3]);
    /// ```
    pub fn verify_chain(&self) -> Result<Vec<&K>> {
        self.raw.verify_chain()
    }

    /// Audits every structural invariant of the tree: sorted keys, separator
    /// partitioning, uniform leaf depth, parent links, leaf chain, occupancy
    /// bounds and the entry count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructuralViolation`] listing every violation found.
    pub fn check_invariants(&self) -> Result<()> {
        self.raw.check_invariants()
    }
}

impl<K: Clone, V: Clone> Clone for BPlusTree<K, V> {
    fn clone(&self) -> Self {
        BPlusTree { raw: self.raw.clone() }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for BPlusTree<K, V> {
    fn eq(&self, other: &BPlusTree<K, V>) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a == b)
    }
}

impl<K: Eq, V: Eq> Eq for BPlusTree<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Default for BPlusTree<K, V> {
    /// Creates an empty `BPlusTree` of [`DEFAULT_ORDER`](crate::DEFAULT_ORDER).
    fn default() -> Self {
        BPlusTree::with_config(TreeConfig::default())
    }
}

impl<K: Clone + Ord, V> FromIterator<(K, V)> for BPlusTree<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tree = BPlusTree::default();
        tree.extend(iter);
        tree
    }
}

impl<K: Clone + Ord, V> Extend<(K, V)> for BPlusTree<K, V> {
    #[inline]
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let policy = self.raw.config().split_policy();
        self.bulk_load(iter, policy);
    }
}

impl<K: Clone + Ord, V, const N: usize> From<[(K, V); N]> for BPlusTree<K, V> {
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            let leaf = self.tree.node(self.leaf?).as_leaf();
            if self.index < leaf.key_count() {
                let entry = (leaf.key(self.index), leaf.value(self.index));
                self.index += 1;
                self.remaining -= 1;
                return Some(entry);
            }
            self.leaf = leaf.next();
            self.index = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            leaf: self.leaf,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

impl<K, V> Clone for Keys<'_, K, V> {
    fn clone(&self) -> Self {
        Keys {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Keys<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys").field("remaining", &self.inner.remaining).finish()
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V> FusedIterator for Values<'_, K, V> {}

impl<K, V> Clone for Values<'_, K, V> {
    fn clone(&self) -> Self {
        Values {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Values<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values").field("remaining", &self.inner.remaining).finish()
    }
}

impl<'a, K, V, Q> Iterator for RangeSearch<'a, K, V, Q>
where
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.tree.node(self.leaf?).as_leaf();
            if self.index < leaf.key_count() {
                let key = leaf.key(self.index);
                if key.borrow().cmp(self.high).is_gt() {
                    self.leaf = None;
                    return None;
                }
                let value = leaf.value(self.index);
                self.index += 1;
                return Some((key, value));
            }
            self.leaf = leaf.next();
            self.index = 0;
        }
    }
}

impl<K, V, Q> FusedIterator for RangeSearch<'_, K, V, Q>
where
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
}

impl<K, V, Q: ?Sized> Clone for RangeSearch<'_, K, V, Q> {
    fn clone(&self) -> Self {
        RangeSearch {
            tree: self.tree,
            leaf: self.leaf,
            index: self.index,
            high: self.high,
        }
    }
}

impl<K, V, Q: ?Sized> fmt::Debug for RangeSearch<'_, K, V, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeSearch")
            .field("leaf", &self.leaf)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
