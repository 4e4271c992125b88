use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::bplus_tree::{self, BPlusTree, TreeDump};
use crate::config::{SplitPolicy, TreeConfig};
use crate::error::Result;

/// An ordered set based on a B+Tree.
///
/// See [`BPlusTree`]'s documentation for a detailed discussion of this
/// collection's structure. A `BPlusTreeSet<K>` is a `BPlusTree<K, ()>`: the
/// leaves carry keys only.
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTreeSet;
///
/// let mut books = BPlusTreeSet::new(4).unwrap();
///
/// books.insert("A Dance With Dragons");
/// books.insert("To Kill a Mockingbird");
/// books.insert("The Odyssey");
/// books.insert("The Great Gatsby");
///
/// if !books.contains("The Winds of Winter") {
///     println!("We have {} books, but The Winds of Winter ain't one.", books.len());
/// }
///
/// books.remove("The Odyssey");
///
/// let t_titles: Vec<_> = books.range_search("T", "U").unwrap().collect();
/// assert_eq!(t_titles, [&"The Great Gatsby", &"To Kill a Mockingbird"]);
/// ```
pub struct BPlusTreeSet<K> {
    map: BPlusTree<K, ()>,
}

/// An iterator over the items of a `BPlusTreeSet`, in ascending order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTreeSet`].
///
/// [`iter`]: BPlusTreeSet::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K> {
    inner: bplus_tree::Keys<'a, K, ()>,
}

/// An iterator over the items of a `BPlusTreeSet` that lie in an inclusive
/// range.
///
/// This `struct` is created by the [`range_search`] method on
/// [`BPlusTreeSet`].
///
/// [`range_search`]: BPlusTreeSet::range_search
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct RangeSearch<'a, K, Q: ?Sized> {
    inner: bplus_tree::RangeSearch<'a, K, (), Q>,
}

impl<K> BPlusTreeSet<K> {
    /// Makes a new, empty `BPlusTreeSet` of the given order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`](crate::Error::InvalidOrder) if
    /// `order < 3`.
    pub fn new(order: usize) -> Result<Self> {
        Ok(BPlusTreeSet {
            map: BPlusTree::new(order)?,
        })
    }

    #[must_use]
    pub const fn with_config(config: TreeConfig) -> Self {
        BPlusTreeSet {
            map: BPlusTree::with_config(config),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.map.height()
    }

    #[must_use]
    pub const fn order(&self) -> usize {
        self.map.order()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Gets an iterator that visits the items in ascending order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTreeSet;
    ///
    /// let set: BPlusTreeSet<usize> = [3, 1, 2].into_iter().collect();
    /// let mut set_iter = set.iter();
    /// assert_eq!(set_iter.next(), Some(&1));
    /// assert_eq!(set_iter.next(), Some(&2));
    /// assert_eq!(set_iter.next(), Some(&3));
    /// assert_eq!(set_iter.next(), None);
    /// ```
    pub fn iter(&self) -> Iter<'_, K> {
        Iter { inner: self.map.keys() }
    }

    /// Lists every node in pre-order with its level, kind and keys.
    pub fn dump(&self) -> TreeDump<'_, K> {
        self.map.dump()
    }
}

impl<K: Clone + Ord> BPlusTreeSet<K> {
    /// Adds an item to the set. Returns whether the item was newly inserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTreeSet;
    ///
    /// let mut set = BPlusTreeSet::new(3).unwrap();
    /// assert_eq!(set.insert(2), true);
    /// assert_eq!(set.insert(2), false);
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn insert(&mut self, item: K) -> bool {
        self.map.insert(item, ()).is_none()
    }

    /// Adds an item, splitting a full leaf with `policy`.
    pub fn insert_with_policy(&mut self, item: K, policy: SplitPolicy) -> bool {
        self.map.insert_with_policy(item, (), policy).is_none()
    }

    pub fn bulk_load<I>(&mut self, items: I, policy: SplitPolicy)
    where
        I: IntoIterator<Item = K>,
    {
        self.map.bulk_load(items.into_iter().map(|item| (item, ())), policy);
    }

    /// Returns `true` if the set contains the item.
    #[must_use]
    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.map.contains_key(item)
    }

    /// Removes an item from the set. Returns whether it was present.
    pub fn remove<Q>(&mut self, item: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.map.delete(item)
    }

    /// Removes and returns the stored item equal to the given one, if any.
    pub fn take<Q>(&mut self, item: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.map.remove_entry(item).map(|(k, ())| k)
    }

    #[must_use]
    pub fn first(&self) -> Option<&K> {
        self.map.first_key_value().map(|(k, ())| k)
    }

    #[must_use]
    pub fn last(&self) -> Option<&K> {
        self.map.last_key_value().map(|(k, ())| k)
    }

    /// Returns the items in the inclusive range `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`](crate::Error::InvalidRange) if
    /// `low > high`.
    pub fn range_search<'a, Q>(&'a self, low: &Q, high: &'a Q) -> Result<RangeSearch<'a, K, Q>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        Ok(RangeSearch {
            inner: self.map.range_search(low, high)?,
        })
    }

    /// See [`BPlusTree::verify_chain`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructuralViolation`](crate::Error::StructuralViolation)
    /// if the leaf chain is broken.
    pub fn verify_chain(&self) -> Result<Vec<&K>> {
        self.map.verify_chain()
    }

    /// See [`BPlusTree::check_invariants`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructuralViolation`](crate::Error::StructuralViolation)
    /// listing every violation found.
    pub fn check_invariants(&self) -> Result<()> {
        self.map.check_invariants()
    }
}

impl<K: Clone> Clone for BPlusTreeSet<K> {
    fn clone(&self) -> Self {
        BPlusTreeSet { map: self.map.clone() }
    }
}

impl<K: PartialEq> PartialEq for BPlusTreeSet<K> {
    fn eq(&self, other: &BPlusTreeSet<K>) -> bool {
        self.map.eq(&other.map)
    }
}

impl<K: Eq> Eq for BPlusTreeSet<K> {}

impl<K: fmt::Debug> fmt::Debug for BPlusTreeSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K> Default for BPlusTreeSet<K> {
    fn default() -> Self {
        BPlusTreeSet { map: BPlusTree::default() }
    }
}

impl<K: Clone + Ord> FromIterator<K> for BPlusTreeSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = BPlusTreeSet::default();
        set.extend(iter);
        set
    }
}

impl<K: Clone + Ord> Extend<K> for BPlusTreeSet<K> {
    #[inline]
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.map.extend(iter.into_iter().map(|item| (item, ())));
    }
}

impl<K: Clone + Ord, const N: usize> From<[K; N]> for BPlusTreeSet<K> {
    fn from(arr: [K; N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, K> IntoIterator for &'a BPlusTreeSet<K> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Iter<'a, K> {
        self.iter()
    }
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for Iter<'_, K> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K> FusedIterator for Iter<'_, K> {}

impl<K> Clone for Iter<'_, K> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<K> fmt::Debug for Iter<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.inner.len()).finish()
    }
}

impl<'a, K, Q> Iterator for RangeSearch<'a, K, Q>
where
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, ())| k)
    }
}

impl<K, Q> FusedIterator for RangeSearch<'_, K, Q>
where
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
}

impl<K, Q: ?Sized> fmt::Debug for RangeSearch<'_, K, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeSearch").field("inner", &self.inner).finish()
    }
}
