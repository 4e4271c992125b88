//! Tree configuration: order and split policy.

use crate::error::{Error, Result};

/// Smallest order for which splits and merges stay well formed.
pub const MIN_ORDER: usize = 3;

/// Order used by [`TreeConfig::default`].
#[cfg(test)]
pub const DEFAULT_ORDER: usize = 16;
/// Order used by [`TreeConfig::default`].
#[cfg(not(test))]
pub const DEFAULT_ORDER: usize = 128;

/// Where an overfull leaf is divided.
///
/// Internal nodes always split densely, whatever policy the triggering leaf
/// split used.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum SplitPolicy {
    /// Split at `order / 2`, the structural midpoint.
    #[default]
    Dense,
    /// Split at `max(1, key_count - 1)`, moving a single key into the new
    /// sibling and leaving the original leaf full.
    Sparse,
}

impl SplitPolicy {
    /// Returns the index of the first key that moves to the new sibling.
    #[inline]
    pub(crate) fn split_point(self, order: usize, key_count: usize) -> usize {
        match self {
            SplitPolicy::Dense => order / 2,
            SplitPolicy::Sparse => key_count.saturating_sub(1).max(1),
        }
    }
}

/// Construction parameters of a [`BPlusTree`](crate::BPlusTree).
///
/// `order` is the maximum number of children of an internal node. Every node
/// holds at most `order - 1` keys and splits as soon as it reaches `order`.
///
/// # Examples
///
/// ```
/// use bplus_index::{SplitPolicy, TreeConfig};
///
/// let config = TreeConfig::new(4).unwrap().with_split_policy(SplitPolicy::Sparse);
/// assert_eq!(config.max_keys(), 3);
/// assert_eq!(config.min_leaf_keys(), 2);
/// assert_eq!(config.min_internal_keys(), 1);
/// assert!(TreeConfig::new(2).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TreeConfig {
    order: usize,
    split_policy: SplitPolicy,
}

impl TreeConfig {
    /// Creates a configuration with the given order and the dense split policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order < MIN_ORDER`.
    pub fn new(order: usize) -> Result<Self> {
        if order < MIN_ORDER {
            return Err(Error::InvalidOrder { order });
        }
        Ok(Self {
            order,
            split_policy: SplitPolicy::Dense,
        })
    }

    /// Sets the policy used by insertions that do not name one.
    #[must_use]
    pub const fn with_split_policy(mut self, split_policy: SplitPolicy) -> Self {
        self.split_policy = split_policy;
        self
    }

    /// Maximum number of children of an internal node.
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Default split policy.
    pub const fn split_policy(&self) -> SplitPolicy {
        self.split_policy
    }

    /// Maximum number of keys a node holds between operations.
    pub const fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Minimum number of keys of a non-root leaf.
    pub const fn min_leaf_keys(&self) -> usize {
        self.order / 2
    }

    /// Minimum number of keys of a non-root internal node.
    pub const fn min_internal_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            split_policy: SplitPolicy::Dense,
        }
    }
}
