//! Error types for `bplus_index`.

use alloc::string::String;

/// Convenient `Result` alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by the index.
///
/// A missing key is never an error: lookups return `None` and deletions
/// return `false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The requested order is below [`MIN_ORDER`](crate::config::MIN_ORDER).
    #[error("invalid order {order}: a B+Tree needs an order of at least 3")]
    InvalidOrder {
        /// The rejected order.
        order: usize,
    },

    /// A range query was issued with `low > high`.
    #[error("invalid range: low bound is greater than high bound")]
    InvalidRange,

    /// A structural invariant of the tree does not hold.
    ///
    /// This indicates a bug in the engine, not a caller mistake.
    #[error("structural violation:\n{0}")]
    StructuralViolation(String),
}
