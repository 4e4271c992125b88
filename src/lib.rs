//! An in-memory B+Tree index for Rust.
//!
//! This crate provides [`BPlusTree`], an ordered key-value index whose entries
//! live in a chain of linked leaves, and [`BPlusTreeSet`], its key-only
//! counterpart. Besides point lookups, insertion and deletion it offers:
//!
//! - [`range_search`](BPlusTree::range_search) - Inclusive range scans that
//!   descend once and then follow the leaf chain
//! - [`insert_with_policy`](BPlusTree::insert_with_policy) - A choice between
//!   dense (midpoint) and sparse (one-key) leaf splits per insertion
//! - [`dump`](BPlusTree::dump) - A pre-order listing of every node for
//!   inspection and rendering
//! - [`check_invariants`](BPlusTree::check_invariants) - A full structural audit
//!
//! # Example
//!
//! ```
//! use bplus_index::{BPlusTree, SplitPolicy};
//!
//! let mut index = BPlusTree::new(4).unwrap();
//! index.insert(20, "twenty");
//! index.insert(5, "five");
//! index.insert_with_policy(30, "thirty", SplitPolicy::Sparse);
//! index.insert(10, "ten");
//!
//! assert_eq!(index.search(&10), Some(&"ten"));
//! assert_eq!(index.height(), 2);
//!
//! let in_range: Vec<_> = index.range_search(&6, &25).unwrap().map(|(_, v)| *v).collect();
//! assert_eq!(in_range, ["ten", "twenty"]);
//!
//! assert!(index.delete(&20));
//! index.check_invariants().unwrap();
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **`tracing`** - Optional structured logging of splits, borrows, merges and
//!   height changes through the `tracing` crate
//!
//! # Implementation
//!
//! Nodes are stored in an arena and refer to each other through stable
//! handles. Every node records its parent's handle, so splits propagate and
//! underflows are repaired bottom-up without re-searching from the root.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod raw;
mod tracing_helpers;

pub mod bplus_tree;
pub mod bplus_tree_set;
pub mod config;
pub mod error;

pub use bplus_tree::{BPlusTree, NodeDump, NodeKind, TreeDump};
pub use bplus_tree_set::BPlusTreeSet;
pub use config::{DEFAULT_ORDER, MIN_ORDER, SplitPolicy, TreeConfig};
pub use error::{Error, Result};
