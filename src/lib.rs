//! An in-memory B+Tree ordered index for Rust.
//!
//! This crate provides [`BPlusTree`], an ordered collection of unique values with
//! logarithmic insert, remove and lookup, constant-time access to the minimum and
//! maximum, and sequential scans that follow a doubly linked chain of leaves.
//!
//! # Example
//!
//! ```
//! use bplus_index::{BPlusTree, Error};
//!
//! let mut index = BPlusTree::new(3)?;
//! for value in [5, 3, 21, 9, 1, 13, 2, 7, 10, 12, 4, 8] {
//!     index.insert(value)?;
//! }
//!
//! assert_eq!(index.len(), 12);
//! assert_eq!(index.min(), Some(&1));
//! assert_eq!(index.insert(9), Err(Error::DuplicateKey));
//!
//! index.remove(&21)?;
//! assert_eq!(index.max(), Some(&13));
//! assert!(index.iter().is_sorted());
//! index.validate()?;
//! # Ok::<(), Error>(())
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Configurable fan-out** - Every node holds up to [`Order`] keys, minimum 3
//! - **Leaf chain** - Iteration in both directions without descending the tree
//! - **Self-checking** - [`BPlusTree::validate`] reports every broken invariant
//!
//! # Implementation
//!
//! Values are stored only in the leaves. Each separator key in an internal node is
//! a copy of the smallest value in the subtree to its right, and is repaired on the
//! way back up whenever that smallest value is removed. Underfull nodes borrow from
//! a sibling when it can spare a key and merge with it otherwise. Nodes live in an
//! arena and point at each other by handle, which keeps the crate free of `unsafe`.
//!
//! Structural changes are logged through the [`log`] facade: splits, merges and
//! changes of height at `debug`, rotations and separator repairs at `trace`.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod error;
mod order;
mod raw;

pub mod bplus_tree;

pub use bplus_tree::BPlusTree;
pub use error::{Error, Result};
pub use order::Order;
