//! An embeddable ordered key-value engine built on a B+tree.
//!
//! [`BPlusTree`] stores values under `u64` [`Key`]s, handing out fresh keys on insert. Values
//! live only in the leaves, which are chained left to right in key order. Internal nodes hold
//! routing separators. Every mutation keeps all leaves at the same depth and every non-root
//! node within the fanout bounds of the tree's order, so search, insert, update and delete
//! are all logarithmic.
//!
//! A tree can be captured as a [`Snapshot`], a nested value that any `serde` format can
//! encode, and rebuilt from one. Loading checks the whole structure first and rejects
//! anything malformed with [`Error::CorruptSnapshot`].
//!
//! # Example
//!
//! ```
//! use minidb_engine::{BPlusTree, Error};
//!
//! let mut inventory = BPlusTree::new(4).unwrap();
//!
//! let apples = inventory.insert(("apples", 12)).unwrap();
//! let pears = inventory.insert(("pears", 3)).unwrap();
//! assert_eq!(inventory.search(apples), Some(&("apples", 12)));
//!
//! // Update in place, delete, and observe the errors for absent keys.
//! inventory.update(pears, ("pears", 5)).unwrap();
//! inventory.delete(apples).unwrap();
//! assert_eq!(inventory.update(apples, ("apples", 0)), Err(Error::NotFound { key: apples }));
//!
//! // Snapshots round-trip the full structure.
//! let restored = BPlusTree::from_snapshot(inventory.to_snapshot()).unwrap();
//! assert_eq!(restored.search(pears), Some(&("pears", 5)));
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Arena nodes** - Nodes live in one arena and refer to each other by index, so leaf
//!   sibling links are plain handles
//! - **All-or-nothing mutations** - A failed operation leaves the tree exactly as it was
//! - **Validated snapshots** - Structure is checked before a single node is rebuilt

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

mod config;
mod demo;
mod error;
mod key_allocator;
mod raw;

pub mod snapshot;
pub mod tree;

/// Key type of every entry.
pub type Key = u64;

pub use config::TreeConfig;
pub use demo::build_demo;
pub use error::{Error, Result};
pub use key_allocator::KeyAllocator;
pub use snapshot::{NodeSnapshot, Snapshot};
pub use tree::BPlusTree;
