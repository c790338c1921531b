//! Sample trees for trying the engine out.

use alloc::format;
use alloc::string::String;

use tracing::debug;

use crate::BPlusTree;
use crate::error::Result;

/// Builds a tree of the given order holding `n` entries, `"Item 0"` through
/// `"Item {n - 1}"`, each inserted under an allocated key.
///
/// # Errors
///
/// [`Error::InvalidOrder`](crate::Error::InvalidOrder) if `order < 3`.
///
/// # Examples
///
/// ```
/// use minidb_engine::build_demo;
///
/// let tree = build_demo(4, 20).unwrap();
/// assert_eq!(tree.len(), 20);
/// assert_eq!(tree.search(1).map(String::as_str), Some("Item 0"));
/// ```
pub fn build_demo(order: usize, n: usize) -> Result<BPlusTree<String>> {
    let mut tree = BPlusTree::new(order)?;
    for i in 0..n {
        tree.insert(format!("Item {i}"))?;
    }
    debug!(order, entries = n, height = tree.height(), "built demo tree");
    Ok(tree)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::Error;
    use alloc::vec::Vec;

    #[test]
    fn demo_values_follow_insertion_order() {
        let tree = build_demo(3, 5).unwrap();
        let values: Vec<&str> = tree.values().map(String::as_str).collect();
        assert_eq!(values, ["Item 0", "Item 1", "Item 2", "Item 3", "Item 4"]);
        tree.raw.validate_invariants();
    }

    #[test]
    fn empty_demo() {
        let tree = build_demo(4, 0).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn demo_rejects_small_order() {
        assert_eq!(build_demo(2, 10).err(), Some(Error::InvalidOrder { order: 2 }));
    }
}
