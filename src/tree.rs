use core::fmt;
use core::iter::FusedIterator;

use tracing::trace;

use crate::error::{Error, Result};
use crate::raw::{Bounds, Handle, InsertResult, RawTree};
use crate::{Key, KeyAllocator, TreeConfig};

/// An ordered key-value store built on a [B+tree].
///
/// Values live only in the leaves, and the leaves form a chain in ascending key order. Internal
/// nodes hold routing separators. Every leaf is at the same depth, so search, insert, update
/// and delete each visit `O(log_M n)` nodes.
///
/// Keys are normally handed out by the tree itself: [`insert`](Self::insert) returns the key
/// it stored the value under. Keys increase strictly and are never reused, even after a
/// delete. [`insert_with_key`](Self::insert_with_key) lets a caller choose the key instead.
///
/// The tree never looks inside values. Any failed operation leaves the tree exactly as it
/// was.
///
/// # Examples
///
/// ```
/// use minidb_engine::{BPlusTree, Error};
///
/// let mut people = BPlusTree::new(4).unwrap();
///
/// let alice = people.insert("Alice").unwrap();
/// let bob = people.insert("Bob").unwrap();
/// assert_eq!(people.search(alice), Some(&"Alice"));
///
/// people.update(bob, "Robert").unwrap();
/// assert_eq!(people.search(bob), Some(&"Robert"));
///
/// assert_eq!(people.delete(alice), Ok("Alice"));
/// assert_eq!(people.delete(alice), Err(Error::NotFound { key: alice }));
/// assert_eq!(people.len(), 1);
/// ```
///
/// [B+tree]: https://en.wikipedia.org/wiki/B%2B_tree
pub struct BPlusTree<V> {
    pub(crate) raw: RawTree<Key, V>,
    pub(crate) keys: KeyAllocator,
}

/// An iterator over the entries of a [`BPlusTree`] in ascending key order.
///
/// This `struct` is created by the [`iter`](BPlusTree::iter) method. It follows the leaf
/// sibling chain.
pub struct Iter<'a, V> {
    raw: &'a RawTree<Key, V>,
    leaf: Option<Handle>,
    index: usize,
    remaining: usize,
}

/// An iterator over the keys of a [`BPlusTree`] in ascending order.
pub struct Keys<'a, V> {
    inner: Iter<'a, V>,
}

/// An iterator over the values of a [`BPlusTree`] in key order.
pub struct Values<'a, V> {
    inner: Iter<'a, V>,
}

impl<V> BPlusTree<V> {
    /// Creates an empty tree of the given order, the maximum number of children of an
    /// internal node.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOrder`] if `order < 3`.
    ///
    /// # Examples
    ///
    /// ```
    /// use minidb_engine::{BPlusTree, Error};
    ///
    /// let tree: BPlusTree<u32> = BPlusTree::new(3).unwrap();
    /// assert!(tree.is_empty());
    /// assert_eq!(BPlusTree::<u32>::new(2).err(), Some(Error::InvalidOrder { order: 2 }));
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Self::with_config(TreeConfig {
            order,
            ..TreeConfig::default()
        })
    }

    /// Creates an empty tree from a [`TreeConfig`].
    pub fn with_config(config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            raw: RawTree::new(Bounds::new(config.order)),
            keys: KeyAllocator::new(config.first_key),
        })
    }

    /// The order `M`: the maximum number of children of an internal node.
    #[must_use]
    pub fn order(&self) -> usize {
        self.raw.bounds().order()
    }

    /// Minimum number of children of a non-root internal node, `ceil(M/2)`.
    #[must_use]
    pub fn min_children(&self) -> usize {
        self.raw.bounds().min_children()
    }

    /// Minimum number of entries of a non-root leaf, `ceil(M/2) - 1`.
    #[must_use]
    pub fn min_leaf_entries(&self) -> usize {
        self.raw.bounds().min_entries()
    }

    /// Maximum number of entries of a leaf, `M - 1`.
    #[must_use]
    pub fn max_leaf_entries(&self) -> usize {
        self.raw.bounds().max_entries()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Number of levels. An empty tree, or one whose root is a leaf, has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Number of nodes currently in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.raw.node_count()
    }

    /// The key the next [`insert`](Self::insert) will use, or `None` if keys are exhausted.
    #[must_use]
    pub fn next_key(&self) -> Option<Key> {
        self.keys.peek()
    }

    /// Removes every entry. The key allocator keeps counting, so keys are still not reused.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use minidb_engine::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3).unwrap();
    /// let key = tree.insert(7.5).unwrap();
    /// assert_eq!(tree.search(key), Some(&7.5));
    /// assert_eq!(tree.search(key + 1), None);
    /// ```
    #[must_use]
    pub fn search(&self, key: Key) -> Option<&V> {
        self.raw.get(&key)
    }

    /// Same as [`search`](Self::search), named like the standard map lookup.
    #[must_use]
    pub fn get(&self, key: Key) -> Option<&V> {
        self.search(key)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: Key) -> Option<&mut V> {
        self.raw.get_mut(&key)
    }

    /// Returns `true` if an entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: Key) -> bool {
        self.raw.search(&key).is_some()
    }

    /// Stores `value` under a freshly allocated key and returns that key.
    ///
    /// # Errors
    ///
    /// [`Error::AllocatorExhausted`] once every key has been handed out.
    pub fn insert(&mut self, value: V) -> Result<Key> {
        let key = self.keys.peek().ok_or(Error::AllocatorExhausted)?;
        self.insert_with_key(key, value)
    }

    /// Stores `value` under a caller-chosen key.
    ///
    /// Later [`insert`](Self::insert) calls allocate keys above `key`.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if `key` is already present.
    ///
    /// # Examples
    ///
    /// ```
    /// use minidb_engine::{BPlusTree, Error};
    ///
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// tree.insert_with_key(10, "ten").unwrap();
    /// assert_eq!(tree.insert_with_key(10, "again"), Err(Error::DuplicateKey { key: 10 }));
    /// assert_eq!(tree.insert("next"), Ok(11));
    /// ```
    pub fn insert_with_key(&mut self, key: Key, value: V) -> Result<Key> {
        match self.raw.insert(key, value) {
            InsertResult::Inserted => {
                self.keys.observe(key);
                trace!(key, entries = self.raw.len(), "inserted");
                Ok(key)
            }
            InsertResult::Occupied(_) => Err(Error::DuplicateKey { key }),
        }
    }

    /// Replaces the value stored under `key` and returns the previous one. The structure is
    /// not changed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `key` is absent.
    pub fn update(&mut self, key: Key, value: V) -> Result<V> {
        let slot = self.raw.get_mut(&key).ok_or(Error::NotFound { key })?;
        Ok(core::mem::replace(slot, value))
    }

    /// Removes the entry for `key` and returns its value, rebalancing the tree as needed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `key` is absent.
    pub fn delete(&mut self, key: Key) -> Result<V> {
        let value = self.raw.remove(&key).ok_or(Error::NotFound { key })?;
        trace!(key, entries = self.raw.len(), "deleted");
        Ok(value)
    }

    /// Keys of the leaf whose range covers `key`, whether or not `key` itself is present.
    ///
    /// Useful for visualising where an entry lives or would be placed.
    #[must_use]
    pub fn leaf_keys_for(&self, key: Key) -> &[Key] {
        self.raw.node(self.raw.find_leaf(&key)).as_leaf().keys()
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(Key, &V)> {
        self.iter().next()
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(Key, &V)> {
        let leaf = self.raw.node(self.raw.last_leaf()).as_leaf();
        let last = leaf.key_count().checked_sub(1)?;
        Some((*leaf.key(last), leaf.value(last)))
    }

    /// Gets an iterator over the entries in ascending key order.
    ///
    /// # Examples
    ///
    /// ```
    /// use minidb_engine::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3).unwrap();
    /// for word in ["a", "b", "c", "d"] {
    ///     tree.insert(word).unwrap();
    /// }
    /// let entries: Vec<_> = tree.iter().collect();
    /// assert_eq!(entries, [(1, &"a"), (2, &"b"), (3, &"c"), (4, &"d")]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            raw: &self.raw,
            leaf: Some(self.raw.first_leaf()),
            index: 0,
            remaining: self.raw.len(),
        }
    }

    /// Gets an iterator over the keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> Keys<'_, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values in key order.
    #[must_use]
    pub fn values(&self) -> Values<'_, V> {
        Values { inner: self.iter() }
    }
}

impl<V: fmt::Debug> fmt::Debug for BPlusTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Prints the node structure, one node per line, indented by depth.
impl<V: fmt::Debug> fmt::Display for BPlusTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt_structure(f)
    }
}

impl<'a, V> IntoIterator for &'a BPlusTree<V> {
    type Item = (Key, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Key, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(handle) = self.leaf {
            let leaf = self.raw.node(handle).as_leaf();
            if self.index < leaf.key_count() {
                let item = (*leaf.key(self.index), leaf.value(self.index));
                self.index += 1;
                self.remaining -= 1;
                return Some(item);
            }
            self.leaf = leaf.next();
            self.index = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Iter {
            raw: self.raw,
            leaf: self.leaf,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Iter<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<V> Iterator for Keys<'_, V> {
    type Item = Key;

    fn next(&mut self) -> Option<Key> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Keys<'_, V> {}

impl<V> FusedIterator for Keys<'_, V> {}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {}

impl<V> FusedIterator for Values<'_, V> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u16),
        InsertWithKey(Key, u16),
        Update(Key, u16),
        Delete(Key),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => any::<u16>().prop_map(Op::Insert),
            1 => (0..300 as Key, any::<u16>()).prop_map(|(k, v)| Op::InsertWithKey(k, v)),
            2 => (0..300 as Key, any::<u16>()).prop_map(|(k, v)| Op::Update(k, v)),
            3 => (0..300 as Key).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn operations_match_a_model(order in 3usize..8, ops in prop::collection::vec(op_strategy(), 0..300)) {
            let mut tree = BPlusTree::new(order).unwrap();
            let mut model: BTreeMap<Key, u16> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(value) => {
                        let key = tree.insert(value).unwrap();
                        prop_assert!(model.keys().all(|&k| k < key), "allocated key {} collides or regresses", key);
                        model.insert(key, value);
                    }
                    Op::InsertWithKey(key, value) => {
                        let result = tree.insert_with_key(key, value);
                        if model.contains_key(&key) {
                            prop_assert_eq!(result, Err(Error::DuplicateKey { key }));
                        } else {
                            prop_assert_eq!(result, Ok(key));
                            model.insert(key, value);
                        }
                    }
                    Op::Update(key, value) => {
                        let expected = model.get_mut(&key).map(|slot| core::mem::replace(slot, value));
                        prop_assert_eq!(tree.update(key, value).ok(), expected);
                    }
                    Op::Delete(key) => {
                        prop_assert_eq!(tree.delete(key).ok(), model.remove(&key));
                    }
                }
                tree.raw.validate_invariants();
                prop_assert_eq!(tree.len(), model.len());
            }

            let entries: Vec<(Key, u16)> = tree.iter().map(|(k, v)| (k, *v)).collect();
            prop_assert_eq!(entries, model.into_iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn failed_operations_leave_the_tree_untouched() {
        let mut tree = BPlusTree::new(3).unwrap();
        for value in 0..10 {
            tree.insert(value).unwrap();
        }
        let before = tree.to_snapshot();

        assert_eq!(tree.update(99, 0), Err(Error::NotFound { key: 99 }));
        assert_eq!(tree.delete(99), Err(Error::NotFound { key: 99 }));
        assert_eq!(tree.insert_with_key(5, 0), Err(Error::DuplicateKey { key: 5 }));

        assert_eq!(tree.to_snapshot(), before);
    }

    #[test]
    fn exhausted_allocator_fails_without_inserting() {
        let config = TreeConfig {
            order: 3,
            first_key: Key::MAX,
        };
        let mut tree = BPlusTree::with_config(config).unwrap();
        assert_eq!(tree.insert("last"), Ok(Key::MAX));
        assert_eq!(tree.next_key(), None);
        assert_eq!(tree.insert("overflow"), Err(Error::AllocatorExhausted));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn keys_are_not_reused_after_delete_or_clear() {
        let mut tree = BPlusTree::new(4).unwrap();
        let a = tree.insert('a').unwrap();
        let b = tree.insert('b').unwrap();
        tree.delete(b).unwrap();
        assert_eq!(tree.insert('c'), Ok(b + 1));

        tree.clear();
        assert!(tree.is_empty());
        assert!(!tree.contains_key(a));
        assert_eq!(tree.insert('d'), Ok(b + 2));
    }

    #[test]
    fn update_is_idempotent() {
        let mut tree = BPlusTree::new(4).unwrap();
        let key = tree.insert(1).unwrap();
        tree.update(key, 2).unwrap();
        let once = tree.to_snapshot();
        assert_eq!(tree.update(key, 2), Ok(2));
        assert_eq!(tree.to_snapshot(), once);
    }

    #[test]
    fn introspection_reports_bounds() {
        let tree: BPlusTree<()> = BPlusTree::new(5).unwrap();
        assert_eq!(tree.order(), 5);
        assert_eq!(tree.min_children(), 3);
        assert_eq!(tree.min_leaf_entries(), 2);
        assert_eq!(tree.max_leaf_entries(), 4);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn first_last_and_leaf_lookup() {
        let mut tree = BPlusTree::new(3).unwrap();
        assert_eq!(tree.first_key_value(), None);
        assert_eq!(tree.last_key_value(), None);
        assert_eq!(tree.leaf_keys_for(1), &[] as &[Key]);

        for value in ["a", "b", "c", "d", "e"] {
            tree.insert(value.to_string()).unwrap();
        }
        assert_eq!(tree.first_key_value(), Some((1, &"a".to_string())));
        assert_eq!(tree.last_key_value(), Some((5, &"e".to_string())));
        assert!(tree.leaf_keys_for(3).contains(&3));

        let values: Vec<&String> = tree.values().collect();
        assert_eq!(values.len(), 5);
        assert_eq!(tree.keys().len(), 5);
    }

    #[test]
    fn get_mut_edits_in_place() {
        let mut tree = BPlusTree::new(3).unwrap();
        let key = tree.insert(10).unwrap();
        *tree.get_mut(key).unwrap() += 5;
        assert_eq!(tree.search(key), Some(&15));
        assert_eq!(tree.get_mut(key + 1), None);
    }

    #[test]
    fn debug_lists_entries() {
        let mut tree = BPlusTree::new(3).unwrap();
        tree.insert("x").unwrap();
        tree.insert("y").unwrap();
        assert_eq!(alloc::format!("{tree:?}"), r#"{1: "x", 2: "y"}"#);
    }
}
