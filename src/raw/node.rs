use alloc::vec::Vec;
use core::borrow::Borrow;

use super::handle::Handle;

/// Smallest order a tree may be built with.
pub(crate) const MIN_ORDER: usize = 3;

/// Fanout limits derived from the tree order `M`.
///
/// Internal nodes hold `ceil(M/2)..=M` children and leaves hold `ceil(M/2)-1..=M-1` entries.
/// The root is exempt from the lower bounds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Bounds {
    order: usize,
}

impl Bounds {
    pub(crate) const fn new(order: usize) -> Self {
        assert!(order >= MIN_ORDER, "`Bounds::new()` - `order` < `MIN_ORDER`!");
        Self { order }
    }

    #[inline]
    pub(crate) const fn order(self) -> usize {
        self.order
    }

    #[inline]
    pub(crate) const fn max_children(self) -> usize {
        self.order
    }

    #[inline]
    pub(crate) const fn min_children(self) -> usize {
        self.order.div_ceil(2)
    }

    #[inline]
    pub(crate) const fn max_entries(self) -> usize {
        self.order - 1
    }

    #[inline]
    pub(crate) const fn min_entries(self) -> usize {
        self.min_children() - 1
    }
}

#[allow(clippy::large_enum_variant)]
pub(crate) enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

// B+Tree: internal nodes hold separator keys and child handles, `children.len() == keys.len() + 1`.
// keys[i] is <= every key under children[i + 1] and > every key under children[i].
pub(crate) struct InternalNode<K> {
    keys: Vec<K>,
    children: Vec<Handle>,
}

// B+Tree: leaves hold the entries, in strictly ascending key order.
pub(crate) struct LeafNode<K, V> {
    // Right sibling. A lookup link, the arena owns the node.
    next: Option<Handle>,
    keys: Vec<K>,
    values: Vec<V>,
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

    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Entries for a leaf, children for an internal node.
    pub(crate) fn fanout(&self) -> usize {
        match self {
            Node::Internal(internal) => internal.child_count(),
            Node::Leaf(leaf) => leaf.key_count(),
        }
    }

    /// Whether the node is below its lower bound. Callers exempt the root.
    pub(crate) fn is_underfull(&self, bounds: Bounds) -> bool {
        match self {
            Node::Internal(internal) => internal.child_count() < bounds.min_children(),
            Node::Leaf(leaf) => leaf.key_count() < bounds.min_entries(),
        }
    }

    /// Whether the node can give one entry (or child) to a sibling and stay within bounds.
    pub(crate) fn can_lend(&self, bounds: Bounds) -> bool {
        match self {
            Node::Internal(internal) => internal.child_count() > bounds.min_children(),
            Node::Leaf(leaf) => leaf.key_count() > bounds.min_entries(),
        }
    }
}

impl<K> InternalNode<K> {
    /// Builds a node from separators and children. `children.len()` must be `keys.len() + 1`.
    pub(crate) fn from_parts(keys: Vec<K>, children: Vec<Handle>) -> Self {
        debug_assert_eq!(children.len(), keys.len() + 1, "internal node arity mismatch");
        Self { keys, children }
    }

    #[cfg(test)]
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

    /// Index of the child whose key range contains `key`: the number of separators `<= key`.
    #[inline]
    pub(crate) fn search_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Inserts `key` as separator `index` with `child` to its right.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes separator `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Appends a separator and its right child.
    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Prepends a child together with the separator between it and the old first child.
    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Pops the last separator and last child.
    pub(crate) fn pop_child(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop()?;
        Some((key, child))
    }

    /// Pops the first child and the separator to its right.
    pub(crate) fn pop_child_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Some((key, child))
    }

    /// Splits an overflowing node. The left (current) node keeps `ceil(C/2)` of its `C` children
    /// and the right node takes the rest. The separator between the halves is moved out and
    /// returned for the parent.
    pub(crate) fn split(&mut self) -> (K, InternalNode<K>) {
        let keep = self.children.len().div_ceil(2);

        let right_keys = self.keys.split_off(keep);
        let right_children = self.children.split_off(keep);
        let median = self
            .keys
            .pop()
            .expect("`InternalNode::split()` - node too small to split");

        (median, InternalNode::from_parts(right_keys, right_children))
    }

    /// Absorbs a right sibling, pulling down the parent's separator between the two.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            next: None,
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds an unlinked leaf. `keys` and `values` must have equal length.
    pub(crate) fn from_parts(keys: Vec<K>, values: Vec<V>) -> Self {
        debug_assert_eq!(keys.len(), values.len(), "leaf arity mismatch");
        Self {
            next: None,
            keys,
            values,
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

    pub(crate) fn values(&self) -> &[V] {
        &self.values
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

    pub(crate) fn insert(&mut self, index: usize, key: K, value: V) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    pub(crate) fn remove(&mut self, index: usize) -> (K, V) {
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        (key, value)
    }

    pub(crate) fn push(&mut self, key: K, value: V) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub(crate) fn push_front(&mut self, key: K, value: V) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    pub(crate) fn pop(&mut self) -> Option<(K, V)> {
        let key = self.keys.pop()?;
        let value = self.values.pop()?;
        Some((key, value))
    }

    pub(crate) fn pop_front(&mut self) -> Option<(K, V)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.values.remove(0)))
    }

    /// Splits an overflowing leaf. The returned right leaf holds the upper `ceil(count/2)`
    /// entries and is not yet linked into the chain.
    pub(crate) fn split(&mut self) -> LeafNode<K, V> {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid);
        let right_values = self.values.split_off(mid);
        LeafNode::from_parts(right_keys, right_values)
    }

    /// Absorbs a right sibling and takes over its place in the leaf chain.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K, V>) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec;

    fn leaf(keys: &[u64]) -> LeafNode<u64, u64> {
        LeafNode::from_parts(keys.to_vec(), keys.iter().map(|k| k * 10).collect())
    }

    fn handles(range: core::ops::Range<usize>) -> Vec<Handle> {
        range.map(Handle::from_index).collect()
    }

    #[test]
    fn bounds_follow_order() {
        let three = Bounds::new(3);
        assert_eq!((three.min_children(), three.max_children()), (2, 3));
        assert_eq!((three.min_entries(), three.max_entries()), (1, 2));

        let four = Bounds::new(4);
        assert_eq!((four.min_children(), four.max_children()), (2, 4));
        assert_eq!((four.min_entries(), four.max_entries()), (1, 3));

        let seven = Bounds::new(7);
        assert_eq!((seven.min_children(), seven.max_children()), (4, 7));
        assert_eq!((seven.min_entries(), seven.max_entries()), (3, 6));
    }

    #[test]
    #[should_panic(expected = "`Bounds::new()` - `order` < `MIN_ORDER`!")]
    fn bounds_reject_small_order() {
        let _ = Bounds::new(2);
    }

    #[test]
    fn search_child_routes_equal_keys_right() {
        let node = InternalNode::from_parts(vec![10u64, 20, 30], handles(0..4));
        assert_eq!(node.search_child(&5), 0);
        assert_eq!(node.search_child(&10), 1);
        assert_eq!(node.search_child(&19), 1);
        assert_eq!(node.search_child(&20), 2);
        assert_eq!(node.search_child(&30), 3);
        assert_eq!(node.search_child(&99), 3);
    }

    #[test]
    fn leaf_split_moves_upper_half_right() {
        let mut left = leaf(&[1, 2, 3, 4, 5]);
        let right = left.split();
        assert_eq!(left.keys(), &[1, 2]);
        assert_eq!(right.keys(), &[3, 4, 5]);
        assert_eq!(right.values(), &[30, 40, 50]);

        let mut left = leaf(&[1, 2, 3, 4]);
        let right = left.split();
        assert_eq!(left.keys(), &[1, 2]);
        assert_eq!(right.keys(), &[3, 4]);
    }

    #[test]
    fn internal_split_moves_median_up() {
        // Order 4 overflows at five children.
        let mut node = InternalNode::from_parts(vec![10u64, 20, 30, 40], handles(0..5));
        let (median, right) = node.split();
        assert_eq!(median, 30);
        assert_eq!(node.keys(), &[10, 20]);
        assert_eq!(node.children(), handles(0..3).as_slice());
        assert_eq!(right.keys(), &[40]);
        assert_eq!(right.children(), handles(3..5).as_slice());
    }

    #[test]
    fn internal_merge_pulls_separator_down() {
        let mut left = InternalNode::from_parts(vec![10u64], handles(0..2));
        let right = InternalNode::from_parts(vec![30u64], handles(2..4));
        left.merge_with_right(20, right);
        assert_eq!(left.keys(), &[10, 20, 30]);
        assert_eq!(left.children(), handles(0..4).as_slice());
    }

    #[test]
    fn internal_rotations_keep_arity() {
        let mut node = InternalNode::from_parts(vec![20u64], handles(1..3));
        node.push_child_front(10, Handle::from_index(0));
        node.push_child(30, Handle::from_index(3));
        assert_eq!(node.keys(), &[10, 20, 30]);
        assert_eq!(node.children(), handles(0..4).as_slice());

        assert_eq!(node.pop_child_front(), Some((10, Handle::from_index(0))));
        assert_eq!(node.pop_child(), Some((30, Handle::from_index(3))));
        assert_eq!(node.key_count() + 1, node.child_count());

        let (key, child) = node.remove_child(0);
        assert_eq!((key, child), (20, Handle::from_index(2)));
        assert_eq!(node.children(), &[Handle::from_index(1)]);
        assert_eq!(node.pop_child_front(), None);
    }

    #[test]
    fn leaf_merge_takes_over_next_link() {
        let mut left = leaf(&[1, 2]);
        let mut right = leaf(&[3]);
        right.set_next(Some(Handle::from_index(9)));
        left.merge_with_right(right);
        assert_eq!(left.keys(), &[1, 2, 3]);
        assert_eq!(left.next(), Some(Handle::from_index(9)));
    }

    #[test]
    fn lending_respects_bounds() {
        let bounds = Bounds::new(5);
        let node: Node<u64, u64> = Node::Leaf(leaf(&[1, 2, 3]));
        assert!(node.can_lend(bounds));
        assert!(!node.is_underfull(bounds));

        let node: Node<u64, u64> = Node::Leaf(leaf(&[1, 2]));
        assert!(!node.can_lend(bounds));
        assert!(!node.is_underfull(bounds));

        let node: Node<u64, u64> = Node::Leaf(leaf(&[1]));
        assert!(node.is_underfull(bounds));

        let node: Node<u64, u64> = Node::Internal(InternalNode::from_parts(vec![5], handles(0..2)));
        assert!(node.is_underfull(bounds));
        assert_eq!(node.fanout(), 2);
    }
}
