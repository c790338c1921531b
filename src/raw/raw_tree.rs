use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::arena::Arena;
use super::handle::Handle;
use super::node::{Bounds, InternalNode, LeafNode, Node, SearchResult};

/// The core B+Tree backing `BPlusTree`.
pub(crate) struct RawTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// The root. An empty tree is a single empty leaf.
    root: Handle,
    /// Leftmost leaf, the head of the sibling chain.
    first_leaf: Handle,
    bounds: Bounds,
    /// Number of levels, 1 when the root is a leaf.
    height: usize,
    /// Total number of entries.
    len: usize,
}

/// Outcome of an insertion attempt.
pub(crate) enum InsertResult<V> {
    Inserted,
    /// The key was already present. The tree is untouched and the value is handed back.
    Occupied(V),
}

/// Path element for tracking traversal during mutations.
#[derive(Clone, Copy)]
struct PathElement {
    /// Handle to the internal node at this level.
    node: Handle,
    /// Index of the child we descended into.
    child_index: usize,
}

/// Stack of internal nodes from the root down to (excluding) a leaf.
type Path = SmallVec<[PathElement; 16]>;

/// A sibling able to lend, chosen during rebalancing.
enum Lender {
    Left(Handle),
    Right(Handle),
}

impl<K, V> RawTree<K, V> {
    /// Creates an empty tree: a root leaf with no entries.
    pub(crate) fn new(bounds: Bounds) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new()));
        Self {
            nodes,
            root,
            first_leaf: root,
            bounds,
            height: 1,
            len: 0,
        }
    }

    /// Assembles a tree from a fully built arena and relinks the leaf chain.
    ///
    /// The caller guarantees the structure already satisfies every tree invariant.
    pub(crate) fn from_arena(bounds: Bounds, nodes: Arena<Node<K, V>>, root: Handle, height: usize) -> Self {
        let mut tree = Self {
            nodes,
            root,
            first_leaf: root,
            bounds,
            height,
            len: 0,
        };

        let leaves = tree.leaves_in_order();
        tree.first_leaf = leaves[0];
        for (i, &handle) in leaves.iter().enumerate() {
            let next = leaves.get(i + 1).copied();
            tree.nodes.get_mut(handle).as_leaf_mut().set_next(next);
        }
        tree.len = leaves.iter().map(|&h| tree.nodes.get(h).as_leaf().key_count()).sum();
        tree
    }

    pub(crate) fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn root(&self) -> Handle {
        self.root
    }

    pub(crate) fn first_leaf(&self) -> Handle {
        self.first_leaf
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    /// Number of live nodes.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Drops every entry, leaving a single empty root leaf.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = self.nodes.alloc(Node::Leaf(LeafNode::new()));
        self.first_leaf = self.root;
        self.height = 1;
        self.len = 0;
    }

    /// Leaves in left-to-right order, found by walking the structure rather than the chain.
    fn leaves_in_order(&self) -> Vec<Handle> {
        let mut leaves = Vec::new();
        let mut stack = alloc::vec![self.root];
        while let Some(handle) = stack.pop() {
            match self.nodes.get(handle) {
                Node::Leaf(_) => leaves.push(handle),
                Node::Internal(internal) => {
                    // Reverse so the leftmost child is visited first.
                    stack.extend(internal.children().iter().rev().copied());
                }
            }
        }
        leaves
    }

    /// Rightmost leaf, reached by always descending into the last child.
    pub(crate) fn last_leaf(&self) -> Handle {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.child_count() - 1);
        }
        current
    }

    /// Writes an indented dump of the structure, one node per line.
    pub(crate) fn fmt_structure(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        K: fmt::Debug,
        V: fmt::Debug,
    {
        writeln!(f, "B+ tree (order: {}, height: {}, entries: {})", self.bounds.order(), self.height, self.len)?;
        let mut stack = alloc::vec![(self.root, 0usize)];
        while let Some((handle, depth)) = stack.pop() {
            let indent = depth * 2;
            match self.nodes.get(handle) {
                Node::Internal(internal) => {
                    writeln!(f, "{:indent$}internal {:?}", "", internal.keys())?;
                    stack.extend(internal.children().iter().rev().map(|&child| (child, depth + 1)));
                }
                Node::Leaf(leaf) => {
                    writeln!(f, "{:indent$}leaf {:?} => {:?}", "", leaf.keys(), leaf.values())?;
                }
            }
        }
        Ok(())
    }
}

impl<K: Clone + Ord, V> RawTree<K, V> {
    /// Walks from the root to the leaf whose key range contains `key`, recording the route.
    fn descend<Q>(&self, key: &Q) -> (Handle, Path)
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut path: Path = SmallVec::new();
        let mut current = self.root;

        while let Node::Internal(internal) = self.nodes.get(current) {
            let child_index = internal.search_child(key);
            path.push(PathElement {
                node: current,
                child_index,
            });
            current = internal.child(child_index);
        }

        (current, path)
    }

    /// Handle of the leaf whose key range contains `key`.
    pub(crate) fn find_leaf<Q>(&self, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.search_child(key));
        }
        current
    }

    /// Searches for a key and returns the leaf handle and index if found.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf_handle = self.find_leaf(key);
        match self.nodes.get(leaf_handle).as_leaf().search(key) {
            SearchResult::Found(idx) => Some((leaf_handle, idx)),
            SearchResult::NotFound(_) => None,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, idx) = self.search(key)?;
        Some(self.nodes.get(leaf_handle).as_leaf().value(idx))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, idx) = self.search(key)?;
        Some(self.nodes.get_mut(leaf_handle).as_leaf_mut().value_mut(idx))
    }

    /// Inserts a new entry. An existing key is rejected without touching the tree.
    pub(crate) fn insert(&mut self, key: K, value: V) -> InsertResult<V> {
        let (leaf_handle, mut path) = self.descend(&key);

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let idx = match leaf.search(&key) {
            SearchResult::Found(_) => return InsertResult::Occupied(value),
            SearchResult::NotFound(idx) => idx,
        };
        leaf.insert(idx, key, value);
        self.len += 1;

        if leaf.key_count() > self.bounds.max_entries() {
            self.split_leaf_and_propagate(leaf_handle, &mut path);
        }

        InsertResult::Inserted
    }

    /// Splits an overflowing leaf and propagates splits up the tree as needed.
    fn split_leaf_and_propagate(&mut self, leaf_handle: Handle, path: &mut Path) {
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let mut right = leaf.split();
        right.set_next(leaf.next());

        // The separator is a copy of the new leaf's first key; the entry stays in the leaf.
        let separator = right.key(0).clone();
        let (left_count, right_count) = (leaf.key_count(), right.key_count());

        let right_handle = self.nodes.alloc(Node::Leaf(right));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));

        trace!(left = ?leaf_handle, right = ?right_handle, left_count, right_count, "split leaf");

        self.propagate_split(path, separator, right_handle);
    }

    /// Inserts a new right sibling into each ancestor until one has room, growing the root if
    /// the split reaches it.
    fn propagate_split(&mut self, path: &mut Path, mut separator: K, mut new_child: Handle) {
        while let Some(elem) = path.pop() {
            let parent = self.nodes.get_mut(elem.node).as_internal_mut();
            parent.insert_child(elem.child_index, separator, new_child);

            if parent.child_count() <= self.bounds.max_children() {
                return;
            }

            // The median separator moves up; it is not kept in either half.
            let (median, right) = parent.split();
            let right_handle = self.nodes.alloc(Node::Internal(right));
            trace!(left = ?elem.node, right = ?right_handle, "split internal node");

            separator = median;
            new_child = right_handle;
        }

        let old_root = self.root;
        let new_root = InternalNode::from_parts(alloc::vec![separator], alloc::vec![old_root, new_child]);
        self.root = self.nodes.alloc(Node::Internal(new_root));
        self.height += 1;

        debug!(root = ?self.root, height = self.height, "grew new root");
    }

    /// Removes a key and returns its value, rebalancing on underflow.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, mut path) = self.descend(key);

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let idx = match leaf.search(key) {
            SearchResult::Found(idx) => idx,
            SearchResult::NotFound(_) => return None,
        };
        let (_, value) = leaf.remove(idx);
        self.len -= 1;

        // A root leaf may shrink all the way to empty.
        if !path.is_empty() && self.nodes.get(leaf_handle).is_underfull(self.bounds) {
            self.rebalance(leaf_handle, &mut path);
        }

        Some(value)
    }

    /// Picks the sibling with the larger surplus, preferring the left one on a tie.
    fn pick_lender(&self, left: Option<Handle>, right: Option<Handle>) -> Option<Lender> {
        let surplus = |handle: Option<Handle>| {
            handle
                .map(|h| self.nodes.get(h))
                .filter(|node| node.can_lend(self.bounds))
                .map(Node::fanout)
        };

        match (surplus(left), surplus(right), left, right) {
            (Some(l), Some(r), Some(left), _) if l >= r => Some(Lender::Left(left)),
            (_, Some(_), _, Some(right)) => Some(Lender::Right(right)),
            (Some(_), None, Some(left), _) => Some(Lender::Left(left)),
            _ => None,
        }
    }

    /// Restores the lower bound of an underfull non-root node: borrow from the richer
    /// sibling when one has a surplus, otherwise merge with a sibling.
    fn rebalance(&mut self, node_handle: Handle, path: &mut Path) {
        let Some(&PathElement {
            node: parent_handle,
            child_index,
        }) = path.last()
        else {
            return;
        };

        let parent = self.nodes.get(parent_handle).as_internal();
        let left = child_index.checked_sub(1).map(|i| parent.child(i));
        let right = (child_index + 1 < parent.child_count()).then(|| parent.child(child_index + 1));
        let is_leaf = self.nodes.get(node_handle).is_leaf();

        match self.pick_lender(left, right) {
            Some(Lender::Left(left_handle)) => {
                if is_leaf {
                    self.borrow_from_left_leaf(node_handle, left_handle, parent_handle, child_index);
                } else {
                    self.borrow_from_left_internal(node_handle, left_handle, parent_handle, child_index);
                }
                trace!(node = ?node_handle, lender = ?left_handle, is_leaf, "borrowed from left sibling");
            }
            Some(Lender::Right(right_handle)) => {
                if is_leaf {
                    self.borrow_from_right_leaf(node_handle, right_handle, parent_handle, child_index);
                } else {
                    self.borrow_from_right_internal(node_handle, right_handle, parent_handle, child_index);
                }
                trace!(node = ?node_handle, lender = ?right_handle, is_leaf, "borrowed from right sibling");
            }
            None => match (left, right) {
                (Some(left_handle), _) => self.merge(left_handle, node_handle, path, child_index - 1),
                (None, Some(right_handle)) => self.merge(node_handle, right_handle, path, child_index),
                (None, None) => unreachable!("non-root node without siblings"),
            },
        }
    }

    /// Moves the left sibling's last entry to the front of the leaf.
    fn borrow_from_left_leaf(&mut self, leaf_handle: Handle, left_handle: Handle, parent_handle: Handle, child_idx: usize) {
        let (key, value) = self
            .nodes
            .get_mut(left_handle)
            .as_leaf_mut()
            .pop()
            .expect("lending leaf has entries");
        let separator = key.clone();

        self.nodes.get_mut(leaf_handle).as_leaf_mut().push_front(key, value);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx - 1, separator);
    }

    /// Moves the right sibling's first entry to the end of the leaf.
    fn borrow_from_right_leaf(&mut self, leaf_handle: Handle, right_handle: Handle, parent_handle: Handle, child_idx: usize) {
        let right = self.nodes.get_mut(right_handle).as_leaf_mut();
        let (key, value) = right.pop_front().expect("lending leaf has entries");
        let separator = right.first_key().expect("lending leaf keeps an entry").clone();

        self.nodes.get_mut(leaf_handle).as_leaf_mut().push(key, value);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx, separator);
    }

    /// Rotates the left sibling's last child through the parent into the node.
    fn borrow_from_left_internal(
        &mut self,
        node_handle: Handle,
        left_handle: Handle,
        parent_handle: Handle,
        child_idx: usize,
    ) {
        let parent_separator = self.nodes.get(parent_handle).as_internal().key(child_idx - 1).clone();
        let (left_key, left_child) = self
            .nodes
            .get_mut(left_handle)
            .as_internal_mut()
            .pop_child()
            .expect("lending node has children");

        self.nodes.get_mut(node_handle).as_internal_mut().push_child_front(parent_separator, left_child);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx - 1, left_key);
    }

    /// Rotates the right sibling's first child through the parent into the node.
    fn borrow_from_right_internal(
        &mut self,
        node_handle: Handle,
        right_handle: Handle,
        parent_handle: Handle,
        child_idx: usize,
    ) {
        let parent_separator = self.nodes.get(parent_handle).as_internal().key(child_idx).clone();
        let (right_key, right_child) = self
            .nodes
            .get_mut(right_handle)
            .as_internal_mut()
            .pop_child_front()
            .expect("lending node has children");

        self.nodes.get_mut(node_handle).as_internal_mut().push_child(parent_separator, right_child);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx, right_key);
    }

    /// Merges `right_handle` into its left neighbour `left_handle`, then drops separator
    /// `separator_idx` from the parent and rebalances upward.
    fn merge(&mut self, left_handle: Handle, right_handle: Handle, path: &mut Path, separator_idx: usize) {
        let Some(&PathElement { node: parent_handle, .. }) = path.last() else {
            unreachable!("merge without a parent");
        };

        match self.nodes.remove(right_handle) {
            Node::Leaf(right) => {
                self.nodes.get_mut(left_handle).as_leaf_mut().merge_with_right(right);
            }
            Node::Internal(right) => {
                let separator = self.nodes.get(parent_handle).as_internal().key(separator_idx).clone();
                self.nodes.get_mut(left_handle).as_internal_mut().merge_with_right(separator, right);
            }
        }
        trace!(survivor = ?left_handle, removed = ?right_handle, "merged siblings");

        self.remove_from_parent_and_propagate(path, separator_idx);
    }

    /// Removes a separator and its right child from the parent, then fixes the parent.
    fn remove_from_parent_and_propagate(&mut self, path: &mut Path, separator_idx: usize) {
        let Some(parent_elem) = path.pop() else {
            unreachable!("separator removal without a parent");
        };
        let parent_handle = parent_elem.node;

        let parent = self.nodes.get_mut(parent_handle).as_internal_mut();
        let _ = parent.remove_child(separator_idx);

        if path.is_empty() {
            // The root may have as few as two children; with one it must collapse.
            if parent.child_count() == 1 {
                let new_root = parent.child(0);
                self.nodes.release(parent_handle);
                self.root = new_root;
                self.height -= 1;
                debug!(root = ?new_root, height = self.height, "collapsed root");
            }
            return;
        }

        if self.nodes.get(parent_handle).is_underfull(self.bounds) {
            self.rebalance(parent_handle, path);
        }
    }
}
