//! Structural snapshots of a tree.
//!
//! A [`Snapshot`] is a plain nested value (numbers, sequences and tagged maps) holding the
//! full node structure of a [`BPlusTree`]. It serves both persistence and visualisation, and
//! it can be encoded with any `serde` format. Leaf sibling links are not stored. They follow
//! from the left-to-right order of the leaves and are rebuilt on load.
//!
//! Loading validates the whole structure before anything is built, so a malformed snapshot
//! yields [`Error::CorruptSnapshot`] and never a partial tree.

use alloc::format;
use alloc::vec::Vec;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{Error, Result};
use crate::raw::{Arena, Bounds, Handle, InternalNode, LeafNode, MIN_ORDER, Node, RawTree};
use crate::{BPlusTree, Key, KeyAllocator, TreeConfig};

/// The full structure of a tree.
///
/// # Examples
///
/// ```
/// use minidb_engine::{BPlusTree, NodeSnapshot};
///
/// let mut tree = BPlusTree::new(3).unwrap();
/// for name in ["ada", "grace", "barbara"] {
///     tree.insert(name.to_string()).unwrap();
/// }
///
/// let snapshot = tree.to_snapshot();
/// assert_eq!(snapshot.height, 2);
/// assert!(matches!(snapshot.root, NodeSnapshot::Internal { .. }));
///
/// let restored = BPlusTree::from_snapshot(snapshot).unwrap();
/// assert_eq!(restored.search(2).map(String::as_str), Some("grace"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<V> {
    /// Tree order `M`.
    pub order: usize,
    /// Number of levels, 1 when the root is a leaf.
    pub height: usize,
    /// Next key the allocator would hand out. When absent, loading resumes after the
    /// largest stored key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_key: Option<Key>,
    /// Set once every key has been handed out. Loading then keeps the allocator exhausted,
    /// even if the entry under `Key::MAX` has since been deleted.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub exhausted: bool,
    /// The root node.
    pub root: NodeSnapshot<V>,
}

/// One node of a [`Snapshot`], tagged `"leaf"` or `"internal"` under `"type"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeSnapshot<V> {
    /// Entries in ascending key order; `keys[i]` belongs to `values[i]`.
    Leaf { keys: Vec<Key>, values: Vec<V> },
    /// Separators and children; `children.len() == keys.len() + 1`.
    Internal {
        keys: Vec<Key>,
        children: Vec<NodeSnapshot<V>>,
    },
}

impl<V> NodeSnapshot<V> {
    /// Keys held by this node: entries for a leaf, separators for an internal node.
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        match self {
            NodeSnapshot::Leaf { keys, .. } | NodeSnapshot::Internal { keys, .. } => keys,
        }
    }
}

fn capture_node<V: Clone>(raw: &RawTree<Key, V>, handle: Handle) -> NodeSnapshot<V> {
    match raw.node(handle) {
        Node::Leaf(leaf) => NodeSnapshot::Leaf {
            keys: leaf.keys().to_vec(),
            values: leaf.values().to_vec(),
        },
        Node::Internal(internal) => NodeSnapshot::Internal {
            keys: internal.keys().to_vec(),
            children: internal.children().iter().map(|&child| capture_node(raw, child)).collect(),
        },
    }
}

fn corrupt(path: &str, message: impl core::fmt::Display) -> Error {
    Error::CorruptSnapshot(format!("{path}: {message}"))
}

/// Structural checks run over a snapshot before anything is built from it.
struct Validator {
    bounds: Bounds,
    height: usize,
    leaf_depth: Option<usize>,
    node_count: usize,
    max_key: Option<Key>,
}

impl Validator {
    /// Checks `node` and its subtree. Every key must lie in `[lower, upper)`, the range the
    /// parent's separators route to this node.
    fn check<V>(
        &mut self,
        node: &NodeSnapshot<V>,
        path: &str,
        depth: usize,
        lower: Option<Key>,
        upper: Option<Key>,
    ) -> Result<()> {
        let is_root = depth == 1;
        if depth > self.height {
            return Err(corrupt(path, format!("node at depth {depth} lies below the declared height {}", self.height)));
        }
        self.node_count += 1;
        if self.node_count > Handle::MAX + 1 {
            return Err(corrupt(path, "too many nodes"));
        }

        let keys = node.keys();
        if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(corrupt(path, format!("keys not strictly ascending ({} then {})", pair[0], pair[1])));
        }
        if let (Some(lo), Some(&first)) = (lower, keys.first())
            && first < lo
        {
            return Err(corrupt(path, format!("key {first} sorts before its separator {lo}")));
        }
        if let (Some(hi), Some(&last)) = (upper, keys.last())
            && last >= hi
        {
            return Err(corrupt(path, format!("key {last} is not below its separator {hi}")));
        }

        match node {
            NodeSnapshot::Leaf { keys, values } => {
                if keys.len() != values.len() {
                    return Err(corrupt(path, format!("{} keys but {} values", keys.len(), values.len())));
                }
                if keys.len() > self.bounds.max_entries() {
                    return Err(corrupt(path, format!("{} entries exceed the maximum of {}", keys.len(), self.bounds.max_entries())));
                }
                if !is_root && keys.len() < self.bounds.min_entries() {
                    return Err(corrupt(path, format!("{} entries are below the minimum of {}", keys.len(), self.bounds.min_entries())));
                }
                match self.leaf_depth {
                    None => self.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(corrupt(path, format!("leaf at depth {depth}, other leaves at depth {expected}")));
                    }
                    Some(_) => {}
                }
                self.max_key = keys.last().copied().max(self.max_key);
            }
            NodeSnapshot::Internal { keys, children } => {
                if children.len() != keys.len() + 1 {
                    return Err(corrupt(path, format!("{} separators for {} children", keys.len(), children.len())));
                }
                if children.len() > self.bounds.max_children() {
                    return Err(corrupt(path, format!("{} children exceed the maximum of {}", children.len(), self.bounds.max_children())));
                }
                let min_children = if is_root { 2 } else { self.bounds.min_children() };
                if children.len() < min_children {
                    return Err(corrupt(path, format!("{} children are below the minimum of {min_children}", children.len())));
                }
                for (i, child) in children.iter().enumerate() {
                    let lo = if i == 0 { lower } else { Some(keys[i - 1]) };
                    let hi = if i == keys.len() { upper } else { Some(keys[i]) };
                    self.check(child, &format!("{path}/{i}"), depth + 1, lo, hi)?;
                }
            }
        }

        Ok(())
    }
}

fn build_node<V>(nodes: &mut Arena<Node<Key, V>>, node: NodeSnapshot<V>) -> Handle {
    match node {
        NodeSnapshot::Leaf { keys, values } => nodes.alloc(Node::Leaf(LeafNode::from_parts(keys, values))),
        NodeSnapshot::Internal { keys, children } => {
            let children = children.into_iter().map(|child| build_node(nodes, child)).collect();
            nodes.alloc(Node::Internal(InternalNode::from_parts(keys, children)))
        }
    }
}

/// Validates a snapshot and rebuilds the tree and key allocator it describes.
fn restore<V>(snapshot: Snapshot<V>) -> Result<(RawTree<Key, V>, KeyAllocator)> {
    let Snapshot {
        order,
        height,
        next_key,
        exhausted,
        root,
    } = snapshot;

    if order < MIN_ORDER {
        return Err(corrupt("tree", format!("order {order} is below {MIN_ORDER}")));
    }

    let mut validator = Validator {
        bounds: Bounds::new(order),
        height,
        leaf_depth: None,
        node_count: 0,
        max_key: None,
    };
    validator.check(&root, "root", 1, None, None)?;

    if validator.leaf_depth != Some(height) {
        return Err(corrupt("tree", format!("declared height {height} but leaves sit at depth {:?}", validator.leaf_depth)));
    }

    let keys = match (next_key, validator.max_key) {
        (Some(next), _) if exhausted => {
            return Err(corrupt("tree", format!("next key {next} given for an exhausted allocator")));
        }
        (None, _) if exhausted => KeyAllocator::exhausted(),
        (Some(next), Some(max)) if next <= max => {
            return Err(corrupt("tree", format!("next key {next} does not exceed stored key {max}")));
        }
        (Some(next), _) => KeyAllocator::new(next),
        (None, max_key) => {
            let mut keys = KeyAllocator::new(TreeConfig::DEFAULT_FIRST_KEY);
            if let Some(max) = max_key {
                keys.observe(max);
            }
            keys
        }
    };

    let mut nodes = Arena::with_capacity(validator.node_count);
    let root = build_node(&mut nodes, root);
    Ok((RawTree::from_arena(validator.bounds, nodes, root, height), keys))
}

impl<V: Clone> BPlusTree<V> {
    /// Captures the full structure of the tree.
    ///
    /// The snapshot owns copies of every key and value, so later changes to the tree do not
    /// affect it and vice versa.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot<V> {
        Snapshot {
            order: self.order(),
            height: self.height(),
            next_key: self.keys.peek(),
            exhausted: self.keys.peek().is_none(),
            root: capture_node(&self.raw, self.raw.root()),
        }
    }
}

impl<V> BPlusTree<V> {
    /// Rebuilds a tree from a snapshot.
    ///
    /// Every node is checked first: keys strictly ascending and within the range the parent
    /// routes to the node, fanout within bounds for the order (the root exempt), all leaves
    /// at the declared height. Any violation fails with [`Error::CorruptSnapshot`].
    pub fn from_snapshot(snapshot: Snapshot<V>) -> Result<Self> {
        let (raw, keys) = restore(snapshot).inspect_err(|err| debug!(%err, "rejected snapshot"))?;
        debug!(order = raw.bounds().order(), height = raw.height(), entries = raw.len(), "loaded snapshot");
        Ok(Self { raw, keys })
    }
}

impl<V> TryFrom<Snapshot<V>> for BPlusTree<V> {
    type Error = Error;

    fn try_from(snapshot: Snapshot<V>) -> Result<Self> {
        Self::from_snapshot(snapshot)
    }
}

impl<V: Clone> From<&BPlusTree<V>> for Snapshot<V> {
    fn from(tree: &BPlusTree<V>) -> Self {
        tree.to_snapshot()
    }
}

impl<V: Clone + Serialize> Serialize for BPlusTree<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.to_snapshot().serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for BPlusTree<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let snapshot = Snapshot::deserialize(deserializer)?;
        Self::from_snapshot(snapshot).map_err(serde::de::Error::custom)
    }
}
