use std::fmt;

use sha2::{Digest, Sha256};

/// Leaf timestamps. Strictly increasing within one tree.
pub type Timestamp = u64;

/// The length of a tree identifier in bytes
pub const TREE_ID_LEN: usize = 32;

/// The shard key grouping one family of leaves into a single merkle tree.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash, Default)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeId(pub [u8; TREE_ID_LEN]);

impl TreeId {
    /// Derives a tree id from an ordered list of components, e.g. signer, topic and session.
    ///
    /// Each component is length-prefixed, so `["ab", "c"]` and `["a", "bc"]` map to
    /// different trees.
    pub fn derive<T: AsRef<[u8]>>(parts: &[T]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            let part = part.as_ref();
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

impl AsRef<[u8]> for TreeId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeId({})", self)
    }
}

/// A store-assigned node identifier.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A new event to be committed to a tree.
#[derive(Debug, PartialEq, Clone)]
pub struct Leaf<H> {
    /// The tree the leaf belongs to
    pub tree_id: TreeId,
    /// Must exceed every timestamp already in the tree
    pub timestamp: Timestamp,
    /// An opaque digest of the event, computed by the caller
    pub content_hash: H,
}

impl<H> Leaf<H> {
    /// Creates a new leaf
    pub fn new(tree_id: TreeId, timestamp: Timestamp, content_hash: H) -> Self {
        Self {
            tree_id,
            timestamp,
            content_hash,
        }
    }
}

/// A persisted node. Leaves live at level 0; every other node covers the leaves in
/// `begin..=end` below it.
///
/// Parent and child are never stored. A child sits one level down and shares either the
/// `begin` or the `end` of its parent.
#[derive(Debug, PartialEq, Clone)]
pub struct NodeRecord<H> {
    /// Store-assigned id
    pub id: NodeId,
    /// The tree the node belongs to
    pub tree_id: TreeId,
    /// Height above the leaves
    pub level: u32,
    /// Timestamp of the first covered leaf. Fixed at creation.
    pub begin: Timestamp,
    /// Timestamp of the last covered leaf
    pub end: Timestamp,
    /// Whether the subtree is complete for its level
    pub full: bool,
    /// `None` while the node is tainted
    pub hash: Option<H>,
}

impl<H> NodeRecord<H> {
    /// Whether this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Whether the hash must be recomputed before use
    pub fn is_tainted(&self) -> bool {
        self.hash.is_none()
    }

    /// Whether `other` is a child of this node under the derived relation
    pub fn is_parent_of(&self, other: &NodeRecord<H>) -> bool {
        self.level > 0
            && other.level + 1 == self.level
            && (other.begin == self.begin || other.end == self.end)
    }

    /// Whether the node's range intersects `begin..=end`
    pub fn overlaps(&self, begin: Timestamp, end: Timestamp) -> bool {
        self.begin <= end && begin <= self.end
    }
}

/// A node to be created. The store assigns its id.
#[derive(Debug, PartialEq, Clone)]
pub struct NewNode<H> {
    /// The tree the node belongs to
    pub tree_id: TreeId,
    /// Height above the leaves
    pub level: u32,
    /// Timestamp of the first covered leaf
    pub begin: Timestamp,
    /// Timestamp of the last covered leaf
    pub end: Timestamp,
    /// Whether the subtree is complete for its level
    pub full: bool,
    /// The content hash for leaves, `None` for branches
    pub hash: Option<H>,
}

impl<H> NewNode<H> {
    /// Attaches a store-assigned id
    pub fn into_record(self, id: NodeId) -> NodeRecord<H> {
        NodeRecord {
            id,
            tree_id: self.tree_id,
            level: self.level,
            begin: self.begin,
            end: self.end,
            full: self.full,
            hash: self.hash,
        }
    }
}

/// The fields an append may change on an existing branch. Applying an update always
/// taints the node's hash.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub struct NodeUpdate {
    /// The resulting fullness
    pub full: bool,
    /// The resulting end timestamp
    pub end: Timestamp,
}
