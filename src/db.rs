//! The node store contract and an in-memory implementation of it.
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{lock_api::ArcRwLockWriteGuard, RawRwLock, RwLock};

use crate::error::{Error, Result};
use crate::node::{NewNode, NodeId, NodeRecord, NodeUpdate, Timestamp, TreeId};

/// A tainted node together with the children it must be rehashed from.
#[derive(Debug, PartialEq, Clone)]
pub struct TaintedNode<H> {
    /// The node whose hash is stale
    pub node: NodeRecord<H>,
    /// Its children under the derived relation, in no particular order
    pub children: Vec<NodeRecord<H>>,
}

/// The queries the tree engine issues against persisted nodes.
pub trait NodeReader<H> {
    /// The greatest `end` strictly below `before` (the predecessor of a new leaf).
    fn latest_end_before(&self, tree: &TreeId, before: Timestamp) -> Result<Option<Timestamp>>;
    /// The timestamp of the newest leaf.
    fn latest_timestamp(&self, tree: &TreeId) -> Result<Option<Timestamp>>;
    /// The timestamp of the oldest leaf.
    fn earliest_timestamp(&self, tree: &TreeId) -> Result<Option<Timestamp>>;
    /// Branches (level > 0) whose `end` equals `end`, ordered by level ascending.
    fn frontier(&self, tree: &TreeId, end: Timestamp) -> Result<Vec<NodeRecord<H>>>;
    /// The node at the greatest level: the current root.
    fn top(&self, tree: &TreeId) -> Result<Option<NodeRecord<H>>>;
    /// The leaf stored at `timestamp`.
    fn leaf(&self, tree: &TreeId, timestamp: Timestamp) -> Result<Option<NodeRecord<H>>>;
    /// The lowest node starting at `begin` whose `end` is at least `end_at_least`.
    fn lowest_covering(
        &self,
        tree: &TreeId,
        begin: Timestamp,
        end_at_least: Timestamp,
    ) -> Result<Option<NodeRecord<H>>>;
    /// Nodes at `level` whose `begin` lies in `begin..=end`, ordered by `begin`.
    fn children_within(
        &self,
        tree: &TreeId,
        level: u32,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<NodeRecord<H>>>;
    /// Every tainted node joined with its children, ordered by level ascending.
    fn tainted_with_children(&self, tree: &TreeId) -> Result<Vec<TaintedNode<H>>>;
}

/// The mutations the tree engine issues against persisted nodes.
pub trait NodeWriter<H> {
    /// Creates nodes, returning their ids in input order.
    fn create_many(&mut self, nodes: Vec<NewNode<H>>) -> Result<Vec<NodeId>>;
    /// Applies `update` to every listed branch and taints their hashes.
    fn update_many(&mut self, tree: &TreeId, ids: &[NodeId], update: NodeUpdate) -> Result<()>;
    /// Stores freshly computed hashes.
    fn set_hashes(&mut self, tree: &TreeId, hashes: Vec<(NodeId, H)>) -> Result<()>;
}

/// A unit of work against the store. Dropping a transaction without committing it
/// discards every write made through it.
pub trait Transaction<H>: NodeReader<H> + NodeWriter<H> {
    /// Publishes the writes made through this transaction.
    fn commit(self) -> Result<()>;
}

/// A node store which supports transactional writes.
pub trait NodeStore<H>: NodeReader<H> {
    /// The transaction type of this store
    type Txn<'a>: Transaction<H>
    where
        Self: 'a;

    /// Opens a transaction for writes to `tree`.
    fn begin(&self, tree: &TreeId) -> Result<Self::Txn<'_>>;
}

/// The nodes of one tree, indexed by `(level, begin)`.
#[derive(Debug)]
struct TreeNodes<H> {
    nodes: HashMap<NodeId, NodeRecord<H>>,
    index: BTreeMap<(u32, Timestamp), NodeId>,
}

impl<H> Default for TreeNodes<H> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            index: BTreeMap::new(),
        }
    }
}

impl<H: Clone> TreeNodes<H> {
    fn level(&self, level: u32) -> impl DoubleEndedIterator<Item = &NodeRecord<H>> + '_ {
        self.level_within(level, 0, Timestamp::MAX)
    }

    fn level_within(
        &self,
        level: u32,
        begin: Timestamp,
        end: Timestamp,
    ) -> impl DoubleEndedIterator<Item = &NodeRecord<H>> + '_ {
        self.index
            .range((level, begin)..=(level, end))
            .filter_map(|(_, id)| self.nodes.get(id))
    }

    fn max_level(&self) -> Option<u32> {
        self.index.keys().next_back().map(|(level, _)| *level)
    }

    fn latest_end_before(&self, before: Timestamp) -> Option<Timestamp> {
        if before == 0 {
            return None;
        }
        self.level_within(0, 0, before - 1).next_back().map(|n| n.end)
    }

    fn latest_timestamp(&self) -> Option<Timestamp> {
        self.level(0).next_back().map(|n| n.end)
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.level(0).next().map(|n| n.begin)
    }

    fn frontier(&self, end: Timestamp) -> Vec<NodeRecord<H>> {
        let max_level = self.max_level().unwrap_or(0);
        (1..=max_level)
            .filter_map(|level| self.level(level).next_back())
            .filter(|node| node.end == end)
            .cloned()
            .collect()
    }

    fn top(&self) -> Result<Option<NodeRecord<H>>> {
        let Some(max_level) = self.max_level() else {
            return Ok(None);
        };
        let mut top = self.level(max_level);
        let root = top.next().cloned();
        if top.next().is_some() {
            return Err(Error::StructuralInconsistency(format!(
                "more than one node at top level {max_level}"
            )));
        }
        Ok(root)
    }

    fn get_indexed(&self, level: u32, begin: Timestamp) -> Option<&NodeRecord<H>> {
        self.index
            .get(&(level, begin))
            .and_then(|id| self.nodes.get(id))
    }

    fn lowest_covering(&self, begin: Timestamp, end_at_least: Timestamp) -> Option<NodeRecord<H>> {
        let max_level = self.max_level()?;
        (0..=max_level)
            .filter_map(|level| self.get_indexed(level, begin))
            .find(|node| node.end >= end_at_least)
            .cloned()
    }

    fn tainted_with_children(&self) -> Vec<TaintedNode<H>> {
        let mut tainted: Vec<&NodeRecord<H>> =
            self.nodes.values().filter(|n| n.is_tainted()).collect();
        tainted.sort_by_key(|n| (n.level, n.begin));
        tainted
            .into_iter()
            .map(|node| {
                let children = match node.level.checked_sub(1) {
                    Some(child_level) => self
                        .level_within(child_level, node.begin, node.end)
                        .filter(|child| node.is_parent_of(child))
                        .cloned()
                        .collect(),
                    None => Vec::new(),
                };
                TaintedNode {
                    node: node.clone(),
                    children,
                }
            })
            .collect()
    }
}

type SharedTree<H> = Arc<RwLock<TreeNodes<H>>>;

/// An in-memory node store.
///
/// Every tree sits behind its own lock. A transaction holds the write guard of a single
/// tree and keeps an undo journal, so an uncommitted transaction leaves no trace and other
/// trees stay readable and writable meanwhile.
#[derive(Debug)]
pub struct MemDb<H> {
    trees: RwLock<HashMap<TreeId, SharedTree<H>>>,
    next_id: AtomicU64,
    writes: AtomicU64,
}

impl<H> Default for MemDb<H> {
    fn default() -> Self {
        Self {
            trees: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }
}

impl<H> MemDb<H> {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of committed write calls (create, update or hash batches).
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    fn shared(&self, tree: &TreeId) -> Option<SharedTree<H>> {
        self.trees.read().get(tree).cloned()
    }

    fn with_tree<T>(&self, tree: &TreeId, f: impl FnOnce(&TreeNodes<H>) -> T) -> Option<T> {
        self.shared(tree).map(|nodes| f(&nodes.read()))
    }
}

impl<H: Clone> MemDb<H> {
    /// The number of nodes stored for `tree`, leaves included.
    pub fn node_count(&self, tree: &TreeId) -> usize {
        self.with_tree(tree, |t| t.nodes.len()).unwrap_or(0)
    }

    /// Every node of `tree`, ordered by level and then by `begin`.
    pub fn nodes(&self, tree: &TreeId) -> Vec<NodeRecord<H>> {
        self.with_tree(tree, |t| {
            t.index
                .values()
                .filter_map(|id| t.nodes.get(id))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }
}

impl<H: Clone> NodeReader<H> for MemDb<H> {
    fn latest_end_before(&self, tree: &TreeId, before: Timestamp) -> Result<Option<Timestamp>> {
        Ok(self
            .with_tree(tree, |t| t.latest_end_before(before))
            .flatten())
    }

    fn latest_timestamp(&self, tree: &TreeId) -> Result<Option<Timestamp>> {
        Ok(self.with_tree(tree, TreeNodes::latest_timestamp).flatten())
    }

    fn earliest_timestamp(&self, tree: &TreeId) -> Result<Option<Timestamp>> {
        Ok(self.with_tree(tree, TreeNodes::earliest_timestamp).flatten())
    }

    fn frontier(&self, tree: &TreeId, end: Timestamp) -> Result<Vec<NodeRecord<H>>> {
        Ok(self.with_tree(tree, |t| t.frontier(end)).unwrap_or_default())
    }

    fn top(&self, tree: &TreeId) -> Result<Option<NodeRecord<H>>> {
        self.with_tree(tree, TreeNodes::top).unwrap_or(Ok(None))
    }

    fn leaf(&self, tree: &TreeId, timestamp: Timestamp) -> Result<Option<NodeRecord<H>>> {
        Ok(self
            .with_tree(tree, |t| t.get_indexed(0, timestamp).cloned())
            .flatten())
    }

    fn lowest_covering(
        &self,
        tree: &TreeId,
        begin: Timestamp,
        end_at_least: Timestamp,
    ) -> Result<Option<NodeRecord<H>>> {
        Ok(self
            .with_tree(tree, |t| t.lowest_covering(begin, end_at_least))
            .flatten())
    }

    fn children_within(
        &self,
        tree: &TreeId,
        level: u32,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<NodeRecord<H>>> {
        Ok(self
            .with_tree(tree, |t| t.level_within(level, begin, end).cloned().collect())
            .unwrap_or_default())
    }

    fn tainted_with_children(&self, tree: &TreeId) -> Result<Vec<TaintedNode<H>>> {
        Ok(self
            .with_tree(tree, TreeNodes::tainted_with_children)
            .unwrap_or_default())
    }
}

impl<H: Clone> NodeStore<H> for MemDb<H> {
    type Txn<'a>
        = MemTxn<'a, H>
    where
        Self: 'a;

    fn begin(&self, tree: &TreeId) -> Result<Self::Txn<'_>> {
        let shared = self.trees.write().entry(*tree).or_default().clone();
        Ok(MemTxn {
            db: self,
            tree: *tree,
            nodes: shared.write_arc(),
            undo: Vec::new(),
            pending_writes: 0,
            committed: false,
        })
    }
}

#[derive(Debug)]
enum Undo<H> {
    Created(NodeId),
    Replaced(NodeRecord<H>),
}

/// A write transaction on one tree of a [`MemDb`].
///
/// Reads of other trees go through the store; writes to other trees are rejected.
pub struct MemTxn<'a, H: Clone> {
    db: &'a MemDb<H>,
    tree: TreeId,
    nodes: ArcRwLockWriteGuard<RawRwLock, TreeNodes<H>>,
    undo: Vec<Undo<H>>,
    pending_writes: u64,
    committed: bool,
}

impl<'a, H: Clone> MemTxn<'a, H> {
    /// The tree this transaction writes to
    pub fn tree(&self) -> &TreeId {
        &self.tree
    }

    fn check_tree(&self, tree: &TreeId) -> Result<()> {
        if *tree != self.tree {
            return Err(Error::Storage(format!(
                "transaction on tree {} cannot write to tree {tree}",
                self.tree
            )));
        }
        Ok(())
    }

    fn with_tree<T>(&self, tree: &TreeId, f: impl FnOnce(&TreeNodes<H>) -> T) -> Option<T> {
        if *tree == self.tree {
            Some(f(&self.nodes))
        } else {
            self.db.with_tree(tree, f)
        }
    }

    fn replace_with(
        &mut self,
        tree: &TreeId,
        id: NodeId,
        apply: impl FnOnce(&mut NodeRecord<H>) -> Result<()>,
    ) -> Result<()> {
        self.check_tree(tree)?;
        let node = self
            .nodes
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::Storage(format!("unknown node {id}")))?;
        let previous = node.clone();
        apply(node)?;
        self.undo.push(Undo::Replaced(previous));
        Ok(())
    }

    fn rollback(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Created(id) => {
                    if let Some(node) = self.nodes.nodes.remove(&id) {
                        self.nodes.index.remove(&(node.level, node.begin));
                    }
                }
                Undo::Replaced(previous) => {
                    self.nodes.nodes.insert(previous.id, previous);
                }
            }
        }
    }
}

impl<'a, H: Clone> NodeReader<H> for MemTxn<'a, H> {
    fn latest_end_before(&self, tree: &TreeId, before: Timestamp) -> Result<Option<Timestamp>> {
        Ok(self
            .with_tree(tree, |t| t.latest_end_before(before))
            .flatten())
    }

    fn latest_timestamp(&self, tree: &TreeId) -> Result<Option<Timestamp>> {
        Ok(self.with_tree(tree, TreeNodes::latest_timestamp).flatten())
    }

    fn earliest_timestamp(&self, tree: &TreeId) -> Result<Option<Timestamp>> {
        Ok(self.with_tree(tree, TreeNodes::earliest_timestamp).flatten())
    }

    fn frontier(&self, tree: &TreeId, end: Timestamp) -> Result<Vec<NodeRecord<H>>> {
        Ok(self.with_tree(tree, |t| t.frontier(end)).unwrap_or_default())
    }

    fn top(&self, tree: &TreeId) -> Result<Option<NodeRecord<H>>> {
        self.with_tree(tree, TreeNodes::top).unwrap_or(Ok(None))
    }

    fn leaf(&self, tree: &TreeId, timestamp: Timestamp) -> Result<Option<NodeRecord<H>>> {
        Ok(self
            .with_tree(tree, |t| t.get_indexed(0, timestamp).cloned())
            .flatten())
    }

    fn lowest_covering(
        &self,
        tree: &TreeId,
        begin: Timestamp,
        end_at_least: Timestamp,
    ) -> Result<Option<NodeRecord<H>>> {
        Ok(self
            .with_tree(tree, |t| t.lowest_covering(begin, end_at_least))
            .flatten())
    }

    fn children_within(
        &self,
        tree: &TreeId,
        level: u32,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<NodeRecord<H>>> {
        Ok(self
            .with_tree(tree, |t| t.level_within(level, begin, end).cloned().collect())
            .unwrap_or_default())
    }

    fn tainted_with_children(&self, tree: &TreeId) -> Result<Vec<TaintedNode<H>>> {
        Ok(self
            .with_tree(tree, TreeNodes::tainted_with_children)
            .unwrap_or_default())
    }
}

impl<'a, H: Clone> NodeWriter<H> for MemTxn<'a, H> {
    fn create_many(&mut self, nodes: Vec<NewNode<H>>) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.check_tree(&node.tree_id)?;
            let key = (node.level, node.begin);
            if self.nodes.index.contains_key(&key) {
                return Err(Error::Storage(format!(
                    "duplicate node at level {} starting at {}",
                    node.level, node.begin
                )));
            }
            let id = NodeId(self.db.next_id.fetch_add(1, Ordering::Relaxed));
            self.nodes.index.insert(key, id);
            self.nodes.nodes.insert(id, node.into_record(id));
            self.undo.push(Undo::Created(id));
            ids.push(id);
        }
        self.pending_writes += 1;
        Ok(ids)
    }

    fn update_many(&mut self, tree: &TreeId, ids: &[NodeId], update: NodeUpdate) -> Result<()> {
        for id in ids {
            self.replace_with(tree, *id, |node| {
                if node.is_leaf() {
                    return Err(Error::Storage(format!("leaf {} is immutable", node.id)));
                }
                node.full = update.full;
                node.end = update.end;
                node.hash = None;
                Ok(())
            })?;
        }
        self.pending_writes += 1;
        Ok(())
    }

    fn set_hashes(&mut self, tree: &TreeId, hashes: Vec<(NodeId, H)>) -> Result<()> {
        for (id, hash) in hashes {
            self.replace_with(tree, id, |node| {
                node.hash = Some(hash);
                Ok(())
            })?;
        }
        self.pending_writes += 1;
        Ok(())
    }
}

impl<'a, H: Clone> Transaction<H> for MemTxn<'a, H> {
    fn commit(mut self) -> Result<()> {
        self.undo.clear();
        self.committed = true;
        self.db
            .writes
            .fetch_add(self.pending_writes, Ordering::AcqRel);
        Ok(())
    }
}

impl<'a, H: Clone> Drop for MemTxn<'a, H> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}
