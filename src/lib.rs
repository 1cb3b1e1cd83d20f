//! An append-only, timestamp-keyed merkle tree for event logs.
//!
//! Leaves are appended in timestamp order and the tree grows like a binary counter. Nodes
//! whose coverage changes are tainted and rehashed in a separate pass. Proofs are generated
//! against the tree as it stood at any point in time, and verified by replaying them on a
//! stack.
use tracing::{debug, debug_span};

/// The node store contract and an in-memory store
pub mod db;
/// Errors
pub mod error;
/// Hashing strategies
pub mod hash;
/// Per-tree write locks
pub mod lock;
/// Persisted node types
pub mod node;
/// Proof generation, encoding and verification
pub mod proof;
/// Appending leaves and rehashing
pub mod tree;

pub use db::{MemDb, NodeReader, NodeStore, NodeWriter, Transaction};
pub use error::{Error, ProofError, Result};
pub use hash::{IdentityHasher, MerkleHash, Sha256HexHasher, Sha256Hasher};
pub use lock::{TreeGuard, TreeLocks};
pub use node::{Leaf, NodeId, NodeRecord, Timestamp, TreeId};
pub use proof::{Proof, ProofGenerator, ProofStep, WireStep};
pub use tree::{push_leaves, PushSummary, Rehasher};

/// A set of merkle trees sharing one node store.
///
/// Each append runs under the tree's lock inside a single store transaction, so readers
/// never observe a partially built or partially hashed tree.
#[derive(Debug)]
pub struct MerkleLedger<Db, M = Sha256Hasher> {
    db: Db,
    locks: TreeLocks,
    rehasher: Rehasher<M>,
    proofs: ProofGenerator<M>,
}

impl<Db, M> Default for MerkleLedger<Db, M>
where
    Db: NodeStore<M::Output> + Default,
    M: MerkleHash + Default + Clone,
{
    fn default() -> Self {
        Self::with_hasher(Db::default(), M::default())
    }
}

impl<Db, M> MerkleLedger<Db, M>
where
    Db: NodeStore<M::Output> + Default,
    M: MerkleHash + Default + Clone,
{
    /// Creates a ledger over an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl<Db, M> MerkleLedger<Db, M>
where
    Db: NodeStore<M::Output>,
    M: MerkleHash + Clone,
{
    /// Creates a ledger over `db` which combines nodes with `hasher`
    pub fn with_hasher(db: Db, hasher: M) -> Self {
        Self {
            db,
            locks: TreeLocks::new(),
            rehasher: Rehasher::with_hasher(hasher.clone()),
            proofs: ProofGenerator::with_hasher(hasher),
        }
    }
}

impl<Db, M> MerkleLedger<Db, M> {
    /// Returns the underlying store
    pub fn db(&self) -> &Db {
        &self.db
    }
}

impl<Db, M> MerkleLedger<Db, M>
where
    Db: NodeStore<M::Output>,
    M: MerkleHash,
{
    /// Appends a batch of leaves to their tree and rehashes it.
    ///
    /// All leaves must belong to the same tree and be strictly newer than its latest leaf.
    /// On any error the store is left exactly as it was.
    pub fn append(&self, leaves: Vec<Leaf<M::Output>>) -> Result<PushSummary> {
        let tree = tree::validate_batch(&leaves)?;
        let span = debug_span!("append", %tree, leaves = leaves.len());
        let _enter = span.enter();

        let _guard = self.locks.lock(&tree);
        let mut txn = self.db.begin(&tree)?;
        let summary = push_leaves(&mut txn, leaves)?;
        let rehashed = self.rehasher.untaint(&mut txn, &tree)?;
        txn.commit()?;
        debug!(rehashed, root_level = summary.root_level, "append committed");
        Ok(summary)
    }

    /// Returns the current root of `tree`, or `None` if it has no leaves.
    pub fn root(&self, tree: &TreeId) -> Result<Option<NodeRecord<M::Output>>> {
        self.db.top(tree)
    }

    /// Returns the root hash `tree` had at `at_time`, defaulting to its newest leaf.
    pub fn root_hash_at(&self, tree: &TreeId, at_time: Option<Timestamp>) -> Result<M::Output> {
        self.proofs.root_hash_at(&self.db, tree, at_time)
    }

    /// Proves that the leaf at `leaf_ts` is part of `tree` at `at_time`.
    pub fn inclusion_proof(
        &self,
        tree: &TreeId,
        leaf_ts: Timestamp,
        at_time: Option<Timestamp>,
    ) -> Result<Proof<M>> {
        self.proofs.inclusion_proof(&self.db, tree, leaf_ts, at_time)
    }

    /// Proves that `tree` at `at_time` extends the historical root `node`.
    pub fn consistency_proof(
        &self,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Option<Timestamp>,
    ) -> Result<Proof<M>> {
        self.proofs.consistency_proof(&self.db, tree, node, at_time)
    }

    /// Returns every node below `node` in `tree` at `at_time`, ordered by level.
    pub fn descendants(
        &self,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Option<Timestamp>,
    ) -> Result<Vec<NodeRecord<M::Output>>> {
        self.proofs.descendants(&self.db, tree, node, at_time)
    }

    /// Returns the nodes above `node` in `tree` at `at_time`, ending at the root.
    pub fn ancestors(
        &self,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Option<Timestamp>,
    ) -> Result<Vec<NodeRecord<M::Output>>> {
        self.proofs.ancestors(&self.db, tree, node, at_time)
    }

    /// Renders `tree` at `at_time` as a Graphviz digraph.
    pub fn to_dot(&self, tree: &TreeId, at_time: Option<Timestamp>) -> Result<String> {
        self.proofs.to_dot(&self.db, tree, at_time)
    }
}
