use std::collections::HashMap;

use tracing::{debug, warn};

use super::{Proof, ProofStep};
use crate::db::NodeReader;
use crate::error::{Error, Result};
use crate::hash::MerkleHash;
use crate::node::{NodeId, NodeRecord, Timestamp, TreeId};

/// The part of the tree a proof is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    /// A single leaf. Its ancestors lie on the path.
    Leaf(Timestamp),
    /// A historical root covering `begin..=end`. Nodes ending at `end` lie on the path.
    Snapshot { begin: Timestamp, end: Timestamp },
}

impl Focus {
    fn range(&self) -> (Timestamp, Timestamp) {
        match *self {
            Focus::Leaf(ts) => (ts, ts),
            Focus::Snapshot { begin, end } => (begin, end),
        }
    }

    fn overlaps<H>(&self, node: &NodeRecord<H>) -> bool {
        let (begin, end) = self.range();
        node.overlaps(begin, end)
    }

    fn is_path<H>(&self, node: &NodeRecord<H>) -> bool {
        match *self {
            Focus::Leaf(_) => self.overlaps(node),
            Focus::Snapshot { end, .. } => node.end == end,
        }
    }
}

/// A read-only view of one tree as it stood at `at_time`.
///
/// Nodes whose range was still open at `at_time` get their hash recomputed from the
/// children that existed back then. Those hashes live only as long as the snapshot.
struct Snapshot<'a, M: MerkleHash, Db> {
    hasher: &'a M,
    db: &'a Db,
    tree: &'a TreeId,
    at_time: Timestamp,
    hashes: HashMap<NodeId, M::Output>,
}

impl<'a, M, Db> Snapshot<'a, M, Db>
where
    M: MerkleHash,
    Db: NodeReader<M::Output>,
{
    fn new(hasher: &'a M, db: &'a Db, tree: &'a TreeId, at_time: Timestamp) -> Self {
        Self {
            hasher,
            db,
            tree,
            at_time,
            hashes: HashMap::new(),
        }
    }

    /// The lowest node spanning every leaf up to `at_time`.
    fn root(&self) -> Result<NodeRecord<M::Output>> {
        let earliest = self
            .db
            .earliest_timestamp(self.tree)?
            .ok_or_else(|| Error::NotFound(format!("tree {}", self.tree)))?;
        if self.at_time < earliest {
            return Err(Error::Validation(format!(
                "time {} precedes the first leaf {earliest}",
                self.at_time
            )));
        }
        // The newest leaf visible at `at_time`, which may fall between two leaves.
        let last = match self.at_time.checked_add(1) {
            Some(before) => self.db.latest_end_before(self.tree, before)?,
            None => self.db.latest_timestamp(self.tree)?,
        }
        .unwrap_or(earliest);
        match self.db.lowest_covering(self.tree, earliest, last)? {
            Some(node) => Ok(node),
            None => self
                .db
                .top(self.tree)?
                .ok_or_else(|| Error::NotFound(format!("root of tree {}", self.tree))),
        }
    }

    /// The children of `node` which existed at `at_time`, ordered by `begin`.
    fn children(&self, node: &NodeRecord<M::Output>) -> Result<Vec<NodeRecord<M::Output>>> {
        let child_level = node.level.checked_sub(1).ok_or_else(|| {
            Error::StructuralInconsistency(format!("leaf {} has no children", node.id))
        })?;
        let children = self
            .db
            .children_within(self.tree, child_level, node.begin, node.end)?;
        let total = children.len();
        let visible: Vec<_> = children
            .into_iter()
            .filter(|child| child.begin <= self.at_time)
            .collect();
        if total > 2 || visible.is_empty() {
            warn!(tree = %self.tree, node = %node.id, total, visible = visible.len(), "bad child count");
            return Err(Error::StructuralInconsistency(format!(
                "node {} at level {} has {total} children, {} visible at {}",
                node.id,
                node.level,
                visible.len(),
                self.at_time
            )));
        }
        Ok(visible)
    }

    /// The hash `node` had at `at_time`.
    fn hash(&mut self, node: &NodeRecord<M::Output>) -> Result<M::Output> {
        if node.end <= self.at_time {
            if let Some(hash) = &node.hash {
                return Ok(hash.clone());
            }
        }
        if let Some(hash) = self.hashes.get(&node.id) {
            return Ok(hash.clone());
        }
        if node.is_leaf() {
            return Err(Error::StructuralInconsistency(format!(
                "leaf {} has no hash",
                node.id
            )));
        }
        let hashes = self
            .children(node)?
            .iter()
            .map(|child| self.hash(child))
            .collect::<Result<Vec<_>>>()?;
        let hash = self.hasher.hash_children(&hashes);
        self.hashes.insert(node.id, hash.clone());
        Ok(hash)
    }

    /// Visits `node` and every node below it in pre-order, each with its visible children.
    fn walk<F>(&self, node: &NodeRecord<M::Output>, visit: &mut F) -> Result<()>
    where
        F: FnMut(&NodeRecord<M::Output>, &[NodeRecord<M::Output>]),
    {
        if node.is_leaf() {
            visit(node, &[]);
            return Ok(());
        }
        let children = self.children(node)?;
        visit(node, &children);
        for child in &children {
            self.walk(child, visit)?;
        }
        Ok(())
    }

    /// The nodes above `node`, nearest first, up to and including the root.
    fn ancestors(&self, node: &NodeRecord<M::Output>) -> Result<Vec<NodeRecord<M::Output>>> {
        let not_found = || {
            Error::NotFound(format!(
                "node {} is not in tree {} at {}",
                node.id, self.tree, self.at_time
            ))
        };
        let mut current = self.root()?;
        if current.level < node.level {
            return Err(not_found());
        }
        let mut path = Vec::new();
        while current.level > node.level {
            let next = self
                .children(&current)?
                .into_iter()
                .rev()
                .find(|child| child.begin <= node.begin)
                .ok_or_else(not_found)?;
            path.push(current);
            current = next;
        }
        if current.id != node.id {
            return Err(not_found());
        }
        path.reverse();
        Ok(path)
    }

    /// Emits the subtree below `node` in post-order and returns the node's hash.
    ///
    /// Leaves and subtrees outside the focus are emitted as a single opaque step. Anything
    /// overlapping the focus is opened up and closed by a step reducing its children.
    fn emit(
        &mut self,
        node: &NodeRecord<M::Output>,
        focus: Focus,
        steps: &mut Vec<ProofStep<M::Output>>,
    ) -> Result<M::Output> {
        if node.is_leaf() || !focus.overlaps(node) {
            let hash = self.hash(node)?;
            steps.push(ProofStep {
                hash: hash.clone(),
                reduce: 0,
                is_path: focus.is_path(node),
            });
            return Ok(hash);
        }

        let children = self.children(node)?;
        let mut hashes = Vec::with_capacity(children.len());
        for child in &children {
            hashes.push(self.emit(child, focus, steps)?);
        }
        let hash = self.hasher.hash_children(&hashes);
        self.hashes.insert(node.id, hash.clone());
        steps.push(ProofStep {
            hash: hash.clone(),
            reduce: children.len(),
            is_path: focus.is_path(node),
        });
        Ok(hash)
    }
}

/// Generates proofs against the state of a tree at a point in time.
#[derive(Debug, Clone, Default)]
pub struct ProofGenerator<M> {
    hasher: M,
}

impl<M: MerkleHash> ProofGenerator<M> {
    /// Constructs a generator with the given hasher
    pub fn with_hasher(hasher: M) -> Self {
        Self { hasher }
    }

    /// Returns the hasher used to combine children
    pub fn hasher(&self) -> &M {
        &self.hasher
    }

    fn resolve_time<Db>(
        &self,
        db: &Db,
        tree: &TreeId,
        at_time: Option<Timestamp>,
    ) -> Result<Timestamp>
    where
        Db: NodeReader<M::Output>,
    {
        match at_time {
            Some(at_time) => Ok(at_time),
            None => db
                .latest_timestamp(tree)?
                .ok_or_else(|| Error::NotFound(format!("tree {tree}"))),
        }
    }

    /// Proves that the leaf at `leaf_ts` belongs to `tree` as it stood at `at_time`.
    ///
    /// `at_time` defaults to the newest leaf. An absent leaf yields an empty proof.
    pub fn inclusion_proof<Db>(
        &self,
        db: &Db,
        tree: &TreeId,
        leaf_ts: Timestamp,
        at_time: Option<Timestamp>,
    ) -> Result<Proof<M>>
    where
        Db: NodeReader<M::Output>,
    {
        let at_time = self.resolve_time(db, tree, at_time)?;
        if db.leaf(tree, leaf_ts)?.is_none() {
            debug!(%tree, leaf_ts, "no such leaf, empty inclusion proof");
            return Ok(Proof::default());
        }
        if leaf_ts > at_time {
            return Err(Error::Validation(format!(
                "leaf {leaf_ts} is newer than {at_time}"
            )));
        }

        let mut snapshot = Snapshot::new(&self.hasher, db, tree, at_time);
        let root = snapshot.root()?;
        let mut steps = Vec::new();
        snapshot.emit(&root, Focus::Leaf(leaf_ts), &mut steps)?;
        debug!(%tree, leaf_ts, at_time, steps = steps.len(), "inclusion proof");
        Ok(Proof { steps })
    }

    /// Proves that the tree at `at_time` extends the historical root `node`.
    ///
    /// Every subtree overlapping `node` is opened down to its leaves. Steps whose node ends
    /// where `node` ends are flagged as path.
    pub fn consistency_proof<Db>(
        &self,
        db: &Db,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Option<Timestamp>,
    ) -> Result<Proof<M>>
    where
        Db: NodeReader<M::Output>,
    {
        if node.tree_id != *tree {
            return Err(Error::Validation(format!(
                "node {} belongs to tree {}, not {tree}",
                node.id, node.tree_id
            )));
        }
        let at_time = self.resolve_time(db, tree, at_time)?;
        if node.end > at_time {
            return Err(Error::Validation(format!(
                "node {} ends at {}, after {at_time}",
                node.id, node.end
            )));
        }

        let mut snapshot = Snapshot::new(&self.hasher, db, tree, at_time);
        let root = snapshot.root()?;
        let focus = Focus::Snapshot {
            begin: node.begin,
            end: node.end,
        };
        let mut steps = Vec::new();
        snapshot.emit(&root, focus, &mut steps)?;
        debug!(%tree, node = %node.id, at_time, steps = steps.len(), "consistency proof");
        Ok(Proof { steps })
    }

    /// The root hash `tree` had at `at_time`, recomputed from the nodes that existed then.
    pub fn root_hash_at<Db>(
        &self,
        db: &Db,
        tree: &TreeId,
        at_time: Option<Timestamp>,
    ) -> Result<M::Output>
    where
        Db: NodeReader<M::Output>,
    {
        let at_time = self.resolve_time(db, tree, at_time)?;
        let mut snapshot = Snapshot::new(&self.hasher, db, tree, at_time);
        let root = snapshot.root()?;
        snapshot.hash(&root)
    }

    /// Every node below `node` as of `at_time`, ordered by level and then by `begin`.
    pub fn descendants<Db>(
        &self,
        db: &Db,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Option<Timestamp>,
    ) -> Result<Vec<NodeRecord<M::Output>>>
    where
        Db: NodeReader<M::Output>,
    {
        let at_time = self.resolve_time(db, tree, at_time)?;
        self.check_visible(tree, node, at_time)?;
        let snapshot = Snapshot::new(&self.hasher, db, tree, at_time);
        let mut nodes = Vec::new();
        snapshot.walk(
            node,
            &mut |_: &NodeRecord<M::Output>, children: &[NodeRecord<M::Output>]| {
                nodes.extend_from_slice(children)
            },
        )?;
        nodes.sort_by_key(|n| (n.level, n.begin));
        Ok(nodes)
    }

    /// The nodes above `node` as of `at_time`, nearest first and ending at the root.
    pub fn ancestors<Db>(
        &self,
        db: &Db,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Option<Timestamp>,
    ) -> Result<Vec<NodeRecord<M::Output>>>
    where
        Db: NodeReader<M::Output>,
    {
        let at_time = self.resolve_time(db, tree, at_time)?;
        self.check_visible(tree, node, at_time)?;
        Snapshot::new(&self.hasher, db, tree, at_time).ancestors(node)
    }

    /// Renders `tree` as it stood at `at_time` as a Graphviz digraph.
    ///
    /// Nodes are named `"level:begin"` and labelled with their range and hex hash.
    pub fn to_dot<Db>(&self, db: &Db, tree: &TreeId, at_time: Option<Timestamp>) -> Result<String>
    where
        Db: NodeReader<M::Output>,
    {
        let at_time = self.resolve_time(db, tree, at_time)?;
        let mut snapshot = Snapshot::new(&self.hasher, db, tree, at_time);
        let root = snapshot.root()?;
        let mut branches = Vec::new();
        snapshot.walk(
            &root,
            &mut |node: &NodeRecord<M::Output>, children: &[NodeRecord<M::Output>]| {
                branches.push((node.clone(), children.to_vec()))
            },
        )?;

        let name = |n: &NodeRecord<M::Output>| format!("\"{}:{}\"", n.level, n.begin);
        let mut out = String::from("digraph G {\n");
        for (node, children) in &branches {
            for child in children {
                out.push_str(&format!("  {} -> {}\n", name(node), name(child)));
            }
            let hash = hex::encode(snapshot.hash(node)?);
            out.push_str(&format!(
                "  {} [label=\"{} [{}, {}]\\n{hash}\"]\n",
                name(node),
                node.level,
                node.begin,
                node.end.min(at_time)
            ));
        }
        out.push_str("}\n");
        Ok(out)
    }

    fn check_visible(
        &self,
        tree: &TreeId,
        node: &NodeRecord<M::Output>,
        at_time: Timestamp,
    ) -> Result<()> {
        if node.tree_id != *tree {
            return Err(Error::Validation(format!(
                "node {} belongs to tree {}, not {tree}",
                node.id, node.tree_id
            )));
        }
        if node.begin > at_time {
            return Err(Error::Validation(format!(
                "node {} begins at {}, after {at_time}",
                node.id, node.begin
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::db::{MemDb, NodeStore, NodeWriter, Transaction};
    use crate::hash::{IdentityHasher, Sha256Hasher};
    use crate::node::{Leaf, NewNode};
    use crate::tree::{push_leaves, Rehasher};

    fn tree() -> TreeId {
        TreeId::derive(&["proofs"])
    }

    fn append<M: MerkleHash>(db: &MemDb<M::Output>, hasher: &M, leaves: Vec<Leaf<M::Output>>)
    where
        M: Clone,
    {
        let mut txn = db.begin(&tree()).unwrap();
        push_leaves(&mut txn, leaves).unwrap();
        Rehasher::with_hasher(hasher.clone())
            .untaint(&mut txn, &tree())
            .unwrap();
        txn.commit().unwrap();
    }

    fn identity_leaf(ts: u64) -> Leaf<Bytes> {
        Leaf::new(tree(), ts, Bytes::from(format!("H{ts}")))
    }

    fn identity_tree(n: u64) -> MemDb<Bytes> {
        let db = MemDb::new();
        append(&db, &IdentityHasher, (1..=n).map(identity_leaf).collect());
        db
    }

    fn hashes(proof: &Proof<IdentityHasher>) -> Vec<(String, usize, bool)> {
        proof
            .steps
            .iter()
            .map(|s| {
                (
                    String::from_utf8_lossy(&s.hash).into_owned(),
                    s.reduce,
                    s.is_path,
                )
            })
            .collect()
    }

    #[test]
    fn test_inclusion_proof_shape() {
        let db = identity_tree(4);
        let generator = ProofGenerator::with_hasher(IdentityHasher);
        let proof = generator.inclusion_proof(&db, &tree(), 3, None).unwrap();
        assert_eq!(
            hashes(&proof),
            vec![
                ("H1H2".into(), 0, false),
                ("H3".into(), 0, true),
                ("H4".into(), 0, false),
                ("H3H4".into(), 2, true),
                ("H1H2H3H4".into(), 2, true),
            ]
        );
        proof
            .verify(&Bytes::from_static(b"H1H2H3H4"))
            .unwrap();
    }

    #[test]
    fn test_inclusion_proof_before_newer_leaves() {
        let db = identity_tree(5);
        let generator = ProofGenerator::with_hasher(IdentityHasher);

        let proof = generator.inclusion_proof(&db, &tree(), 5, None).unwrap();
        assert_eq!(
            hashes(&proof),
            vec![
                ("H1H2H3H4".into(), 0, false),
                ("H5".into(), 0, true),
                ("H5".into(), 1, true),
                ("H5".into(), 1, true),
                ("H1H2H3H4H5".into(), 2, true),
            ]
        );

        // The tree as it stood after the third leaf.
        let proof = generator.inclusion_proof(&db, &tree(), 2, Some(3)).unwrap();
        assert_eq!(proof.root(), Some(&Bytes::from_static(b"H1H2H3")));
        proof.verify(&Bytes::from_static(b"H1H2H3")).unwrap();
    }

    #[test]
    fn test_inclusion_edge_cases() {
        let generator = ProofGenerator::with_hasher(IdentityHasher);
        let empty = MemDb::<Bytes>::new();
        assert!(matches!(
            generator.inclusion_proof(&empty, &tree(), 1, None),
            Err(Error::NotFound(_))
        ));

        let db = identity_tree(1);
        let proof = generator.inclusion_proof(&db, &tree(), 1, None).unwrap();
        assert_eq!(hashes(&proof), vec![("H1".into(), 0, true)]);

        let db = identity_tree(3);
        assert!(generator
            .inclusion_proof(&db, &tree(), 7, None)
            .unwrap()
            .is_empty());
        assert!(matches!(
            generator.inclusion_proof(&db, &tree(), 3, Some(2)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_every_leaf_verifies_at_every_time() {
        let hasher = Sha256Hasher::new();
        let generator = ProofGenerator::with_hasher(hasher);
        let db = MemDb::new();
        let mut roots = Vec::new();
        for ts in 1..=19u64 {
            let content = hasher.digest(&ts.to_be_bytes());
            append(&db, &hasher, vec![Leaf::new(tree(), ts * 10, content)]);
            roots.push(db.top(&tree()).unwrap().unwrap().hash.unwrap());
        }

        for (i, root) in roots.iter().enumerate() {
            let at_time = (i as u64 + 1) * 10;
            assert_eq!(
                &generator.root_hash_at(&db, &tree(), Some(at_time)).unwrap(),
                root
            );
            // Between two leaves the tree still looks as it did at the older one.
            assert_eq!(
                &generator
                    .root_hash_at(&db, &tree(), Some(at_time + 5))
                    .unwrap(),
                root
            );
            for leaf in 1..=i as u64 + 1 {
                let proof = generator
                    .inclusion_proof(&db, &tree(), leaf * 10, Some(at_time))
                    .unwrap();
                proof.verify(root).unwrap();
                assert_eq!(proof.steps.iter().filter(|s| s.reduce == 0 && s.is_path).count(), 1);
            }
        }
    }

    #[test]
    fn test_consistency_with_every_historical_root() {
        let hasher = Sha256Hasher::new();
        let generator = ProofGenerator::with_hasher(hasher);
        let db = MemDb::new();
        let mut snapshots = Vec::new();
        for ts in 1..=13u64 {
            let content = hasher.digest(&ts.to_be_bytes());
            append(&db, &hasher, vec![Leaf::new(tree(), ts, content)]);
            snapshots.push(db.top(&tree()).unwrap().unwrap());
        }
        let current = db.top(&tree()).unwrap().unwrap().hash.unwrap();

        for snapshot in &snapshots {
            let proof = generator
                .consistency_proof(&db, &tree(), snapshot, None)
                .unwrap();
            proof.verify(&current).unwrap();
            // Every leaf of the old tree is spelled out.
            let leaves = proof
                .steps
                .iter()
                .filter(|s| s.reduce == 0)
                .count() as u64;
            assert!(leaves >= snapshot.end);
            assert!(proof.path().count() >= 1);
        }
    }

    #[test]
    fn test_consistency_proof_shape() {
        let db = identity_tree(5);
        let generator = ProofGenerator::with_hasher(IdentityHasher);
        let old_root = db.lowest_covering(&tree(), 1, 4).unwrap().unwrap();
        let proof = generator
            .consistency_proof(&db, &tree(), &old_root, None)
            .unwrap();
        assert_eq!(
            hashes(&proof),
            vec![
                ("H1".into(), 0, false),
                ("H2".into(), 0, false),
                ("H1H2".into(), 2, false),
                ("H3".into(), 0, false),
                ("H4".into(), 0, true),
                ("H3H4".into(), 2, true),
                ("H1H2H3H4".into(), 2, true),
                ("H5".into(), 0, false),
                ("H1H2H3H4H5".into(), 2, false),
            ]
        );
        proof
            .verify(&Bytes::from_static(b"H1H2H3H4H5"))
            .unwrap();

        let newest = db.top(&tree()).unwrap().unwrap();
        assert!(matches!(
            generator.consistency_proof(&db, &tree(), &newest, Some(4)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_three_children_fail_proofs() {
        let db = identity_tree(4);
        let mut txn = db.begin(&tree()).unwrap();
        txn.create_many(vec![NewNode {
            tree_id: tree(),
            level: 1,
            begin: 2,
            end: 4,
            full: true,
            hash: Some(Bytes::from_static(b"bogus")),
        }])
        .unwrap();
        txn.commit().unwrap();

        let generator = ProofGenerator::with_hasher(IdentityHasher);
        assert!(matches!(
            generator.inclusion_proof(&db, &tree(), 1, None),
            Err(Error::StructuralInconsistency(_))
        ));

        let old_root = db.lowest_covering(&tree(), 1, 2).unwrap().unwrap();
        assert_eq!((old_root.level, old_root.end), (1, 2));
        assert!(matches!(
            generator.consistency_proof(&db, &tree(), &old_root, None),
            Err(Error::StructuralInconsistency(_))
        ));
        // The root is still open at time 3, so its hash is recomputed from the children.
        assert!(matches!(
            generator.root_hash_at(&db, &tree(), Some(3)),
            Err(Error::StructuralInconsistency(_))
        ));
        assert!(matches!(
            generator.to_dot(&db, &tree(), None),
            Err(Error::StructuralInconsistency(_))
        ));
    }

    fn positions(nodes: &[NodeRecord<Bytes>]) -> Vec<(u32, u64)> {
        nodes.iter().map(|n| (n.level, n.begin)).collect()
    }

    #[test]
    fn test_descendants_and_ancestors() {
        let db = identity_tree(5);
        let generator = ProofGenerator::with_hasher(IdentityHasher);
        let subtree = db.lowest_covering(&tree(), 1, 4).unwrap().unwrap();

        let below = generator
            .descendants(&db, &tree(), &subtree, None)
            .unwrap();
        assert_eq!(
            positions(&below),
            vec![(0, 1), (0, 2), (0, 3), (0, 4), (1, 1), (1, 3)]
        );
        let below = generator
            .descendants(&db, &tree(), &subtree, Some(3))
            .unwrap();
        assert_eq!(positions(&below), vec![(0, 1), (0, 2), (0, 3), (1, 1), (1, 3)]);
        let leaf = db.leaf(&tree(), 3).unwrap().unwrap();
        assert!(generator
            .descendants(&db, &tree(), &leaf, None)
            .unwrap()
            .is_empty());

        let above = generator.ancestors(&db, &tree(), &leaf, None).unwrap();
        assert_eq!(positions(&above), vec![(1, 3), (2, 1), (3, 1)]);
        let above = generator.ancestors(&db, &tree(), &leaf, Some(4)).unwrap();
        assert_eq!(positions(&above), vec![(1, 3), (2, 1)]);

        let newest = db.leaf(&tree(), 5).unwrap().unwrap();
        assert!(matches!(
            generator.ancestors(&db, &tree(), &newest, Some(4)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_dot_export() {
        let db = identity_tree(5);
        let generator = ProofGenerator::with_hasher(IdentityHasher);
        let dot = generator.to_dot(&db, &tree(), None).unwrap();
        assert!(dot.starts_with("digraph G {\n"));
        assert!(dot.ends_with("}\n"));

        let mut edges: Vec<&str> = dot
            .lines()
            .filter(|line| line.contains("->"))
            .map(str::trim)
            .collect();
        edges.sort_unstable();
        assert_eq!(
            edges,
            vec![
                r#""1:1" -> "0:1""#,
                r#""1:1" -> "0:2""#,
                r#""1:3" -> "0:3""#,
                r#""1:3" -> "0:4""#,
                r#""1:5" -> "0:5""#,
                r#""2:1" -> "1:1""#,
                r#""2:1" -> "1:3""#,
                r#""2:5" -> "1:5""#,
                r#""3:1" -> "2:1""#,
                r#""3:1" -> "2:5""#,
            ]
        );
        assert_eq!(dot.matches("[label=").count(), 11);
        assert!(dot.contains(&format!(
            r#""3:1" [label="3 [1, 5]\n{}"]"#,
            hex::encode("H1H2H3H4H5")
        )));

        // At time 3 the tree had three leaves under a level-2 root.
        let dot = generator.to_dot(&db, &tree(), Some(3)).unwrap();
        assert_eq!(dot.matches("->").count(), 5);
        assert!(dot.contains(&format!(
            r#""2:1" [label="2 [1, 3]\n{}"]"#,
            hex::encode("H1H2H3")
        )));
    }
}
