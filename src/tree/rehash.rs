use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::db::{NodeReader, NodeWriter};
use crate::error::{Error, Result};
use crate::hash::MerkleHash;
use crate::node::{NodeId, TreeId};

/// Recomputes tainted hashes, bottom-up, in one pass.
#[derive(Debug, Clone, Default)]
pub struct Rehasher<M> {
    hasher: M,
}

impl<M: MerkleHash> Rehasher<M> {
    /// Constructs a rehasher with the given hasher
    pub fn with_hasher(hasher: M) -> Self {
        Self { hasher }
    }

    /// Returns the hasher used to combine children
    pub fn hasher(&self) -> &M {
        &self.hasher
    }

    /// Recomputes the hash of every tainted node in `tree` and returns how many were fixed.
    ///
    /// Tainted nodes are loaded together with their children in a single query, ordered by
    /// level, so a tainted child is always hashed before its parent. All results are written
    /// back with a single `set_hashes`. A clean tree causes no writes at all.
    pub fn untaint<Db>(&self, db: &mut Db, tree: &TreeId) -> Result<usize>
    where
        Db: NodeReader<M::Output> + NodeWriter<M::Output>,
    {
        let tainted = db.tainted_with_children(tree)?;
        if tainted.is_empty() {
            trace!(%tree, "nothing to rehash");
            return Ok(0);
        }

        let mut fresh: HashMap<NodeId, M::Output> = HashMap::with_capacity(tainted.len());
        let mut updates = Vec::with_capacity(tainted.len());
        for entry in tainted {
            let node = entry.node;
            let mut children = entry.children;
            if children.is_empty() || children.len() > 2 {
                warn!(%tree, node = %node.id, children = children.len(), "bad child count");
                return Err(Error::StructuralInconsistency(format!(
                    "node {} at level {} has {} children",
                    node.id,
                    node.level,
                    children.len()
                )));
            }
            children.sort_by_key(|child| child.begin);

            let hashes = children
                .into_iter()
                .map(|child| {
                    child
                        .hash
                        .or_else(|| fresh.get(&child.id).cloned())
                        .ok_or_else(|| {
                            Error::StructuralInconsistency(format!(
                                "child {} of node {} has no hash",
                                child.id, node.id
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let hash = self.hasher.hash_children(&hashes);
            fresh.insert(node.id, hash.clone());
            updates.push((node.id, hash));
        }

        let count = updates.len();
        db.set_hashes(tree, updates)?;
        debug!(%tree, count, "rehashed tainted nodes");
        Ok(count)
    }
}
