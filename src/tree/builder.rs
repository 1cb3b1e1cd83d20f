use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::db::{NodeReader, NodeWriter};
use crate::error::{Error, Result};
use crate::node::{Leaf, NewNode, NodeId, NodeRecord, NodeUpdate, Timestamp, TreeId};

/// What an append did to the tree.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct PushSummary {
    /// Leaves appended
    pub leaves: usize,
    /// Branches created, not counting the leaves themselves
    pub created: usize,
    /// Existing branches whose coverage changed
    pub updated: usize,
    /// Level of the root after the append
    pub root_level: u32,
}

/// One level of the frontier as it evolves in memory during a batch.
#[derive(Debug, Clone)]
struct Slot {
    id: Option<NodeId>,
    level: u32,
    begin: Timestamp,
    end: Timestamp,
    full: bool,
    dirty: bool,
}

impl Slot {
    fn existing<H>(node: &NodeRecord<H>) -> Self {
        Self {
            id: Some(node.id),
            level: node.level,
            begin: node.begin,
            end: node.end,
            full: node.full,
            dirty: false,
        }
    }

    fn created(level: u32, begin: Timestamp, end: Timestamp, full: bool) -> Self {
        Self {
            id: None,
            level,
            begin,
            end,
            full,
            dirty: true,
        }
    }
}

/// Validates a batch of leaves without touching the store.
pub fn validate_batch<H>(leaves: &[Leaf<H>]) -> Result<TreeId> {
    let first = leaves
        .first()
        .ok_or_else(|| Error::Validation("empty leaf batch".into()))?;
    for pair in leaves.windows(2) {
        if pair[1].tree_id != first.tree_id {
            return Err(Error::Validation(format!(
                "batch mixes trees {} and {}",
                first.tree_id, pair[1].tree_id
            )));
        }
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(Error::Validation(format!(
                "timestamp {} does not follow {}",
                pair[1].timestamp, pair[0].timestamp
            )));
        }
    }
    Ok(first.tree_id)
}

/// Appends a batch of leaves to one tree.
///
/// Each leaf increments the tree like a binary counter: full frontier nodes carry into a
/// fresh sibling, the first open node absorbs the leaf and every node above it is merely
/// extended. Hashes are not computed here; every branch whose coverage changes is tainted
/// and left for [`crate::tree::Rehasher::untaint`].
///
/// The frontier is read once, the batch is replayed in memory and the result is written
/// with one `create_many` and one `update_many` per distinct `(full, end)`.
pub fn push_leaves<H, Db>(db: &mut Db, leaves: Vec<Leaf<H>>) -> Result<PushSummary>
where
    H: Clone,
    Db: NodeReader<H> + NodeWriter<H>,
{
    let tree = validate_batch(&leaves)?;
    let first_ts = leaves[0].timestamp;

    let latest = db.latest_timestamp(&tree)?;
    if let Some(latest) = latest {
        if first_ts <= latest {
            return Err(Error::Validation(format!(
                "timestamp {first_ts} does not follow latest leaf {latest}"
            )));
        }
    }
    let predecessor = db.latest_end_before(&tree, first_ts)?;
    if predecessor != latest {
        return Err(Error::StructuralInconsistency(format!(
            "predecessor {predecessor:?} differs from latest leaf {latest:?}"
        )));
    }

    let mut frontier: Vec<Slot> = Vec::new();
    let mut root_level = 0;
    let mut earliest = first_ts;
    if let Some(max_ts) = predecessor {
        root_level = db
            .top(&tree)?
            .map(|root| root.level)
            .ok_or_else(|| Error::StructuralInconsistency("tree has leaves but no root".into()))?;
        earliest = db.earliest_timestamp(&tree)?.unwrap_or(first_ts);
        frontier = db
            .frontier(&tree, max_ts)?
            .iter()
            .map(Slot::existing)
            .collect();
        for (expected, slot) in (1..).zip(frontier.iter()) {
            if slot.level != expected {
                warn!(%tree, level = slot.level, expected, "gap in frontier");
                return Err(Error::StructuralInconsistency(format!(
                    "frontier has level {} where {expected} was expected",
                    slot.level
                )));
            }
        }
    }

    let mut has_leaves = predecessor.is_some();
    let mut retired: Vec<Slot> = Vec::new();
    let mut new_leaves = Vec::with_capacity(leaves.len());

    for leaf in leaves {
        let ts = leaf.timestamp;
        if has_leaves {
            let mut carrying = true;
            let (mut absorbed, mut touched, mut created) = (0, 0, 1);
            for slot in frontier.iter_mut() {
                if !carrying {
                    slot.end = ts;
                    slot.dirty = true;
                    touched += 1;
                } else if slot.full {
                    let sibling = Slot::created(slot.level, ts, ts, false);
                    let previous = std::mem::replace(slot, sibling);
                    if previous.dirty {
                        retired.push(previous);
                    }
                    created += 1;
                } else {
                    slot.full = true;
                    slot.end = ts;
                    slot.dirty = true;
                    carrying = false;
                    absorbed += 1;
                }
            }
            if absorbed + touched + created != root_level as usize + 1 {
                warn!(%tree, absorbed, touched, created, root_level, "frontier accounting failed");
                return Err(Error::StructuralInconsistency(format!(
                    "absorbed({absorbed}) + touched({touched}) + created({created}) != levels({})",
                    root_level + 1
                )));
            }
            if carrying {
                root_level += 1;
                frontier.push(Slot::created(root_level, earliest, ts, true));
            }
        } else {
            earliest = ts;
            has_leaves = true;
        }
        new_leaves.push(NewNode {
            tree_id: tree,
            level: 0,
            begin: ts,
            end: ts,
            full: true,
            hash: Some(leaf.content_hash),
        });
    }

    let mut creates: Vec<NewNode<H>> = Vec::new();
    let mut updates: BTreeMap<NodeUpdate, Vec<NodeId>> = BTreeMap::new();
    for slot in retired.into_iter().chain(frontier) {
        if !slot.dirty {
            continue;
        }
        match slot.id {
            Some(id) => updates
                .entry(NodeUpdate {
                    full: slot.full,
                    end: slot.end,
                })
                .or_default()
                .push(id),
            None => creates.push(NewNode {
                tree_id: tree,
                level: slot.level,
                begin: slot.begin,
                end: slot.end,
                full: slot.full,
                hash: None,
            }),
        }
    }

    let summary = PushSummary {
        leaves: new_leaves.len(),
        created: creates.len(),
        updated: updates.values().map(Vec::len).sum(),
        root_level,
    };

    creates.sort_by_key(|node| (node.level, node.begin));
    new_leaves.extend(creates);
    db.create_many(new_leaves)?;
    for (update, ids) in updates {
        db.update_many(&tree, &ids, update)?;
    }

    debug!(
        %tree,
        leaves = summary.leaves,
        created = summary.created,
        updated = summary.updated,
        root_level = summary.root_level,
        "pushed leaves"
    );
    Ok(summary)
}
