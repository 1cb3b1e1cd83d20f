use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};

use crate::node::TreeId;

/// One mutex per tree, created on first use and dropped once nobody holds or awaits it.
///
/// Appends to the same tree are serialized; appends to different trees never contend
/// beyond the brief lookup in the map.
#[derive(Debug, Default)]
pub struct TreeLocks {
    locks: Mutex<HashMap<TreeId, Arc<Mutex<()>>>>,
}

/// Guard held for the duration of one append cycle on a tree.
pub struct TreeGuard<'a> {
    locks: &'a TreeLocks,
    tree: TreeId,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl std::fmt::Debug for TreeGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeGuard")
            .field("locks", &self.locks)
            .field("tree", &self.tree)
            .field("held", &self.guard.is_some())
            .finish()
    }
}

impl TreeGuard<'_> {
    /// The tree this guard holds
    pub fn tree(&self) -> &TreeId {
        &self.tree
    }
}

impl Drop for TreeGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only handed out under the map lock, so a count of one means the map
        // holds the last reference.
        let mut locks = self.locks.locks.lock();
        if locks
            .get(&self.tree)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.tree);
        }
    }
}

impl TreeLocks {
    /// Creates an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, tree: &TreeId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(*tree).or_default().clone()
    }

    /// Blocks until `tree` is free and returns a guard over it.
    pub fn lock(&self, tree: &TreeId) -> TreeGuard<'_> {
        let guard = self.entry(tree).lock_arc();
        TreeGuard {
            locks: self,
            tree: *tree,
            guard: Some(guard),
        }
    }

    /// Returns a guard over `tree` if nobody holds it.
    pub fn try_lock(&self, tree: &TreeId) -> Option<TreeGuard<'_>> {
        let guard = self.entry(tree).try_lock_arc();
        // Build the guard either way so a failed attempt still evicts an idle entry.
        let guard = TreeGuard {
            locks: self,
            tree: *tree,
            guard,
        };
        guard.guard.is_some().then_some(guard)
    }

    /// The number of trees currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no tree is locked or awaited.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
