//! Incremental construction of the tree: appending leaves and restoring stale hashes.

/// Appends leaves by binary carry propagation.
pub mod builder;
/// Recomputes tainted hashes bottom-up.
pub mod rehash;

pub use builder::{push_leaves, validate_batch, PushSummary};
pub use rehash::Rehasher;
