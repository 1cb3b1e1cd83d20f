use tracing::trace;

use super::ProofStep;
use crate::error::ProofError;
use crate::hash::MerkleHash;

/// Replays `steps` on a stack and checks that they reduce to `root`.
///
/// Every step with a non-zero `reduce` must hash exactly to the entries it pops, so a
/// stream that verifies commits to every hash it mentions. The replay must leave a single
/// entry, equal to `root`.
pub fn verify<M: MerkleHash>(
    hasher: &M,
    steps: &[ProofStep<M::Output>],
    root: &M::Output,
) -> Result<(), ProofError> {
    if steps.is_empty() {
        return Err(ProofError::EmptyProof);
    }

    let mut stack: Vec<M::Output> = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if step.reduce > 0 {
            if step.reduce > stack.len() {
                return Err(ProofError::StackUnderflow {
                    step: i,
                    reduce: step.reduce,
                    available: stack.len(),
                });
            }
            let children = stack.split_off(stack.len() - step.reduce);
            if hasher.hash_children(&children) != step.hash {
                trace!(step = i, reduce = step.reduce, "reduction mismatch");
                return Err(ProofError::HashMismatch { step: i });
            }
        }
        stack.push(step.hash.clone());
    }

    match stack.as_slice() {
        [top] if top == root => Ok(()),
        [_] => Err(ProofError::InvalidRoot),
        entries => Err(ProofError::DanglingEntries(entries.len())),
    }
}
