//! Proof streams: their in-memory form, their wire encoding, generation and verification.

/// Generates inclusion and consistency proofs by bounded traversal.
pub mod traversal;
/// Replays proof streams against a claimed root.
pub mod verify;

pub use traversal::ProofGenerator;
pub use verify::verify;

use crate::error::ProofError;
use crate::hash::MerkleHash;

/// One instruction of a proof stream.
///
/// A consumer pushes `hash` onto a stack. When `reduce` is non-zero it first pops the
/// last `reduce` entries and checks that they hash to `hash`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProofStep<H> {
    /// The hash of the node this step stands for
    pub hash: H,
    /// How many previously pushed entries combine into `hash`
    pub reduce: usize,
    /// Whether the node lies on the proven path
    pub is_path: bool,
}

/// An ordered proof stream. The hash of the last step is the root it proves against.
#[derive(Debug, PartialEq, Clone)]
pub struct Proof<M: MerkleHash> {
    /// The steps, in replay order
    pub steps: Vec<ProofStep<M::Output>>,
}

impl<M: MerkleHash> Default for Proof<M> {
    fn default() -> Self {
        Self {
            steps: Default::default(),
        }
    }
}

impl<M> Proof<M>
where
    M: MerkleHash + Default,
{
    /// Verify the proof against `root` with a default hasher
    pub fn verify(&self, root: &M::Output) -> Result<(), ProofError> {
        verify(&M::default(), &self.steps, root)
    }
}

impl<M: MerkleHash> Proof<M> {
    /// Verify the proof against `root` with the provided hasher
    pub fn verify_with_hasher(&self, root: &M::Output, hasher: &M) -> Result<(), ProofError> {
        verify(hasher, &self.steps, root)
    }

    /// Returns the root the proof commits to, if it has any steps.
    pub fn root(&self) -> Option<&M::Output> {
        self.steps.last().map(|step| &step.hash)
    }

    /// Returns true if the proof has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns the steps which lie on the proven path.
    pub fn path(&self) -> impl Iterator<Item = &ProofStep<M::Output>> {
        self.steps.iter().filter(|step| step.is_path)
    }

    /// Encodes the proof in its wire form.
    pub fn to_wire(&self) -> Vec<WireStep> {
        self.steps
            .iter()
            .map(|step| WireStep {
                hash: hex::encode(step.hash.as_ref()),
                reduce: step.reduce as u32,
                is_path: step.is_path,
            })
            .collect()
    }
}

impl<M> Proof<M>
where
    M: MerkleHash,
    M::Output: TryFrom<Vec<u8>>,
{
    /// Decodes a proof from its wire form.
    pub fn from_wire(steps: &[WireStep]) -> Result<Self, ProofError> {
        let steps = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let bytes = hex::decode(&step.hash).map_err(|e| {
                    ProofError::MalformedProof(format!("step {i}: invalid hex: {e}"))
                })?;
                let hash = <M::Output as TryFrom<Vec<u8>>>::try_from(bytes).map_err(|_| {
                    ProofError::MalformedProof(format!("step {i}: wrong hash width"))
                })?;
                Ok(ProofStep {
                    hash,
                    reduce: step.reduce as usize,
                    is_path: step.is_path,
                })
            })
            .collect::<Result<Vec<_>, ProofError>>()?;
        Ok(Self { steps })
    }
}

/// The wire form of one proof step. Hashes are lowercase hex.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WireStep {
    /// The step's hash, hex encoded
    pub hash: String,
    /// How many previous entries combine into `hash`
    pub reduce: u32,
    /// Whether the node lies on the proven path
    pub is_path: bool,
}
