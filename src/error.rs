use thiserror::Error;

/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// An error raised while mutating the tree or generating proofs.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// The leaf batch is malformed (empty, mixed trees, non-increasing timestamps), or a
    /// query parameter lies outside the tree's history. Raised before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The persisted nodes contradict the tree's shape: frontier accounting mismatch, a
    /// node with other than one or two children, or a child whose hash is unavailable.
    /// Indicates a bug in persisted state and must never be repaired silently.
    #[error("structural inconsistency: {0}")]
    StructuralInconsistency(String),
    /// The queried tree, leaf or node is absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// The node store rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),
}

/// An error that occurred while checking or decoding a proof stream.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProofError {
    /// The proof contains no steps, so it cannot commit to any root.
    #[error("proof is empty")]
    EmptyProof,
    /// A step asked to reduce more entries than the stack holds.
    #[error("step {step} reduces {reduce} entries but the stack holds {available}")]
    StackUnderflow {
        /// Index of the offending step
        step: usize,
        /// Entries requested by the step
        reduce: usize,
        /// Entries on the stack at that point
        available: usize,
    },
    /// The hash of the reduced entries does not match the hash claimed by the step.
    #[error("step {step} does not hash to its children")]
    HashMismatch {
        /// Index of the offending step
        step: usize,
    },
    /// More than one entry was left on the stack after the replay.
    #[error("{0} entries left on the stack after replay")]
    DanglingEntries(usize),
    /// The replay succeeded but ended on a different root.
    #[error("proof does not verify against the provided root")]
    InvalidRoot,
    /// A catch all error which indicates that the proof could not be decoded
    #[error("malformed proof: {0}")]
    MalformedProof(String),
}
