use std::{fmt::Debug, hash::Hash};

use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

/// The length of a production hash in bytes
pub const HASH_LEN: usize = 32;

/// A domain separator indicating that a digest covers the children of an internal node.
/// Leaves carry an externally supplied digest and are never prefixed.
pub const INTERNAL_NODE_DOMAIN_SEPARATOR: [u8; 1] = [1u8];

/// A trait for hashing the nodes of the tree.
///
/// Implementations provide the raw digest. Internal nodes default to
/// `digest(0x01 || child_0 || child_1)`; a hasher may override `hash_children`, and the
/// builder, the proof generator and any remote verifier must then agree on the override.
pub trait MerkleHash {
    /// The output of this hasher.
    type Output: Debug + PartialEq + Eq + Clone + Hash + AsRef<[u8]>;

    /// Hashes arbitrary bytes.
    fn digest(&self, data: &[u8]) -> Self::Output;

    /// Hashes the ordered children of an internal node into the node's hash.
    fn hash_children(&self, children: &[Self::Output]) -> Self::Output {
        let len = children.iter().map(|c| c.as_ref().len()).sum::<usize>();
        let mut preimage = BytesMut::with_capacity(1 + len);
        preimage.put_slice(&INTERNAL_NODE_DOMAIN_SEPARATOR);
        for child in children {
            preimage.put_slice(child.as_ref());
        }
        self.digest(&preimage)
    }
}

/// A sha256 hasher. Internal nodes are domain separated by a `0x01` prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    /// Create a new instance of the hasher
    pub fn new() -> Self {
        Sha256Hasher
    }
}

impl MerkleHash for Sha256Hasher {
    type Output = [u8; HASH_LEN];

    fn digest(&self, data: &[u8]) -> Self::Output {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

/// A sha256 hasher which combines children over their lowercase hex text:
/// `sha256(0x01 || hex(child_0) || hex(child_1))`.
///
/// Proofs built with it replay in verifiers which only ever handle the hex strings of the
/// wire form and concatenate them as text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256HexHasher;

impl MerkleHash for Sha256HexHasher {
    type Output = [u8; HASH_LEN];

    fn digest(&self, data: &[u8]) -> Self::Output {
        Sha256Hasher.digest(data)
    }

    fn hash_children(&self, children: &[Self::Output]) -> Self::Output {
        let mut preimage = BytesMut::with_capacity(1 + children.len() * 2 * HASH_LEN);
        preimage.put_slice(&INTERNAL_NODE_DOMAIN_SEPARATOR);
        for child in children {
            preimage.put_slice(hex::encode(child).as_bytes());
        }
        self.digest(&preimage)
    }
}

/// A hasher which returns its input with the leading domain separator stripped.
///
/// Combining `b"ab"` and `b"cd"` yields `b"abcd"`, which makes the shape of a tree readable
/// directly from its root. Only useful for tests and debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityHasher;

impl MerkleHash for IdentityHasher {
    type Output = Bytes;

    fn digest(&self, data: &[u8]) -> Self::Output {
        match data.split_first() {
            Some((_, rest)) => Bytes::copy_from_slice(rest),
            None => Bytes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_concatenates_children() {
        let hasher = IdentityHasher;
        let children = [Bytes::from_static(b"H1"), Bytes::from_static(b"H2")];
        assert_eq!(hasher.hash_children(&children), Bytes::from_static(b"H1H2"));
        assert_eq!(
            hasher.hash_children(&children[..1]),
            Bytes::from_static(b"H1")
        );
    }

    #[test]
    fn test_sha256_children_are_domain_separated() {
        let hasher = Sha256Hasher::new();
        let left = hasher.digest(b"left");
        let right = hasher.digest(b"right");

        let mut preimage = vec![1u8];
        preimage.extend_from_slice(&left);
        preimage.extend_from_slice(&right);
        assert_eq!(hasher.hash_children(&[left, right]), hasher.digest(&preimage));
        assert_ne!(hasher.hash_children(&[left, right]), hasher.digest(&preimage[1..]));
    }

    #[test]
    fn test_hex_hasher_combines_text() {
        let left = Sha256Hasher.digest(b"left");
        let right = Sha256Hasher.digest(b"right");
        let text = format!("\x01{}{}", hex::encode(left), hex::encode(right));
        assert_eq!(
            Sha256HexHasher.hash_children(&[left, right]),
            Sha256Hasher.digest(text.as_bytes())
        );
        assert_ne!(
            Sha256HexHasher.hash_children(&[left, right]),
            Sha256Hasher.hash_children(&[left, right])
        );
    }

    #[test]
    fn test_sha256_empty_digest() {
        assert_eq!(
            hex::encode(Sha256Hasher.digest(&[])),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
