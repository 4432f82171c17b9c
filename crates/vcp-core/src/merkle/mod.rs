//! Append-only Merkle batching of event hashes.
//!
//! # Tree construction
//!
//! - Leaf: `H(0x00 || event_hash)` over the raw 32 event-hash bytes.
//! - Interior node: `H(0x01 || left || right)`.
//! - A level with an odd number of nodes pairs its last node with itself.
//! - An empty batch has the all-zero root.
//!
//! The `0x00`/`0x01` prefixes keep leaf and interior hashes in separate
//! domains, so an interior node can never be presented as a leaf. The
//! duplicate-last-node rule means a leaf in the last odd slot can also be
//! "proved" at the phantom index to its right; verifiers in other
//! implementations rely on this exact shape, so it is preserved.
//!
//! # Lifecycle
//!
//! A batch is either an [`OpenBatch`] (accepting appends) or a
//! [`ClosedBatch`] (immutable, serves audit paths). Closing consumes the open
//! batch. [`MerkleAccumulator`] holds the current open batch behind a lock and
//! swaps in a fresh one on every close.

mod accumulator;
mod batch;
mod proof;

pub use accumulator::{LeafPosition, MerkleAccumulator};
pub use batch::{BatchRecord, ClosedBatch, MerkleRoot, OpenBatch};
pub use proof::{AuditPath, PathStep, Side, verify};

use crate::error::ErrorCode;
use crate::hash::{Digest, HashError, HashFunction};

/// Domain tag for leaf hashes.
pub const LEAF_PREFIX: u8 = 0x00;
/// Domain tag for interior node hashes.
pub const NODE_PREFIX: u8 = 0x01;

/// Errors from Merkle batch operations.
#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    /// The leaf index was never appended to this batch.
    #[error("leaf index {index} out of range for batch {batch_id} with {leaf_count} leaves")]
    IndexOutOfRange {
        index: u64,
        leaf_count: u64,
        batch_id: u64,
    },

    /// A persisted batch does not rebuild to its recorded root.
    #[error("batch {batch_id} root mismatch: recorded={recorded} rebuilt={rebuilt}")]
    RootMismatch {
        batch_id: u64,
        recorded: Digest,
        rebuilt: Digest,
    },

    /// The batch names a hash algorithm that is not available.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl MerkleError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            Self::RootMismatch { .. } => ErrorCode::HashMismatch,
            Self::Hash(e) => e.code(),
        }
    }
}

/// Domain-separated leaf hash of one event hash.
#[must_use]
pub fn leaf_hash(event_hash: &Digest, hasher: &dyn HashFunction) -> Digest {
    hasher.digest_parts(&[&[LEAF_PREFIX][..], &event_hash.as_bytes()[..]])
}

/// Domain-separated interior node hash.
#[must_use]
pub fn node_hash(left: &Digest, right: &Digest, hasher: &dyn HashFunction) -> Digest {
    hasher.digest_parts(&[
        &[NODE_PREFIX][..],
        &left.as_bytes()[..],
        &right.as_bytes()[..],
    ])
}

/// Build every level of the tree bottom-up from the leaf level.
///
/// `levels[0]` is the leaves and the last level holds the single root.
/// Odd levels are paired by duplicating their last node; the duplicate is
/// not stored.
pub(crate) fn build_levels(leaves: Vec<Digest>, hasher: &dyn HashFunction) -> Vec<Vec<Digest>> {
    let mut levels = vec![leaves];
    while levels.last().is_some_and(|level| level.len() > 1) {
        let below = &levels[levels.len() - 1];
        let parents: Vec<Digest> = below
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                node_hash(left, right, hasher)
            })
            .collect();
        levels.push(parents);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;

    #[test]
    fn leaf_and_node_domains_differ() {
        let alg = HashAlgorithm::Sha256;
        let a = Digest([1; 32]);
        let b = Digest([2; 32]);
        let mut concat = Vec::new();
        concat.extend_from_slice(a.as_bytes());
        concat.extend_from_slice(b.as_bytes());
        // Same bytes under the two prefixes must not collide.
        assert_ne!(
            alg.digest_parts(&[&[LEAF_PREFIX][..], &concat[..]]),
            node_hash(&a, &b, &alg)
        );
    }

    #[test]
    fn leaf_hash_layout() {
        let alg = HashAlgorithm::Sha256;
        let h = Digest([9; 32]);
        let mut input = vec![0x00];
        input.extend_from_slice(&[9; 32]);
        assert_eq!(leaf_hash(&h, &alg), alg.digest(&input));
    }

    #[test]
    fn build_levels_shapes() {
        let alg = HashAlgorithm::Sha256;
        let leaves: Vec<Digest> = (0u8..5).map(|i| Digest([i; 32])).collect();
        let levels = build_levels(leaves, &alg);
        let widths: Vec<usize> = levels.iter().map(Vec::len).collect();
        assert_eq!(widths, vec![5, 3, 2, 1]);
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        let alg = HashAlgorithm::Sha256;
        let leaves: Vec<Digest> = (0u8..3).map(|i| Digest([i; 32])).collect();
        let levels = build_levels(leaves.clone(), &alg);
        assert_eq!(levels[1][1], node_hash(&leaves[2], &leaves[2], &alg));
    }

    #[test]
    fn build_levels_single_leaf_is_root() {
        let alg = HashAlgorithm::Blake3;
        let leaf = Digest([4; 32]);
        let levels = build_levels(vec![leaf], &alg);
        assert_eq!(levels, vec![vec![leaf]]);
    }
}
