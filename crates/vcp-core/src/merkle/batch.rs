use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proof::{AuditPath, PathStep, Side};
use super::{MerkleError, build_levels, leaf_hash};
use crate::hash::{Digest, HashFunction, HashRegistry};

/// Immutable summary of a closed batch: the value that gets anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleRoot {
    pub batch_id: u64,
    pub root: Digest,
    pub leaf_count: u64,
    pub closed_at: DateTime<Utc>,
    pub hash_algo: String,
}

impl MerkleRoot {
    /// True for the all-zero root of a batch with no leaves.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }
}

// ---------------------------------------------------------------------------
// OpenBatch
// ---------------------------------------------------------------------------

/// A batch accepting appends.
pub struct OpenBatch {
    batch_id: u64,
    hasher: Arc<dyn HashFunction>,
    leaves: Vec<Digest>,
    opened_at: DateTime<Utc>,
}

impl fmt::Debug for OpenBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenBatch")
            .field("batch_id", &self.batch_id)
            .field("hash_algo", &self.hasher.name())
            .field("leaves", &self.leaves.len())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

impl OpenBatch {
    #[must_use]
    pub fn new(batch_id: u64, hasher: Arc<dyn HashFunction>, opened_at: DateTime<Utc>) -> Self {
        Self {
            batch_id,
            hasher,
            leaves: Vec::new(),
            opened_at,
        }
    }

    /// Append an event hash and return its leaf index.
    pub fn append(&mut self, event_hash: &Digest) -> u64 {
        let index = self.leaves.len() as u64;
        self.leaves.push(leaf_hash(event_hash, self.hasher.as_ref()));
        index
    }

    #[must_use]
    pub const fn batch_id(&self) -> u64 {
        self.batch_id
    }

    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Close the batch, building the tree and computing its root.
    #[must_use]
    pub fn close(self, closed_at: DateTime<Utc>) -> ClosedBatch {
        ClosedBatch::build(self.batch_id, self.leaves, closed_at, self.hasher)
    }
}

// ---------------------------------------------------------------------------
// ClosedBatch
// ---------------------------------------------------------------------------

/// A closed, immutable batch. Safe to share across reader threads.
pub struct ClosedBatch {
    root: MerkleRoot,
    levels: Vec<Vec<Digest>>,
    hasher: Arc<dyn HashFunction>,
}

impl fmt::Debug for ClosedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedBatch")
            .field("root", &self.root)
            .field("depth", &self.levels.len())
            .finish_non_exhaustive()
    }
}

impl ClosedBatch {
    fn build(
        batch_id: u64,
        leaves: Vec<Digest>,
        closed_at: DateTime<Utc>,
        hasher: Arc<dyn HashFunction>,
    ) -> Self {
        let leaf_count = leaves.len() as u64;
        let (levels, root) = if leaves.is_empty() {
            (Vec::new(), Digest::ZERO)
        } else {
            let levels = build_levels(leaves, hasher.as_ref());
            let root = levels
                .last()
                .and_then(|top| top.first())
                .copied()
                .unwrap_or(Digest::ZERO);
            (levels, root)
        };
        Self {
            root: MerkleRoot {
                batch_id,
                root,
                leaf_count,
                closed_at,
                hash_algo: hasher.name().to_owned(),
            },
            levels,
            hasher,
        }
    }

    /// Rebuild a closed batch from its persisted record, checking the root.
    ///
    /// # Errors
    ///
    /// Returns [`MerkleError::Hash`] if the record's algorithm is not in
    /// `registry`, or [`MerkleError::RootMismatch`] if the leaves do not
    /// produce the recorded root.
    pub fn from_record(record: BatchRecord, registry: &HashRegistry) -> Result<Self, MerkleError> {
        let hasher = registry.resolve(&record.root.hash_algo)?;
        let rebuilt = Self::build(
            record.root.batch_id,
            record.leaves,
            record.root.closed_at,
            hasher,
        );
        if rebuilt.root.root != record.root.root
            || rebuilt.root.leaf_count != record.root.leaf_count
        {
            return Err(MerkleError::RootMismatch {
                batch_id: record.root.batch_id,
                recorded: record.root.root,
                rebuilt: rebuilt.root.root,
            });
        }
        Ok(rebuilt)
    }

    /// Persistable form: the root plus the leaf hashes needed for proofs.
    #[must_use]
    pub fn to_record(&self) -> BatchRecord {
        BatchRecord {
            root: self.root.clone(),
            leaves: self.leaves().to_vec(),
        }
    }

    #[must_use]
    pub const fn root(&self) -> &MerkleRoot {
        &self.root
    }

    /// Domain-separated leaf hashes in append order.
    #[must_use]
    pub fn leaves(&self) -> &[Digest] {
        self.levels.first().map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn hasher(&self) -> &dyn HashFunction {
        self.hasher.as_ref()
    }

    /// Sibling path from leaf `leaf_index` up to the root.
    ///
    /// At each level the sibling of node `i` is `i ^ 1`; when that falls off
    /// the end of an odd level the node is its own sibling, mirroring the
    /// duplication done while building.
    ///
    /// # Errors
    ///
    /// Returns [`MerkleError::IndexOutOfRange`] if the index was never
    /// appended to this batch.
    pub fn audit_path(&self, leaf_index: u64) -> Result<AuditPath, MerkleError> {
        let out_of_range = || MerkleError::IndexOutOfRange {
            index: leaf_index,
            leaf_count: self.root.leaf_count,
            batch_id: self.root.batch_id,
        };
        let mut idx = usize::try_from(leaf_index).map_err(|_| out_of_range())?;
        if idx >= self.leaves().len() {
            return Err(out_of_range());
        }

        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_idx, side) = if idx % 2 == 0 {
                (idx + 1, Side::Right)
            } else {
                (idx - 1, Side::Left)
            };
            let hash = level.get(sibling_idx).unwrap_or(&level[idx]);
            siblings.push(PathStep { hash: *hash, side });
            idx /= 2;
        }

        Ok(AuditPath {
            batch_id: self.root.batch_id,
            leaf_index,
            leaf_count: self.root.leaf_count,
            siblings,
        })
    }
}

/// Serialized form of a closed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub root: MerkleRoot,
    pub leaves: Vec<Digest>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
