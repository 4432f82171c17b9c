use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::batch::{ClosedBatch, OpenBatch};
use crate::hash::{Digest, HashFunction};

/// Where an appended event hash landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafPosition {
    pub batch_id: u64,
    pub index: u64,
}

/// Shared front end over the current open batch.
///
/// `append` and `close` take the same lock, so a close always sees a final
/// leaf set. The lock covers the swap only; tree construction for the closed
/// batch happens after it is released.
#[derive(Debug)]
pub struct MerkleAccumulator {
    hasher: Arc<dyn HashFunction>,
    open: Mutex<OpenBatch>,
}

impl MerkleAccumulator {
    #[must_use]
    pub fn new(hasher: Arc<dyn HashFunction>, first_batch_id: u64, now: DateTime<Utc>) -> Self {
        let open = OpenBatch::new(first_batch_id, Arc::clone(&hasher), now);
        Self {
            hasher,
            open: Mutex::new(open),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OpenBatch> {
        // OpenBatch has no invariant a panicking appender could break.
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one event hash to the open batch.
    pub fn append(&self, event_hash: &Digest) -> LeafPosition {
        let mut open = self.lock();
        let index = open.append(event_hash);
        let batch_id = open.batch_id();
        drop(open);
        debug!(batch_id, index, %event_hash, "leaf appended");
        LeafPosition { batch_id, index }
    }

    /// Close the open batch and start the next one.
    ///
    /// Batch ids increase by one per close, empty batches included.
    pub fn close(&self, now: DateTime<Utc>) -> Arc<ClosedBatch> {
        let finished = {
            let mut open = self.lock();
            let next = OpenBatch::new(open.batch_id() + 1, Arc::clone(&self.hasher), now);
            std::mem::replace(&mut *open, next)
        };
        let closed = finished.close(now);
        let root = closed.root();
        debug!(
            batch_id = root.batch_id,
            leaf_count = root.leaf_count,
            root = %root.root,
            "batch closed"
        );
        Arc::new(closed)
    }

    /// Leaves appended to the open batch so far.
    #[must_use]
    pub fn pending_leaves(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn current_batch_id(&self) -> u64 {
        self.lock().batch_id()
    }

    #[must_use]
    pub fn hasher(&self) -> &Arc<dyn HashFunction> {
        &self.hasher
    }
}
