use serde::{Deserialize, Serialize};

use super::{leaf_hash, node_hash};
use crate::hash::{Digest, HashFunction};

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of an audit path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub hash: Digest,
    pub side: Side,
}

/// Inclusion proof for one leaf of a closed batch, leaf level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPath {
    pub batch_id: u64,
    pub leaf_index: u64,
    pub leaf_count: u64,
    pub siblings: Vec<PathStep>,
}

impl AuditPath {
    /// Root obtained by folding `event_hash` up through the siblings.
    #[must_use]
    pub fn fold(&self, event_hash: &Digest, hasher: &dyn HashFunction) -> Digest {
        self.siblings
            .iter()
            .fold(leaf_hash(event_hash, hasher), |acc, step| match step.side {
                Side::Left => node_hash(&step.hash, &acc, hasher),
                Side::Right => node_hash(&acc, &step.hash, hasher),
            })
    }
}

/// Check that `event_hash` is included under `root` via `path`.
///
/// Pure: needs nothing but its arguments, so a third party holding only the
/// event, the path and an anchored root can run it.
#[must_use]
pub fn verify(
    event_hash: &Digest,
    path: &AuditPath,
    root: &Digest,
    hasher: &dyn HashFunction,
) -> bool {
    if path.leaf_count == 0 || path.leaf_index > path.leaf_count {
        return false;
    }
    path.fold(event_hash, hasher) == *root
}
