//! External anchoring of closed Merkle roots.
//!
//! An [`AnchorTarget`] commits a root to some independent, tamper-evident
//! system (a timestamping authority, a blockchain, a certified ledger) and
//! returns an [`AnchorRecord`] holding a target-specific proof. Targets are
//! capabilities: the core never speaks their wire protocols.
//!
//! [`manager::AnchorManager`] walks the configured targets in order and
//! returns the first success. When every target fails, the root goes to a
//! persistent retry queue and the failure is surfaced as
//! [`AnchorError::AllTargetsFailed`]. Per-root lifecycle:
//!
//! ```text
//! READY -> ANCHORING -> { ANCHORED, QUEUED_FOR_RETRY } -> ( ANCHORED | ABANDONED )
//! ```

pub mod backoff;
pub mod file;
pub mod manager;
pub mod scheduler;
pub mod state;
pub mod timeout;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::hash::Digest;
use crate::merkle::MerkleRoot;

pub use backoff::Backoff;
pub use file::FileLedgerTarget;
pub use manager::{AnchorManager, AnchorPolicy, FlushOutcome, RetryReport, TickOutcome};
pub use scheduler::{AnchorScheduler, SchedulerConfig};
pub use state::{AbandonedAnchor, AnchorState, PendingAnchor, StateError};

/// Kind of external system a target commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorType {
    OpenTimestamps,
    Rfc3161,
    CertifiedDatabase,
    Blockchain,
    FileLedger,
}

impl AnchorType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenTimestamps => "open_timestamps",
            Self::Rfc3161 => "rfc3161",
            Self::CertifiedDatabase => "certified_database",
            Self::Blockchain => "blockchain",
            Self::FileLedger => "file_ledger",
        }
    }
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful anchoring attempt. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor_type: AnchorType,
    pub target_identifier: String,
    pub merkle_root: Digest,
    pub batch_id: u64,
    pub anchored_at: DateTime<Utc>,
    /// Target-specific proof; opaque to the core.
    pub proof: String,
}

/// Why a single target did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TargetError {
    /// The target answered with an error.
    #[error("{0}")]
    Rejected(String),

    /// The target did not answer within the per-target timeout.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(#[serde(with = "duration_millis")] Duration),

    /// The worker running the attempt went away without answering.
    #[error("attempt aborted before returning a result")]
    Aborted,

    /// Earlier timed-out attempts on this target are still running, so no
    /// new one was started.
    #[error("{0} earlier attempts still running")]
    Busy(usize),
}

impl TargetError {
    #[must_use]
    pub fn rejected(reason: impl fmt::Display) -> Self {
        Self::Rejected(reason.to_string())
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::AnchorTimeout,
            Self::Rejected(_) | Self::Aborted | Self::Busy(_) => ErrorCode::AnchorFailure,
        }
    }
}

/// One target's failure during an ordered attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: TargetError,
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

/// Outcome of trying every target in order for one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorOutcome {
    /// The first target to succeed, plus the failures of the ones before it.
    Anchored {
        record: AnchorRecord,
        skipped: Vec<TargetFailure>,
    },
    /// Every target failed, in configured order.
    Failed(Vec<TargetFailure>),
}

/// A system that can commit a Merkle root and later check its own proofs.
pub trait AnchorTarget: Send + Sync {
    /// Stable identifier used in records and logs.
    fn name(&self) -> &str;

    fn anchor_type(&self) -> AnchorType;

    /// Commit `root`. Must not retry internally; the manager owns fallback
    /// and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] when the root was not committed.
    fn anchor(&self, root: &MerkleRoot, now: DateTime<Utc>) -> Result<AnchorRecord, TargetError>;

    /// Whether `record` is a proof this target issued and can still confirm.
    fn can_verify(&self, record: &AnchorRecord) -> bool;
}

/// Errors surfaced by the anchor manager.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    /// Every target failed; the root has been queued for retry.
    #[error(
        "all {} anchor targets failed for batch {batch_id} root {merkle_root}; queued for retry",
        .failures.len()
    )]
    AllTargetsFailed {
        batch_id: u64,
        merkle_root: Digest,
        failures: Vec<TargetFailure>,
    },

    /// A pending root exceeded the retry limit and was abandoned.
    #[error("batch {batch_id} root {merkle_root} abandoned after {retry_count} retries")]
    RetryExhausted {
        batch_id: u64,
        merkle_root: Digest,
        retry_count: u32,
    },

    /// The manager was built without targets.
    #[error("no anchor targets configured")]
    NoTargets,

    #[error(transparent)]
    State(#[from] StateError),
}

impl AnchorError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AllTargetsFailed { .. } => ErrorCode::AllTargetsFailed,
            Self::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            Self::NoTargets => ErrorCode::NoAnchorTargets,
            Self::State(e) => e.code(),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
