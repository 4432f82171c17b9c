//! Anchoring decisions: when to close a batch, which target to use, what to
//! retry and when to give up.
//!
//! The manager owns no thread and no timer. Every entry point takes `now`
//! and returns what happened; the caller (see [`super::scheduler`]) decides
//! how often to call and how long to wait between retry rounds.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::state::{AbandonedAnchor, AnchorState, PendingAnchor};
use super::timeout::{InFlight, anchor_with_timeout};
use super::{AnchorError, AnchorOutcome, AnchorRecord, AnchorTarget, TargetFailure};
use crate::merkle::{ClosedBatch, MerkleAccumulator, MerkleRoot};

/// Interval, retry limit and per-target timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPolicy {
    pub interval: Duration,
    pub max_retries: u32,
    pub target_timeout: StdDuration,
}

impl AnchorPolicy {
    /// When a batch anchored at `at` makes the next one due.
    ///
    /// Saturates at the latest representable instant, which is never due.
    #[must_use]
    pub fn due_after(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.checked_add_signed(self.interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for AnchorPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::hours(1),
            max_retries: 5,
            target_timeout: StdDuration::from_secs(30),
        }
    }
}

/// Result of [`AnchorManager::maybe_anchor`].
///
/// Every variant but `NotDue` carries the batch that was closed, which the
/// caller keeps to serve audit paths.
#[derive(Debug)]
pub enum TickOutcome {
    /// The interval has not elapsed; nothing was closed.
    NotDue { next_due: DateTime<Utc> },
    /// The batch was closed with no leaves; nothing was sent to targets.
    Empty(Arc<ClosedBatch>),
    Anchored {
        batch: Arc<ClosedBatch>,
        record: AnchorRecord,
    },
    /// Every target failed. `error` is [`AnchorError::AllTargetsFailed`] and
    /// the root is already in the pending queue.
    Queued {
        batch: Arc<ClosedBatch>,
        error: AnchorError,
    },
}

impl TickOutcome {
    /// The batch closed by this tick, if any.
    #[must_use]
    pub const fn batch(&self) -> Option<&Arc<ClosedBatch>> {
        match self {
            Self::NotDue { .. } => None,
            Self::Empty(batch) | Self::Anchored { batch, .. } | Self::Queued { batch, .. } => {
                Some(batch)
            }
        }
    }

    /// The anchoring failure this tick surfaced, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&AnchorError> {
        match self {
            Self::Queued { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result of [`AnchorManager::flush`].
#[derive(Debug)]
pub enum FlushOutcome {
    Empty(Arc<ClosedBatch>),
    Anchored {
        batch: Arc<ClosedBatch>,
        record: AnchorRecord,
    },
    /// The final anchor failed; the root is in the pending queue.
    Queued(Arc<ClosedBatch>),
}

impl FlushOutcome {
    #[must_use]
    pub const fn batch(&self) -> &Arc<ClosedBatch> {
        match self {
            Self::Empty(batch) | Self::Anchored { batch, .. } | Self::Queued(batch) => batch,
        }
    }
}

/// What one [`AnchorManager::retry_pending`] round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub anchored: Vec<AnchorRecord>,
    pub still_pending: usize,
    /// Entries that ran out of retries this round. Each root appears here
    /// exactly once.
    pub abandoned: Vec<AbandonedAnchor>,
}

impl RetryReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.anchored.len() + self.still_pending + self.abandoned.len()
    }

    /// Errors for every abandoned root, for callers that escalate per root.
    #[must_use]
    pub fn exhausted(&self) -> Vec<AnchorError> {
        self.abandoned
            .iter()
            .map(|a| AnchorError::RetryExhausted {
                batch_id: a.merkle_root.batch_id,
                merkle_root: a.merkle_root.root,
                retry_count: a.retry_count,
            })
            .collect()
    }
}

/// Ordered-fallback anchoring with a persistent retry queue.
pub struct AnchorManager {
    targets: Vec<Arc<dyn AnchorTarget>>,
    /// Running attempt threads, one counter per target.
    in_flight: Vec<InFlight>,
    policy: AnchorPolicy,
    state: AnchorState,
}

impl std::fmt::Debug for AnchorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorManager")
            .field(
                "targets",
                &self.targets.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}

impl AnchorManager {
    /// Build a manager over `targets` (first is primary) resuming `state`.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::NoTargets`] if `targets` is empty.
    pub fn new(
        targets: Vec<Arc<dyn AnchorTarget>>,
        policy: AnchorPolicy,
        state: AnchorState,
    ) -> Result<Self, AnchorError> {
        if targets.is_empty() {
            return Err(AnchorError::NoTargets);
        }
        Ok(Self {
            in_flight: targets.iter().map(|_| InFlight::new()).collect(),
            targets,
            policy,
            state,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &AnchorState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> AnchorState {
        self.state
    }

    #[must_use]
    pub const fn policy(&self) -> &AnchorPolicy {
        &self.policy
    }

    #[must_use]
    pub fn targets(&self) -> &[Arc<dyn AnchorTarget>] {
        &self.targets
    }

    /// Earliest time the next batch is due, or `None` if due now because
    /// nothing was ever anchored.
    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.state.last_anchor_at.map(|at| self.policy.due_after(at))
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due().is_none_or(|due| now >= due)
    }

    /// Close and anchor the open batch if the interval has elapsed since the
    /// last successful anchor.
    ///
    /// The accumulator lock is held only while swapping batches; target I/O
    /// happens after it is released, so appends continue throughout. A total
    /// anchoring failure is reported as [`TickOutcome::Queued`] rather than an
    /// `Err` so the closed batch is never lost with it.
    pub fn maybe_anchor(
        &mut self,
        accumulator: &MerkleAccumulator,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        if let Some(next_due) = self.next_due().filter(|due| now < *due) {
            return TickOutcome::NotDue { next_due };
        }
        let batch = accumulator.close(now);
        if batch.root().is_empty() {
            debug!(batch_id = batch.root().batch_id, "empty batch; nothing to anchor");
            self.state.last_anchor_at = Some(now);
            return TickOutcome::Empty(batch);
        }
        match self.anchor(batch.root(), now) {
            Ok(record) => TickOutcome::Anchored { batch, record },
            Err(error) => TickOutcome::Queued { batch, error },
        }
    }

    /// Try every target in order until one succeeds.
    ///
    /// Pure with respect to manager state; [`Self::anchor`] records the result.
    #[must_use]
    pub fn attempt(&self, root: &MerkleRoot, now: DateTime<Utc>) -> AnchorOutcome {
        let mut failures = Vec::new();
        for (target, in_flight) in self.targets.iter().zip(&self.in_flight) {
            match anchor_with_timeout(target, in_flight, root, now, self.policy.target_timeout) {
                Ok(record) => {
                    return AnchorOutcome::Anchored {
                        record,
                        skipped: failures,
                    };
                }
                Err(err) => {
                    warn!(
                        target_name = target.name(),
                        batch_id = root.batch_id,
                        code = %err.code(),
                        error = %err,
                        "anchor target failed; trying next"
                    );
                    failures.push(TargetFailure {
                        target: target.name().to_owned(),
                        error: err,
                    });
                }
            }
        }
        AnchorOutcome::Failed(failures)
    }

    /// Anchor `root`, queueing it for retry if every target fails.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::AllTargetsFailed`] after queueing the root.
    pub fn anchor(
        &mut self,
        root: &MerkleRoot,
        now: DateTime<Utc>,
    ) -> Result<AnchorRecord, AnchorError> {
        match self.attempt(root, now) {
            AnchorOutcome::Anchored { record, skipped } => {
                info!(
                    batch_id = root.batch_id,
                    root = %root.root,
                    target_name = %record.target_identifier,
                    fallbacks_used = skipped.len(),
                    "merkle root anchored"
                );
                self.state.last_anchor_at = Some(now);
                Ok(record)
            }
            AnchorOutcome::Failed(failures) => {
                warn!(
                    batch_id = root.batch_id,
                    root = %root.root,
                    targets = failures.len(),
                    "all anchor targets failed; root queued for retry"
                );
                self.state
                    .enqueue(PendingAnchor::new(root.clone(), now, failures.clone()));
                Err(AnchorError::AllTargetsFailed {
                    batch_id: root.batch_id,
                    merkle_root: root.root,
                    failures,
                })
            }
        }
    }

    /// Attempt every pending root once.
    ///
    /// Successes leave the queue. Failures bump `retry_count`; an entry whose
    /// count exceeds `max_retries` moves to the abandoned list and is returned
    /// in this report only.
    pub fn retry_pending(&mut self, now: DateTime<Utc>) -> RetryReport {
        let mut report = RetryReport::default();
        let queue = std::mem::take(&mut self.state.pending);
        for mut entry in queue {
            match self.attempt(&entry.merkle_root, now) {
                AnchorOutcome::Anchored { record, .. } => {
                    info!(
                        batch_id = entry.merkle_root.batch_id,
                        retries = entry.retry_count + 1,
                        target_name = %record.target_identifier,
                        "pending root anchored on retry"
                    );
                    report.anchored.push(record);
                }
                AnchorOutcome::Failed(failures) => {
                    entry.retry_count = entry.retry_count.saturating_add(1);
                    entry.last_failures = failures;
                    if entry.retry_count > self.policy.max_retries {
                        error!(
                            batch_id = entry.merkle_root.batch_id,
                            root = %entry.merkle_root.root,
                            retry_count = entry.retry_count,
                            queued_at = %entry.queued_at,
                            "anchor retries exhausted; root abandoned and needs manual anchoring"
                        );
                        let abandoned = AbandonedAnchor {
                            merkle_root: entry.merkle_root,
                            queued_at: entry.queued_at,
                            abandoned_at: now,
                            retry_count: entry.retry_count,
                            last_failures: entry.last_failures,
                        };
                        self.state.abandoned.push(abandoned.clone());
                        report.abandoned.push(abandoned);
                    } else {
                        debug!(
                            batch_id = entry.merkle_root.batch_id,
                            retry_count = entry.retry_count,
                            "retry failed; root stays queued"
                        );
                        self.state.pending.push(entry);
                    }
                }
            }
        }
        report.still_pending = self.state.pending.len();
        report
    }

    /// Close whatever is open and make one attempt to anchor it.
    ///
    /// Used on shutdown. Never returns an error: a failed final anchor is
    /// queued and left for the next process to retry.
    pub fn flush(&mut self, accumulator: &MerkleAccumulator, now: DateTime<Utc>) -> FlushOutcome {
        let batch = accumulator.close(now);
        if batch.root().is_empty() {
            return FlushOutcome::Empty(batch);
        }
        match self.anchor(batch.root(), now) {
            Ok(record) => FlushOutcome::Anchored { batch, record },
            Err(err) => {
                warn!(
                    batch_id = batch.root().batch_id,
                    error = %err,
                    "final anchor failed; left queued"
                );
                FlushOutcome::Queued(batch)
            }
        }
    }
}
