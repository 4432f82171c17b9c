//! Bounded single-target attempts.
//!
//! A target that hangs must not hang the scheduler. Each attempt runs on its
//! own thread; the caller waits at most `timeout` for the answer. A late
//! answer is dropped with the channel.
//!
//! A timed-out attempt thread cannot be cancelled and keeps running until the
//! target returns. [`InFlight`] counts those threads per target so a target
//! that never returns holds at most [`MAX_IN_FLIGHT`] of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::{AnchorRecord, AnchorTarget, TargetError};
use crate::merkle::MerkleRoot;

/// Attempts one target may have running at once, counting abandoned ones.
pub const MAX_IN_FLIGHT: usize = 2;

/// Running attempt threads for one target.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn try_enter(&self) -> Result<InFlightGuard, usize> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_IN_FLIGHT).then_some(n + 1)
            })
            .map(|_| InFlightGuard(Arc::clone(&self.0)))
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run `target.anchor(root)` and wait at most `timeout` for it.
///
/// On timeout the attempt thread is left running and stays counted in
/// `in_flight` until the target returns.
///
/// # Errors
///
/// Returns the target's own error, [`TargetError::Timeout`] when no answer
/// arrives in time, [`TargetError::Busy`] when `in_flight` is already at
/// [`MAX_IN_FLIGHT`], or [`TargetError::Aborted`] if the attempt thread could
/// not be started or died without answering.
pub fn anchor_with_timeout(
    target: &Arc<dyn AnchorTarget>,
    in_flight: &InFlight,
    root: &MerkleRoot,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<AnchorRecord, TargetError> {
    let guard = in_flight.try_enter().map_err(TargetError::Busy)?;
    let (tx, rx) = mpsc::sync_channel(1);
    let worker_target = Arc::clone(target);
    let worker_root = root.clone();
    let spawned = thread::Builder::new()
        .name(format!("anchor-{}", target.name()))
        .spawn(move || {
            // Declared after `tx` so an unwinding target frees its slot first.
            let tx = tx;
            let guard = guard;
            let result = worker_target.anchor(&worker_root, now);
            // Free the slot before the caller can observe the answer.
            drop(guard);
            // The receiver may have given up already.
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        warn!(target_name = target.name(), error = %e, "could not start anchor attempt");
        return Err(TargetError::Aborted);
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(TargetError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(TargetError::Aborted),
    }
}
