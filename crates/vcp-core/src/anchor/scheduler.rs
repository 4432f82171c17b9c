//! Background driver for the anchor manager.
//!
//! The manager decides; the scheduler only calls it. One thread owns the
//! [`AnchorManager`] outright, so the pending queue has a single writer.
//! Each tick it asks whether a batch is due and, when the backoff allows,
//! runs a retry round. [`AnchorScheduler::shutdown`] stops the loop, runs
//! one final flush and hands the manager back so its state can be saved.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::backoff::Backoff;
use super::manager::{AnchorManager, FlushOutcome, RetryReport, TickOutcome};
use crate::clock::Clock;
use crate::merkle::MerkleAccumulator;

/// Loop cadence and retry spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the loop wakes to check for due work.
    pub tick_ms: u64,
    pub backoff: Backoff,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            backoff: Backoff::default(),
        }
    }
}

/// Something the scheduler did, delivered to the caller's sink.
#[derive(Debug)]
pub enum SchedulerEvent {
    Tick(TickOutcome),
    Retry(RetryReport),
}

/// Spaces retry rounds by exponential backoff.
///
/// Round `n` of consecutive failing retries waits `backoff.delay(n)` before
/// the next one. Any round that clears the queue resets the count.
#[derive(Debug, Clone)]
pub struct RetryPacer {
    backoff: Backoff,
    round: u32,
    next_at: Option<DateTime<Utc>>,
}

impl RetryPacer {
    #[must_use]
    pub const fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            round: 0,
            next_at: None,
        }
    }

    /// Whether a retry round should run now, given the queue is non-empty.
    ///
    /// The first call after entries appear only arms the timer.
    pub fn is_due(&mut self, now: DateTime<Utc>, has_pending: bool) -> bool {
        if !has_pending {
            self.round = 0;
            self.next_at = None;
            return false;
        }
        match self.next_at {
            None => {
                self.next_at = Some(self.after(now, 0));
                false
            }
            Some(at) => now >= at,
        }
    }

    /// Record a completed retry round.
    pub fn record(&mut self, now: DateTime<Utc>, report: &RetryReport) {
        if report.still_pending == 0 {
            self.round = 0;
            self.next_at = None;
        } else {
            self.round = self.round.saturating_add(1);
            self.next_at = Some(self.after(now, self.round));
        }
    }

    #[must_use]
    pub const fn next_at(&self) -> Option<DateTime<Utc>> {
        self.next_at
    }

    /// `now` plus the wait for `round`, saturating to a time that never
    /// arrives.
    fn after(&self, now: DateTime<Utc>, round: u32) -> DateTime<Utc> {
        Duration::from_std(self.backoff.delay(round))
            .ok()
            .and_then(|wait| now.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Handle to the running anchor loop.
#[derive(Debug)]
pub struct AnchorScheduler {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<(AnchorManager, FlushOutcome)>,
}

impl AnchorScheduler {
    /// Start the loop on a new thread.
    ///
    /// `sink` receives every tick that closed a batch and every retry round.
    /// It runs on the scheduler thread and should return quickly.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn<F>(
        mut manager: AnchorManager,
        accumulator: Arc<MerkleAccumulator>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        mut sink: F,
    ) -> io::Result<Self>
    where
        F: FnMut(SchedulerEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let tick = StdDuration::from_millis(config.tick_ms.max(1));

        let handle = thread::Builder::new()
            .name("vcp-anchor".into())
            .spawn(move || {
                let mut pacer = RetryPacer::new(config.backoff);
                info!(tick_ms = config.tick_ms, "anchor scheduler started");
                while !thread_stop.load(Ordering::Acquire) {
                    step(&mut manager, &accumulator, &mut pacer, clock.now(), &mut sink);
                    thread::park_timeout(tick);
                }
                let outcome = manager.flush(&accumulator, clock.now());
                match &outcome {
                    FlushOutcome::Queued(batch) => error!(
                        batch_id = batch.root().batch_id,
                        pending = manager.state().pending.len(),
                        "shutdown flush could not anchor; root left pending"
                    ),
                    other => debug!(
                        batch_id = other.batch().root().batch_id,
                        "shutdown flush done"
                    ),
                }
                (manager, outcome)
            })?;

        Ok(Self { stop, handle })
    }

    /// Stop the loop, flush the open batch once and return the manager.
    ///
    /// Waits for the current tick plus the flush attempt, both bounded by the
    /// per-target timeout. A failed flush leaves the root pending in the
    /// returned manager's state; persist it before exiting.
    ///
    /// # Errors
    ///
    /// Returns `Err` with the panic payload if the scheduler thread panicked.
    pub fn shutdown(self) -> thread::Result<(AnchorManager, FlushOutcome)> {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();
        self.handle.join()
    }
}

fn step<F: FnMut(SchedulerEvent)>(
    manager: &mut AnchorManager,
    accumulator: &MerkleAccumulator,
    pacer: &mut RetryPacer,
    now: DateTime<Utc>,
    sink: &mut F,
) {
    let tick = manager.maybe_anchor(accumulator, now);
    if !matches!(tick, TickOutcome::NotDue { .. }) {
        sink(SchedulerEvent::Tick(tick));
    }

    if pacer.is_due(now, !manager.state().pending.is_empty()) {
        let report = manager.retry_pending(now);
        pacer.record(now, &report);
        sink(SchedulerEvent::Retry(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("ts")
    }

    fn pacer() -> RetryPacer {
        RetryPacer::new(Backoff {
            base_ms: 1_000,
            max_ms: 8_000,
            jitter: false,
        })
    }

    fn report(still_pending: usize) -> RetryReport {
        RetryReport {
            still_pending,
            ..RetryReport::default()
        }
    }

    #[test]
    fn nothing_pending_is_never_due() {
        let mut p = pacer();
        assert!(!p.is_due(t(0), false));
        assert_eq!(p.next_at(), None);
    }

    #[test]
    fn first_sight_arms_timer() {
        let mut p = pacer();
        assert!(!p.is_due(t(0), true));
        assert_eq!(p.next_at(), Some(t(1)));
        assert!(!p.is_due(t(0), true));
        assert!(p.is_due(t(1), true));
    }

    #[test]
    fn failing_rounds_back_off_exponentially() {
        let mut p = pacer();
        assert!(!p.is_due(t(0), true));
        let mut now = t(1);
        let mut waits = Vec::new();
        for _ in 0..5 {
            assert!(p.is_due(now, true));
            p.record(now, &report(1));
            let next = p.next_at().expect("armed");
            waits.push((next - now).num_seconds());
            now = next;
        }
        assert_eq!(waits, vec![2, 4, 8, 8, 8]);
    }

    #[test]
    fn clearing_the_queue_resets() {
        let mut p = pacer();
        assert!(!p.is_due(t(0), true));
        p.record(t(1), &report(1));
        p.record(t(3), &report(0));
        assert_eq!(p.next_at(), None);
        assert!(!p.is_due(t(4), true));
        assert_eq!(p.next_at(), Some(t(5)));
    }

    #[test]
    fn oversized_backoff_parks_retries_instead_of_overflowing() {
        let mut p = RetryPacer::new(Backoff {
            base_ms: u64::MAX,
            max_ms: u64::MAX,
            jitter: true,
        });
        assert!(!p.is_due(t(0), true));
        assert_eq!(p.next_at(), Some(DateTime::<Utc>::MAX_UTC));
        assert!(!p.is_due(t(86_400 * 365), true));
        p.record(t(1), &report(1));
        assert_eq!(p.next_at(), Some(DateTime::<Utc>::MAX_UTC));
    }
}
