//! Shared collection of search results for the current epoch
//!
//! The aggregator is the only mutable state shared between the search caller
//! and its probes. All mutation and the completion predicate run under one
//! mutex; waiters park on a [`Notify`] registered before the predicate check,
//! so a probe finishing between "check" and "wait" cannot be missed.

use std::time::Duration;

use mapfetch_core::catalog::ResultEntry;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use crate::generation::Epoch;

/// How a wait on an epoch's barrier ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every probe of the epoch reported back.
    Completed,
    /// A newer epoch replaced the one being waited on.
    Superseded,
    /// The deadline passed first; results may be partial.
    TimedOut,
}

/// What happened to a probe's report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Entry appended and probe counted.
    Inserted,
    /// Probe failed; counted without an entry.
    Counted,
    /// Probe belongs to a retired epoch; nothing inserted.
    Stale,
}

/// Completion counters for the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchProgress {
    pub epoch: Epoch,
    pub completed: usize,
    /// `None` until the count probe has reported.
    pub expected: Option<usize>,
    /// Reports that arrived for retired epochs since the last reset.
    pub stale: usize,
}

impl SearchProgress {
    pub fn is_settled(&self) -> bool {
        self.expected.is_some_and(|expected| self.completed >= expected)
    }
}

#[derive(Debug)]
struct AggregatorState {
    epoch: Epoch,
    entries: Vec<ResultEntry>,
    completed: usize,
    expected: Option<usize>,
    stale: usize,
}

impl AggregatorState {
    fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            entries: Vec::new(),
            completed: 0,
            expected: None,
            stale: 0,
        }
    }

    fn progress(&self) -> SearchProgress {
        SearchProgress {
            epoch: self.epoch,
            completed: self.completed,
            expected: self.expected,
            stale: self.stale,
        }
    }

    fn outcome_for(&self, epoch: Epoch) -> Option<WaitOutcome> {
        if self.epoch != epoch {
            Some(WaitOutcome::Superseded)
        } else if self.progress().is_settled() {
            Some(WaitOutcome::Completed)
        } else {
            None
        }
    }
}

/// Append-only result collection plus completion barrier for one epoch at a time.
#[derive(Debug)]
pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
    changed: Notify,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState::new(Epoch::INITIAL)),
            changed: Notify::new(),
        }
    }

    /// Starts collecting for `epoch`, discarding everything from older epochs.
    ///
    /// Returns `false` and changes nothing if `epoch` is not newer than the
    /// one already active, so racing resets cannot move the epoch backwards.
    pub fn reset(&self, epoch: Epoch) -> bool {
        {
            let mut state = self.state.lock();
            if epoch <= state.epoch {
                return false;
            }
            *state = AggregatorState::new(epoch);
        }
        self.changed.notify_waiters();
        true
    }

    /// Records how many detail probes `epoch` dispatches.
    ///
    /// Must be called before the probes are spawned. Returns `false` when the
    /// epoch has already been replaced.
    pub fn set_expected(&self, epoch: Epoch, expected: usize) -> bool {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return false;
            }
            state.expected = Some(expected);
        }
        self.changed.notify_waiters();
        true
    }

    /// Reports one finished probe.
    ///
    /// Every report is counted against its own epoch: a current probe bumps
    /// the current counter (inserting `entry` if present), a stale one only
    /// bumps the stale tally and never touches the current epoch's entries or
    /// completion count. Waiters are signalled either way.
    pub fn try_commit(&self, epoch: Epoch, entry: Option<ResultEntry>) -> CommitOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                state.stale += 1;
                CommitOutcome::Stale
            } else {
                state.completed += 1;
                match entry {
                    Some(entry) => {
                        state.entries.push(entry);
                        CommitOutcome::Inserted
                    }
                    None => CommitOutcome::Counted,
                }
            }
        };
        trace!("Probe for epoch {epoch} reported: {outcome:?}");
        self.changed.notify_waiters();
        outcome
    }

    /// Copy of the current epoch's entries in completion order.
    pub fn snapshot(&self) -> Vec<ResultEntry> {
        self.state.lock().entries.clone()
    }

    /// Copy of the entries if `epoch` is still the active one.
    pub fn snapshot_for(&self, epoch: Epoch) -> Option<Vec<ResultEntry>> {
        let state = self.state.lock();
        (state.epoch == epoch).then(|| state.entries.clone())
    }

    pub fn progress(&self) -> SearchProgress {
        self.state.lock().progress()
    }

    /// Waits until every probe of `epoch` has reported, a newer epoch takes
    /// over, or `timeout` elapses.
    ///
    /// A timeout too large to represent as a deadline waits without bound.
    pub async fn wait_for_completion(&self, epoch: Epoch, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.state.lock().outcome_for(epoch) {
                return outcome;
            }

            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return self
                            .state
                            .lock()
                            .outcome_for(epoch)
                            .unwrap_or(WaitOutcome::TimedOut);
                    }
                }
                None => notified.await,
            }
        }
    }
}
