//! Flush coordinator: drains the durable store in the background.
//!
//! Rules:
//! - At most one drain runs at a time. A trigger that arrives while a drain is
//!   running starts nothing; it marks the running drain for a rescan instead.
//!   The pass keeps walking ids past its cursor until none remain and no rescan
//!   is pending, and re-checks the mark once the state has been reset.
//! - Records are walked in insertion order. A record that is retried is left in
//!   place for a later pass, never resent in the same one.
//! - The pass stops only between records: when the work permit expires (back to
//!   `Idle`) or connectivity is lost (`Suspended`). The next trigger rescans
//!   from the head of the store.
//! - Background failures never reach callers. They are absorbed into the
//!   record's fate and logged. A retry count that cannot be persisted discards
//!   the record; if the discard fails too the pass stops.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::Action;
use crate::store::{EventStore, StoredEventId};
use crate::{
    Clock, Connectivity, ConnectivitySignal, EventSender, ExecutionBudget, HostContext,
    RetryPolicy, StoreError, WorkPermit,
};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Draining,
    /// Stopped because connectivity was lost; resumes on the next trigger.
    Suspended,
}

/// Why a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    /// A record was just persisted.
    Enqueued,
    /// Connectivity went from unavailable to available.
    ConnectivityRestored,
    /// The host finished activation.
    Activated,
    /// Explicit `flush()`.
    Manual,
}

impl fmt::Display for DrainTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enqueued => "enqueued",
            Self::ConnectivityRestored => "connectivity_restored",
            Self::Activated => "activated",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Why a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every pending record was visited.
    Completed,
    /// The work permit expired.
    BudgetExpired,
    /// Connectivity was lost.
    ConnectivityLost,
    /// The pending set could not be read.
    StoreUnavailable,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub trigger: DrainTrigger,
    pub delivered: usize,
    pub retried: usize,
    /// Dropped after an unrecoverable failure or exhausting retries.
    pub discarded: usize,
    /// Dropped because the TTL passed.
    pub expired: usize,
    /// Rows that could not be decoded and were deleted.
    pub corrupt: usize,
    pub stop: StopReason,
}

impl DrainReport {
    fn new(trigger: DrainTrigger) -> Self {
        Self {
            trigger,
            delivered: 0,
            retried: 0,
            discarded: 0,
            expired: 0,
            corrupt: 0,
            stop: StopReason::Completed,
        }
    }

    /// Number of records that left the store during the pass.
    pub fn removed(&self) -> usize {
        self.delivered + self.discarded + self.expired + self.corrupt
    }

    /// Fold a follow-up pass into this report. The later stop reason wins.
    fn merge(&mut self, next: DrainReport) {
        self.delivered += next.delivered;
        self.retried += next.retried;
        self.discarded += next.discarded;
        self.expired += next.expired;
        self.corrupt += next.corrupt;
        self.stop = next.stop;
    }
}

/// Resets the coordinator state when a drain ends, including when the drain
/// future is dropped mid-pass.
struct DrainGuard<'a> {
    state: &'a watch::Sender<CoordinatorState>,
    next: CoordinatorState,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(self.next);
    }
}

/// Single-flight background drainer.
pub struct FlushCoordinator {
    store: Arc<dyn EventStore>,
    sender: Arc<dyn EventSender>,
    host: Arc<dyn HostContext>,
    budget: Arc<dyn ExecutionBudget>,
    connectivity: ConnectivitySignal,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    state: watch::Sender<CoordinatorState>,
    /// Set by triggers that arrive while a drain is running.
    rescan: AtomicBool,
}

impl FlushCoordinator {
    pub fn new(
        store: Arc<dyn EventStore>,
        sender: Arc<dyn EventSender>,
        host: Arc<dyn HostContext>,
        budget: Arc<dyn ExecutionBudget>,
        connectivity: ConnectivitySignal,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Self {
            store,
            sender,
            host,
            budget,
            connectivity,
            clock,
            policy,
            state,
            rescan: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.state() == CoordinatorState::Draining
    }

    /// Schedule a drain on the current tokio runtime.
    ///
    /// Returns false without spawning if a drain is already running, the host
    /// is not ready, or no runtime is available. A running drain rescans the
    /// store before it finishes.
    pub fn trigger(self: &Arc<Self>, trigger: DrainTrigger) -> bool {
        if self.defer_to_running_drain() {
            debug!(trigger = %trigger, "Drain already running, rescan requested");
            return false;
        }
        if !self.host.is_ready() {
            debug!(trigger = %trigger, "Host not ready, drain deferred");
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(trigger = %trigger, "No tokio runtime, cannot schedule drain");
            return false;
        };

        let this = Arc::clone(self);
        handle.spawn(async move {
            this.run_drain(trigger).await;
        });
        true
    }

    /// Run one drain pass to completion on the current task.
    ///
    /// Returns `None` if another drain holds the coordinator or the host is
    /// not ready. When triggers were deferred to this drain after its last
    /// scan, follow-up passes run here and are folded into the report.
    pub async fn run_drain(&self, trigger: DrainTrigger) -> Option<DrainReport> {
        if !self.host.is_ready() {
            debug!(trigger = %trigger, "Host not ready, skipping drain");
            return None;
        }
        if !self.try_begin() {
            self.rescan.store(true, Ordering::SeqCst);
            if !self.try_begin() {
                debug!(trigger = %trigger, "Drain already running, rescan requested");
                return None;
            }
        }
        // This pass starts from the head, so earlier requests are covered.
        self.rescan.store(false, Ordering::SeqCst);

        let mut report = self.pass(trigger).await;
        while self.rescan.swap(false, Ordering::SeqCst) && self.should_follow_up(report.stop) {
            if !self.host.is_ready() || !self.try_begin() {
                break;
            }
            debug!(trigger = %trigger, "Trigger arrived while finishing, draining again");
            let next = self.pass(trigger).await;
            report.merge(next);
        }
        Some(report)
    }

    /// One pass under a fresh work permit. The caller must hold `Draining`.
    async fn pass(&self, trigger: DrainTrigger) -> DrainReport {
        let mut guard = DrainGuard {
            state: &self.state,
            next: CoordinatorState::Idle,
        };

        let permit = self.budget.acquire();
        info!(trigger = %trigger, "Drain started");
        let report = self.drain(&permit, trigger).await;
        drop(permit);

        if report.stop == StopReason::ConnectivityLost {
            guard.next = CoordinatorState::Suspended;
        }
        drop(guard);

        info!(
            trigger = %trigger,
            delivered = report.delivered,
            retried = report.retried,
            discarded = report.discarded,
            expired = report.expired,
            corrupt = report.corrupt,
            stop = ?report.stop,
            "Drain finished"
        );
        report
    }

    /// Mark a running drain for a rescan. Returns false if no drain was
    /// running by the time the mark was set, so the caller must start one.
    fn defer_to_running_drain(&self) -> bool {
        if !self.is_draining() {
            return false;
        }
        self.rescan.store(true, Ordering::SeqCst);
        // A drain that is still running here checks the mark after resetting
        // its state.
        self.is_draining()
    }

    fn should_follow_up(&self, stop: StopReason) -> bool {
        match stop {
            StopReason::Completed => true,
            StopReason::ConnectivityLost => self.connectivity.is_available(),
            StopReason::BudgetExpired | StopReason::StoreUnavailable => false,
        }
    }

    /// Spawn a task that starts a drain whenever connectivity is restored.
    pub fn spawn_connectivity_listener(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = self.connectivity.subscribe();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Only real changes notify, so `Available` here implies an
                        // intermediate `Unavailable`, seen or not.
                        let current = *rx.borrow_and_update();
                        match current {
                            Connectivity::Available => {
                                info!("Connectivity restored");
                                this.trigger(DrainTrigger::ConnectivityRestored);
                            }
                            Connectivity::Unavailable => debug!("Connectivity lost"),
                        }
                    }
                }
            }
            debug!("Connectivity listener stopped");
        })
    }

    /// Compare-and-set from `Idle`/`Suspended` to `Draining`.
    fn try_begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == CoordinatorState::Draining {
                false
            } else {
                *state = CoordinatorState::Draining;
                true
            }
        })
    }

    async fn drain(&self, permit: &WorkPermit, trigger: DrainTrigger) -> DrainReport {
        let mut report = DrainReport::new(trigger);
        let mut cursor: Option<StoredEventId> = None;

        loop {
            let ids = match self.store.pending_ids() {
                Ok(ids) => ids,
                Err(e) => {
                    error!(error = %e, "Failed to read pending events");
                    report.stop = StopReason::StoreUnavailable;
                    return report;
                }
            };
            let batch: Vec<StoredEventId> = ids
                .into_iter()
                .filter(|id| cursor.map_or(true, |c| *id > c))
                .collect();
            if batch.is_empty() {
                if self.rescan.swap(false, Ordering::SeqCst) {
                    debug!(trigger = %trigger, "Rescanning for records enqueued during the pass");
                    continue;
                }
                return report;
            }

            for id in batch {
                if permit.is_expired() {
                    report.stop = StopReason::BudgetExpired;
                    return report;
                }
                if !self.connectivity.is_available() {
                    report.stop = StopReason::ConnectivityLost;
                    return report;
                }
                let flow = self.process(id, &mut report).await;
                cursor = Some(id);
                if let ControlFlow::Break(stop) = flow {
                    report.stop = stop;
                    return report;
                }
            }
        }
    }

    async fn process(
        &self,
        id: StoredEventId,
        report: &mut DrainReport,
    ) -> ControlFlow<StopReason> {
        let record = match self.store.load(id) {
            Ok(Some(record)) => record,
            Ok(None) => return ControlFlow::Continue(()),
            Err(StoreError::CorruptRecord { reason, .. }) => {
                warn!(id = %id, reason = %reason, "Discarding corrupt event record");
                if self.remove(id) {
                    report.corrupt += 1;
                }
                return ControlFlow::Continue(());
            }
            Err(e) => {
                error!(id = %id, error = %e, "Failed to load event record");
                return ControlFlow::Continue(());
            }
        };

        if record.is_expired(self.clock.now_millis()) {
            debug!(id = %id, event_type = %record.event_type(), "Event expired before send");
            if self.remove(id) {
                report.expired += 1;
            }
            return ControlFlow::Continue(());
        }

        let outcome = self.sender.send(&record).await;
        let action = self.policy.decide(&record, &outcome, self.clock.now_millis());

        match action {
            Action::Remove => {
                debug!(id = %id, event_type = %record.event_type(), "Event delivered");
                if self.remove(id) {
                    report.delivered += 1;
                }
            }
            Action::Retry => {
                let retry_count = record.retry_count() + 1;
                match self.store.set_retry_count(id, retry_count) {
                    Ok(_) => {
                        debug!(
                            id = %id,
                            event_type = %record.event_type(),
                            retry_count,
                            "Event kept for retry"
                        );
                        report.retried += 1;
                    }
                    Err(e) => {
                        // Resending with the old count would bypass the retry ceiling.
                        error!(
                            id = %id,
                            event_type = %record.event_type(),
                            error = %e,
                            "Failed to persist retry count, discarding event"
                        );
                        match self.store.remove(id) {
                            Ok(removed) => {
                                if removed {
                                    report.discarded += 1;
                                }
                            }
                            Err(e) => {
                                error!(id = %id, error = %e, "Failed to discard event, stopping drain");
                                return ControlFlow::Break(StopReason::StoreUnavailable);
                            }
                        }
                    }
                }
            }
            Action::Discard => {
                warn!(
                    id = %id,
                    event_type = %record.event_type(),
                    retry_count = record.retry_count(),
                    outcome = outcome.label(),
                    "Discarding event"
                );
                if self.remove(id) {
                    report.discarded += 1;
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn remove(&self, id: StoredEventId) -> bool {
        match self.store.remove(id) {
            Ok(removed) => removed,
            Err(e) => {
                error!(id = %id, error = %e, "Failed to remove event record");
                false
            }
        }
    }
}
