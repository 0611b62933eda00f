//! Sync scheduler: turns triggers into reconciliation runs.
//!
//! Triggers come from a periodic timer, offline-to-online transitions on the
//! [`RuntimeContext`], and explicit requests through a [`SchedulerHandle`]
//! (background wake-ups and manual syncs). At most one reconciliation runs at
//! a time; a trigger that arrives while one is in flight is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stocksync_core::{Error, SyncStatus};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::RuntimeContext;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::status::StatusHandle;

const TRIGGER_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Periodic,
    ConnectivityRestored,
    /// Platform wake-up delivered while the app is in the background.
    BackgroundWake,
    Manual,
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Ran(Result<ReconcileReport, Error>),
    /// Another run was in flight; this trigger was dropped.
    Coalesced,
    /// Preconditions for this trigger were not met.
    NotEligible,
}

#[derive(Clone)]
pub struct SyncScheduler {
    reconciler: Arc<Reconciler>,
    context: RuntimeContext,
    status: StatusHandle,
    in_flight: Arc<Mutex<()>>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(reconciler: Arc<Reconciler>, context: RuntimeContext, status: StatusHandle, interval: Duration) -> Self {
        Self { reconciler, context, status, in_flight: Arc::new(Mutex::new(())), interval }
    }

    /// Periodic runs require connectivity and a credential; other triggers
    /// always go to the reconciler, which handles offline itself.
    pub fn is_eligible(&self, trigger: SyncTrigger) -> bool {
        match trigger {
            SyncTrigger::Periodic => self.context.is_online() && self.context.has_credential(),
            _ => true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Run a reconciliation for `trigger` unless one is already in flight.
    pub async fn fire(&self, trigger: SyncTrigger) -> TriggerOutcome {
        if !self.is_eligible(trigger) {
            tracing::debug!(?trigger, "trigger not eligible");
            return TriggerOutcome::NotEligible;
        }
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!(?trigger, "reconciliation already in flight; trigger dropped");
            return TriggerOutcome::Coalesced;
        };

        tracing::debug!(?trigger, "starting reconciliation");
        TriggerOutcome::Ran(self.reconciler.reconcile().await)
    }

    /// Spawn the trigger loop. Dropping every [`SchedulerHandle`] stops it.
    ///
    /// The connectivity state is sampled here, before the task starts, so a
    /// transition that lands between `spawn` and the first poll of the loop
    /// is still seen as a change.
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(TRIGGER_CAPACITY);
        let mut connectivity = self.context.subscribe_connectivity();
        let online = *connectivity.borrow_and_update();
        if !online {
            self.status.set(SyncStatus::Offline);
        }
        let task = tokio::spawn(self.run(rx, connectivity, online));
        (SchedulerHandle { tx }, task)
    }

    async fn run(
        self, mut requests: mpsc::Receiver<SyncTrigger>, mut connectivity: watch::Receiver<bool>, mut was_online: bool,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => SyncTrigger::Periodic,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *connectivity.borrow_and_update();
                    let restored = online && !was_online;
                    let lost = !online && was_online;
                    was_online = online;
                    if lost {
                        self.on_connectivity_lost();
                    }
                    if !restored {
                        continue;
                    }
                    self.on_connectivity_restored();
                    SyncTrigger::ConnectivityRestored
                }
                request = requests.recv() => match request {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            let scheduler = self.clone();
            tokio::spawn(async move { log_outcome(trigger, scheduler.fire(trigger).await) });
        }

        tracing::debug!("scheduler stopped");
    }

    /// A run in flight reports its own outcome; otherwise show offline now.
    fn on_connectivity_lost(&self) {
        tracing::info!("connectivity lost");
        if !self.is_running() {
            self.status.set(SyncStatus::Offline);
        }
    }

    fn on_connectivity_restored(&self) {
        tracing::info!("connectivity restored");
        if !self.is_running() && self.status.current() == SyncStatus::Offline {
            self.status.set(SyncStatus::Idle);
        }
    }
}

fn log_outcome(trigger: SyncTrigger, outcome: TriggerOutcome) {
    match outcome {
        TriggerOutcome::Ran(Ok(report)) if report.failed > 0 => {
            tracing::warn!(?trigger, failed = report.failed, succeeded = report.succeeded, "sync finished with failures")
        }
        TriggerOutcome::Ran(Ok(_)) => {}
        TriggerOutcome::Ran(Err(e)) => tracing::warn!(?trigger, error = %e, "sync failed"),
        TriggerOutcome::Coalesced | TriggerOutcome::NotEligible => {}
    }
}

/// Sends triggers to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SyncTrigger>,
}

impl SchedulerHandle {
    /// Deliver a background wake-up.
    pub fn wake(&self) -> bool {
        self.request(SyncTrigger::BackgroundWake)
    }

    /// Queue a trigger without waiting.
    ///
    /// Returns false if the trigger was dropped because the channel is full
    /// or the scheduler has stopped.
    pub fn request(&self, trigger: SyncTrigger) -> bool {
        self.tx.try_send(trigger).is_ok()
    }
}
