//! Observable sync status and the most recent reconciliation report.

use std::sync::Arc;
use stocksync_core::SyncStatus;
use tokio::sync::watch;

use crate::reconcile::ReconcileReport;

/// Publishes [`SyncStatus`] transitions to any number of observers.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    status: Arc<watch::Sender<SyncStatus>>,
    report: Arc<watch::Sender<Option<ReconcileReport>>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        let (report, _) = watch::channel(None);
        Self { status: Arc::new(status), report: Arc::new(report) }
    }

    pub fn current(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn set(&self, next: SyncStatus) {
        let previous = self.status.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "sync status changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub(crate) fn publish_report(&self, report: ReconcileReport) {
        self.report.send_replace(Some(report));
    }

    /// Report from the last reconciliation that ran, including skipped runs.
    pub fn last_report(&self) -> Option<ReconcileReport> {
        self.report.borrow().clone()
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_subscribe() {
        let handle = StatusHandle::new();
        let mut rx = handle.subscribe();
        assert_eq!(handle.current(), SyncStatus::Idle);

        handle.set(SyncStatus::Syncing);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SyncStatus::Syncing);
    }

    #[test]
    fn test_last_report_starts_empty() {
        assert!(StatusHandle::new().last_report().is_none());
    }
}
