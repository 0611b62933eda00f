//! Reconciliation: refresh snapshots, then replay the mutation queue.
//!
//! A run is a no-op while offline. Otherwise it:
//!
//! 1. Fetches the first page of inventory and upserts it into the local store.
//!    An unreachable server ends the run here with the queue untouched; a
//!    rejected credential is returned as `AuthRejected`, also before any drain.
//! 2. Drains the queue and replays each mutation in sequence order. Each item
//!    succeeds or fails independently.
//! 3. Refreshes snapshots again if anything was replayed.
//!
//! Failed items are not re-enqueued. Each one is logged at error level and
//! listed in the [`ReconcileReport`], which is also published on the
//! [`StatusHandle`] for later inspection.

use std::sync::Arc;

use serde::Serialize;
use stocksync_core::{Error, LocalStore, MutationKind, MutationPayload, QueuedMutation, SyncStatus};

use crate::api::{InventoryApi, ListQuery};
use crate::context::RuntimeContext;
use crate::status::StatusHandle;

/// Why a run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The context reported no connectivity.
    Offline,
    /// The context said online but the server could not be reached.
    Unreachable,
}

/// A queued mutation that failed to replay and was dropped from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct ReplayFailure {
    pub sequence_id: i64,
    pub kind: MutationKind,
    pub enqueued_at: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct ReconcileReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    /// Snapshots written by the most recent refresh in this run.
    pub refreshed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ReplayFailure>,
    pub finished_at: String,
}

impl ReconcileReport {
    fn empty() -> Self {
        Self {
            skipped: None,
            refreshed: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        Self { skipped: Some(reason), ..Self::empty() }
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_none() && self.failed == 0
    }

    /// Convert a report with failed replays into `PartialReplayFailure`.
    pub fn ensure_complete(self) -> Result<Self, Error> {
        if self.failed > 0 {
            return Err(Error::PartialReplayFailure { succeeded: self.succeeded, failed: self.failed });
        }
        Ok(self)
    }
}

pub struct Reconciler {
    api: Arc<dyn InventoryApi>,
    store: LocalStore,
    context: RuntimeContext,
    status: StatusHandle,
    page_size: u32,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn InventoryApi>, store: LocalStore, context: RuntimeContext, status: StatusHandle, page_size: u32,
    ) -> Self {
        Self { api, store, context, status, page_size }
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// - `AuthRejected` if no credential is present or the server rejects it
    /// - Persistence errors from the local store, in which case the queue is
    ///   left as it was
    ///
    /// Network failures are not errors; they produce a skipped report.
    pub async fn reconcile(&self) -> Result<ReconcileReport, Error> {
        if !self.context.is_online() {
            tracing::debug!("offline; reconciliation skipped");
            return Ok(self.finish_skipped(SkipReason::Offline));
        }
        if !self.context.has_credential() {
            self.status.set(SyncStatus::Error);
            return Err(Error::AuthRejected("no session token; sign in to sync".into()));
        }

        self.status.set(SyncStatus::Syncing);
        let mut report = ReconcileReport::empty();

        match self.refresh().await {
            Ok(count) => report.refreshed = count,
            Err(e) if e.is_network() => {
                tracing::warn!(error = %e, "server unreachable; reconciliation skipped");
                return Ok(self.finish_skipped(SkipReason::Unreachable));
            }
            Err(e @ (Error::HttpError { .. } | Error::InvalidResponse(_))) => {
                tracing::warn!(error = %e, "snapshot refresh failed; continuing with replay");
            }
            Err(e) => {
                self.status.set(SyncStatus::Error);
                return Err(e);
            }
        }

        let mutations = match self.store.drain_all().await {
            Ok(mutations) => mutations,
            Err(e) => {
                self.status.set(SyncStatus::Error);
                return Err(e);
            }
        };

        for mutation in &mutations {
            match self.replay(mutation).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::error!(
                        sequence_id = mutation.sequence_id,
                        kind = %mutation.kind(),
                        enqueued_at = %mutation.enqueued_at,
                        error = %e,
                        "queued mutation failed to replay and was dropped"
                    );
                    report.failures.push(ReplayFailure {
                        sequence_id: mutation.sequence_id,
                        kind: mutation.kind(),
                        enqueued_at: mutation.enqueued_at.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failed = report.failures.len();

        if report.succeeded > 0 {
            match self.refresh().await {
                Ok(count) => report.refreshed = count,
                Err(e) => tracing::warn!(error = %e, "post-replay refresh failed"),
            }
        }

        report.finished_at = chrono::Utc::now().to_rfc3339();
        self.status.set(if report.failed > 0 { SyncStatus::Error } else { SyncStatus::Idle });
        tracing::info!(
            refreshed = report.refreshed,
            succeeded = report.succeeded,
            failed = report.failed,
            "reconciliation finished"
        );
        self.status.publish_report(report.clone());
        Ok(report)
    }

    fn finish_skipped(&self, reason: SkipReason) -> ReconcileReport {
        let report = ReconcileReport::skipped(reason);
        self.status.set(SyncStatus::Offline);
        self.status.publish_report(report.clone());
        report
    }

    async fn refresh(&self) -> Result<usize, Error> {
        let page = self.api.list(&ListQuery { search: None, limit: self.page_size, offset: 0 }).await?;
        self.store.upsert_snapshots(&page.products).await
    }

    async fn replay(&self, mutation: &QueuedMutation) -> Result<(), Error> {
        match &mutation.payload {
            MutationPayload::Upload { file_name, bytes } => {
                self.api.upload(file_name, bytes.clone()).await?;
            }
            MutationPayload::Update { id, fields } => {
                let entity = self.api.update(id, fields).await?;
                self.store.upsert_snapshots(std::slice::from_ref(&entity)).await?;
            }
            MutationPayload::Delete { id } => {
                match self.api.delete(id).await {
                    Ok(()) | Err(Error::HttpError { status: 404, .. }) => {}
                    Err(e) => return Err(e),
                }
                self.store.remove_snapshot(id).await?;
            }
        }
        tracing::debug!(sequence_id = mutation.sequence_id, kind = %mutation.kind(), "replayed mutation");
        Ok(())
    }
}
