//! Offline-first sync engine for stocksync.
//!
//! This crate provides the cache-strategy router, the reconciler that replays
//! queued mutations against the authoritative inventory API, the scheduler
//! that decides when to reconcile, and the UI-facing service built on them.

pub mod api;
pub mod connectivity;
pub mod context;
pub mod engine;
pub mod fetch;
pub mod reconcile;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod status;

#[cfg(test)]
mod testing;

pub use api::{HttpInventoryApi, InventoryApi, ListQuery, ProductPage, UploadReceipt, UploadStats};
pub use context::RuntimeContext;
pub use engine::{EngineTasks, SyncEngine};
pub use fetch::{FetchClient, FetchConfig, FetchRequest, FetchResponse, ResponseSource, Transport};
pub use reconcile::{ReconcileReport, Reconciler, ReplayFailure, SkipReason};
pub use router::{CacheRouter, RouteClass, RouterConfig};
pub use scheduler::{SchedulerHandle, SyncScheduler, SyncTrigger, TriggerOutcome};
pub use service::{InventoryService, LoadedPage, PageSource, SyncStatusView, UploadOutcome, WriteOutcome};
pub use status::StatusHandle;
