//! SQLite-backed local store for entity snapshots, queued mutations and
//! cached HTTP responses.
//!
//! This module provides durable client-side state using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Entity snapshots keyed by id, with title/sku lookup
//! - A FIFO mutation queue drained transactionally
//! - Request-keyed response cache for the cache-strategy router
//! - Automatic schema migrations

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod queue;
pub mod responses;
pub mod snapshots;

pub use crate::Error;

pub use connection::LocalStore;
pub use queue::{MutationKind, MutationPayload, QueuedMutation};
pub use responses::CachedResponse;
pub use snapshots::EntitySnapshot;
