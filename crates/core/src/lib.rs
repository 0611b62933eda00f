//! Core types and shared functionality for stocksync.
//!
//! This crate provides:
//! - Local store with SQLite backend (entity snapshots, mutation queue, response cache)
//! - Unified error types
//! - Configuration structures
//! - Sync status reporting

pub mod config;
pub mod error;
pub mod status;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use status::SyncStatus;
pub use store::{CachedResponse, EntitySnapshot, LocalStore, MutationKind, MutationPayload, QueuedMutation};
