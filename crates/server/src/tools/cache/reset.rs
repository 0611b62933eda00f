//! cache_reset tool implementation.
//!
//! Explicitly clears the local snapshot store. Queued mutations are never
//! touched, so nothing waiting to sync is lost.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stocksync_client::SyncEngine;

use crate::tools::json_result;

/// Parameters for the cache_reset tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheResetParams {
    /// Must be true; guards against accidental resets.
    pub confirm: bool,
}

/// Output from the cache_reset tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheResetOutput {
    /// Number of snapshots removed.
    pub removed: u64,
    /// Queued mutations still waiting for sync.
    pub pending_mutations: u64,
}

pub async fn reset_impl(engine: &SyncEngine, params: CacheResetParams) -> Result<CallToolResult, McpError> {
    if !params.confirm {
        return Err(stocksync_core::Error::InvalidInput("confirm must be true to clear the local cache".into()).into());
    }

    let removed = engine.service().clear_local_cache().await?;
    let pending_mutations = engine.store().queue_len().await?;

    Ok(json_result(&CacheResetOutput { removed, pending_mutations })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{offline_engine, output};
    use stocksync_core::{EntitySnapshot, MutationPayload};

    #[tokio::test]
    async fn test_reset_requires_confirm() {
        let (engine, _dir) = offline_engine().await;
        let err = reset_impl(&engine, CacheResetParams { confirm: false }).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[tokio::test]
    async fn test_reset_keeps_queue() {
        let (engine, _dir) = offline_engine().await;
        engine.store().upsert_snapshots(&[EntitySnapshot::new("1"), EntitySnapshot::new("2")]).await.unwrap();
        engine.store().enqueue(MutationPayload::Delete { id: "3".into() }).await.unwrap();

        let result = reset_impl(&engine, CacheResetParams { confirm: true }).await.unwrap();
        let out: CacheResetOutput = output(&result);
        assert_eq!(out.removed, 2);
        assert_eq!(out.pending_mutations, 1);
    }
}
