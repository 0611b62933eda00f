//! queue_repair tool implementation.
//!
//! Drops queued mutations whose stored form can no longer be decoded. Such a
//! row blocks every drain, and with it every sync, until it is removed.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stocksync_client::SyncEngine;

use crate::tools::json_result;

/// Parameters for the queue_repair tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueRepairParams {
    /// Must be true; discarded rows cannot be recovered.
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueRepairOutput {
    /// Sequence ids of the rows that were removed.
    pub discarded: Vec<i64>,
    pub pending_mutations: u64,
}

pub async fn repair_impl(engine: &SyncEngine, params: QueueRepairParams) -> Result<CallToolResult, McpError> {
    if !params.confirm {
        return Err(stocksync_core::Error::InvalidInput("confirm must be true to discard queued rows".into()).into());
    }

    let discarded = engine.store().discard_corrupt_mutations().await?;
    let pending_mutations = engine.store().queue_len().await?;

    Ok(json_result(&QueueRepairOutput { discarded, pending_mutations })?)
}
