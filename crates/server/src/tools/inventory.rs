//! Inventory tools: load, upload, update and delete.
//!
//! Reads fall back to the local store when the API is unreachable; writes
//! are queued for the next reconciliation instead of failing.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stocksync_client::{SyncEngine, UploadOutcome, UploadReceipt, WriteOutcome};
use stocksync_core::{EntitySnapshot, MutationPayload};

use crate::error::ToolError;
use crate::tools::json_result;

/// Input parameters for inventory_load tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InventoryLoadParams {
    /// Case-insensitive substring matched against title and SKU.
    #[serde(default)]
    pub search: Option<String>,

    /// 1-based page number (default: 1).
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

pub async fn load_impl(engine: &SyncEngine, params: InventoryLoadParams) -> Result<CallToolResult, McpError> {
    let page = engine.service().load_entities(params.search.as_deref(), params.page).await?;
    Ok(json_result(&page)?)
}

/// Input parameters for inventory_upload tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InventoryUploadParams {
    /// Path to a local CSV file.
    pub path: String,

    /// File name sent to the server (default: the file name of `path`).
    #[serde(default)]
    pub file_name: Option<String>,

    /// Queue for the next sync without trying the network.
    #[serde(default)]
    pub queue_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InventoryUploadOutput {
    Uploaded { receipt: UploadReceipt },
    Queued { sequence_id: i64, file_name: String },
}

pub async fn upload_impl(engine: &SyncEngine, params: InventoryUploadParams) -> Result<CallToolResult, McpError> {
    let path = params.path.trim();
    if path.is_empty() {
        return Err(ToolError::InvalidInput("path cannot be empty".into()).into());
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ToolError::FileRead { path: path.to_string(), source })?;
    let file_name = params.file_name.clone().unwrap_or_else(|| {
        std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let service = engine.service();
    let outcome = if params.queue_only {
        UploadOutcome::Queued(service.queue_offline_upload(bytes, &file_name).await?)
    } else {
        service.upload_or_queue(bytes, &file_name).await?
    };

    let output = match outcome {
        UploadOutcome::Uploaded(receipt) => InventoryUploadOutput::Uploaded { receipt },
        UploadOutcome::Queued(mutation) => {
            let file_name = match &mutation.payload {
                MutationPayload::Upload { file_name, .. } => file_name.clone(),
                _ => file_name,
            };
            InventoryUploadOutput::Queued { sequence_id: mutation.sequence_id, file_name }
        }
    };
    Ok(json_result(&output)?)
}

/// Input parameters for inventory_update tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InventoryUpdateParams {
    /// Product id.
    pub id: String,

    /// Fields to change, e.g. `{"quantity": 4}`.
    pub fields: Map<String, Value>,
}

/// Input parameters for inventory_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InventoryDeleteParams {
    /// Product id.
    pub id: String,
}

/// Output shared by inventory_update and inventory_delete.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InventoryWriteOutput {
    /// False when the write was queued for the next sync.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntitySnapshot>,
}

impl From<WriteOutcome> for InventoryWriteOutput {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Applied(entity) => Self { applied: true, sequence_id: None, entity },
            WriteOutcome::Queued { mutation, local } => {
                Self { applied: false, sequence_id: Some(mutation.sequence_id), entity: local }
            }
        }
    }
}

pub async fn update_impl(engine: &SyncEngine, params: InventoryUpdateParams) -> Result<CallToolResult, McpError> {
    if params.fields.is_empty() {
        return Err(ToolError::InvalidInput("fields cannot be empty".into()).into());
    }
    let outcome = engine.service().update_or_queue(&params.id, params.fields).await?;
    Ok(json_result(&InventoryWriteOutput::from(outcome))?)
}

pub async fn delete_impl(engine: &SyncEngine, params: InventoryDeleteParams) -> Result<CallToolResult, McpError> {
    let outcome = engine.service().delete_or_queue(&params.id).await?;
    Ok(json_result(&InventoryWriteOutput::from(outcome))?)
}
