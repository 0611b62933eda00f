//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use crate::tools::cache::{CacheResetParams, QueueRepairParams, repair_impl, reset_impl};
use crate::tools::inventory::{
    InventoryDeleteParams, InventoryLoadParams, InventoryUpdateParams, InventoryUploadParams, delete_impl, load_impl,
    update_impl, upload_impl,
};
use crate::tools::sync::{
    SessionSetTokenParams, SyncSignalParams, session_set_token_impl, sync_now_impl, sync_signal_impl,
    sync_status_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use stocksync_client::{SchedulerHandle, SyncEngine};

/// The main MCP server handler for stocksync.
#[derive(Clone)]
pub struct SyncServer {
    tool_router: ToolRouter<Self>,
    engine: SyncEngine,
    scheduler: SchedulerHandle,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl SyncServer {
    /// Create a new server handler around a started engine.
    pub fn new(engine: SyncEngine, scheduler: SchedulerHandle) -> Self {
        Self { tool_router: Self::tool_router(), engine, scheduler }
    }

    #[tool(
        description = "List inventory products one page at a time, optionally filtered by title/SKU. Falls back to the local cache when offline."
    )]
    async fn inventory_load(&self, params: Parameters<InventoryLoadParams>) -> Result<CallToolResult, McpError> {
        load_impl(&self.engine, params.0).await
    }

    #[tool(
        description = "Upload a local CSV file to the inventory API. Queued for the next sync if the API is unreachable or queue_only is set."
    )]
    async fn inventory_upload(&self, params: Parameters<InventoryUploadParams>) -> Result<CallToolResult, McpError> {
        upload_impl(&self.engine, params.0).await
    }

    #[tool(description = "Update fields of a product. Applied locally and queued when offline.")]
    async fn inventory_update(&self, params: Parameters<InventoryUpdateParams>) -> Result<CallToolResult, McpError> {
        update_impl(&self.engine, params.0).await
    }

    #[tool(description = "Delete a product. Removed locally and queued when offline.")]
    async fn inventory_delete(&self, params: Parameters<InventoryDeleteParams>) -> Result<CallToolResult, McpError> {
        delete_impl(&self.engine, params.0).await
    }

    #[tool(description = "Refresh the local cache and replay queued changes now. Returns the reconciliation report.")]
    async fn sync_now(&self) -> Result<CallToolResult, McpError> {
        sync_now_impl(&self.engine).await
    }

    #[tool(description = "Current sync status, connectivity, pending queue length and the last reconciliation report.")]
    async fn sync_status(&self) -> Result<CallToolResult, McpError> {
        sync_status_impl(&self.engine).await
    }

    #[tool(description = "Deliver a platform signal: online, offline, or wake (background sync).")]
    async fn sync_signal(&self, params: Parameters<SyncSignalParams>) -> Result<CallToolResult, McpError> {
        sync_signal_impl(&self.engine, &self.scheduler, params.0).await
    }

    #[tool(description = "Clear the local product cache. Queued changes are kept.")]
    async fn cache_reset(&self, params: Parameters<CacheResetParams>) -> Result<CallToolResult, McpError> {
        reset_impl(&self.engine, params.0).await
    }

    #[tool(
        description = "Discard queued changes that can no longer be read. Such rows block every sync until removed."
    )]
    async fn queue_repair(&self, params: Parameters<QueueRepairParams>) -> Result<CallToolResult, McpError> {
        repair_impl(&self.engine, params.0).await
    }

    #[tool(description = "Set or clear the bearer token used for the inventory API.")]
    async fn session_set_token(&self, params: Parameters<SessionSetTokenParams>) -> Result<CallToolResult, McpError> {
        session_set_token_impl(&self.engine, params.0).await
    }
}

impl ServerHandler for SyncServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "stocksync".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
