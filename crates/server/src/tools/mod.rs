//! MCP tool implementations.
//!
//! This module contains all tools exposed by the stocksync server. Each tool
//! has an `*_impl` function taking the engine so it can be tested without an
//! MCP transport.

pub mod cache;
pub mod inventory;
pub mod sync;

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::ToolError;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, ToolError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Output(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
