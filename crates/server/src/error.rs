//! Errors raised by the tool layer itself, before the engine is involved.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., unknown signal name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A local file named by the caller could not be read.
    #[error("FILE_READ_FAILED: {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool output could not be encoded.
    #[error("OUTPUT_ENCODING: {0}")]
    Output(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::FileRead { .. } => -32026,
            ToolError::Output(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
