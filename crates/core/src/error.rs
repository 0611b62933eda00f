//! Unified error types for stocksync.
//!
//! Every variant carries a stable code prefix so that callers (and the MCP
//! surface) can match on the failure class without parsing messages.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network could not be reached, or a request timed out.
    ///
    /// Absorbed by the cache router and reconciler wherever a fallback exists.
    #[error("NETWORK_UNAVAILABLE: {0}")]
    NetworkUnavailable(String),

    /// The authoritative API rejected the credential (missing or expired).
    #[error("AUTH_REJECTED: {0}")]
    AuthRejected(String),

    /// Durable storage operation failed.
    #[error("PERSISTENCE_FAILURE: {0}")]
    Persistence(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("PERSISTENCE_FAILURE: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded.
    #[error("PERSISTENCE_FAILURE: corrupt row: {0}")]
    CorruptRow(String),

    /// One or more queued mutations failed to replay.
    #[error("PARTIAL_REPLAY_FAILURE: {failed} failed, {succeeded} succeeded")]
    PartialReplayFailure { succeeded: usize, failed: usize },

    /// Non-success HTTP status from the authoritative API.
    #[error("HTTP_ERROR: status {status}: {message}")]
    HttpError { status: u16, message: String },

    /// Invalid input parameters (e.g., non-CSV upload).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The authoritative API answered with a body we could not parse.
    #[error("INVALID_RESPONSE: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether this error is a transient connectivity failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::NetworkUnavailable(_))
    }

    /// Whether this error requires the user to re-authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::AuthRejected(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Persistence(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Persistence(tokio_rusqlite::Error::Close(c)),
            _ => Error::Persistence(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Persistence(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::NetworkUnavailable(msg) => (-32020, msg.clone()),
            Error::AuthRejected(msg) => (-32021, msg.clone()),
            Error::Persistence(e) => (-32022, e.to_string()),
            Error::MigrationFailed(msg) => (-32022, msg.clone()),
            Error::CorruptRow(msg) => (-32022, msg.clone()),
            Error::PartialReplayFailure { .. } => (-32023, err.to_string()),
            Error::HttpError { .. } => (-32024, err.to_string()),
            Error::InvalidResponse(msg) => (-32025, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
