//! Process-wide sync status.
//!
//! Purely observational: nothing in the engine branches on it for correctness.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current state of the sync engine, as shown to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Offline,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Offline => "offline",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&SyncStatus::Offline).unwrap(), r#""offline""#);
        let parsed: SyncStatus = serde_json::from_str(r#""syncing""#).unwrap();
        assert_eq!(parsed, SyncStatus::Syncing);
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SyncStatus::default(), SyncStatus::Idle);
        assert_eq!(SyncStatus::Error.to_string(), "error");
    }
}
