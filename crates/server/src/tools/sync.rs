//! Sync tools: trigger a reconciliation, inspect status, deliver platform
//! signals and set the session token.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stocksync_client::{ReconcileReport, SchedulerHandle, SyncEngine, SyncTrigger, TriggerOutcome};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncNowOutput {
    Ran { report: ReconcileReport },
    /// Another reconciliation was already running.
    Coalesced,
    NotEligible,
}

/// Run a reconciliation now and wait for its report.
pub async fn sync_now_impl(engine: &SyncEngine) -> Result<CallToolResult, McpError> {
    let output = match engine.scheduler().fire(SyncTrigger::Manual).await {
        TriggerOutcome::Ran(result) => SyncNowOutput::Ran { report: result? },
        TriggerOutcome::Coalesced => SyncNowOutput::Coalesced,
        TriggerOutcome::NotEligible => SyncNowOutput::NotEligible,
    };
    Ok(json_result(&output)?)
}

pub async fn sync_status_impl(engine: &SyncEngine) -> Result<CallToolResult, McpError> {
    let view = engine.service().sync_status().await?;
    Ok(json_result(&view)?)
}

/// Platform signal delivered to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Online,
    Offline,
    /// Background wake-up.
    Wake,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncSignalParams {
    pub signal: Signal,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncSignalOutput {
    pub signal: Signal,
    pub online: bool,
    /// Whether the signal changed state or reached the scheduler.
    pub accepted: bool,
}

pub async fn sync_signal_impl(
    engine: &SyncEngine, scheduler: &SchedulerHandle, params: SyncSignalParams,
) -> Result<CallToolResult, McpError> {
    let accepted = match params.signal {
        Signal::Online => engine.context().set_online(true),
        Signal::Offline => engine.context().set_online(false),
        Signal::Wake => scheduler.wake(),
    };
    tracing::debug!(signal = ?params.signal, accepted, "platform signal");

    Ok(json_result(&SyncSignalOutput { signal: params.signal, online: engine.context().is_online(), accepted })?)
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionSetTokenParams {
    /// Bearer token; omit or pass an empty string to sign out.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionSetTokenOutput {
    pub has_credential: bool,
}

pub async fn session_set_token_impl(
    engine: &SyncEngine, params: SessionSetTokenParams,
) -> Result<CallToolResult, McpError> {
    engine.context().set_credential(params.token);
    Ok(json_result(&SessionSetTokenOutput { has_credential: engine.context().has_credential() })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{offline_engine, output};

    #[tokio::test]
    async fn test_sync_now_unreachable_is_skipped() {
        let (engine, _dir) = offline_engine().await;
        let result = sync_now_impl(&engine).await.unwrap();
        let value: serde_json::Value = output(&result);

        assert_eq!(value["outcome"], "ran");
        assert_eq!(value["report"]["skipped"], "unreachable");
    }

    #[tokio::test]
    async fn test_sync_now_without_token_is_auth_error() {
        let (engine, _dir) = offline_engine().await;
        engine.context().set_credential(None);
        let err = sync_now_impl(&engine).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }

    #[tokio::test]
    async fn test_sync_status_reports_queue() {
        let (engine, _dir) = offline_engine().await;
        engine.store().enqueue(stocksync_core::MutationPayload::Delete { id: "1".into() }).await.unwrap();

        let value: serde_json::Value = output(&sync_status_impl(&engine).await.unwrap());
        assert_eq!(value["status"], "idle");
        assert_eq!(value["pending_mutations"], 1);
        assert_eq!(value["has_credential"], true);
    }

    #[tokio::test]
    async fn test_signals() {
        let (engine, _dir) = offline_engine().await;
        let (handle, task) = engine.scheduler().clone().spawn();

        let out: SyncSignalOutput =
            output(&sync_signal_impl(&engine, &handle, SyncSignalParams { signal: Signal::Offline }).await.unwrap());
        assert!(out.accepted);
        assert!(!out.online);

        let out: SyncSignalOutput =
            output(&sync_signal_impl(&engine, &handle, SyncSignalParams { signal: Signal::Offline }).await.unwrap());
        assert!(!out.accepted);

        let out: SyncSignalOutput =
            output(&sync_signal_impl(&engine, &handle, SyncSignalParams { signal: Signal::Wake }).await.unwrap());
        assert!(out.accepted);

        task.abort();
    }

    #[tokio::test]
    async fn test_session_set_token() {
        let (engine, _dir) = offline_engine().await;
        let out: SessionSetTokenOutput =
            output(&session_set_token_impl(&engine, SessionSetTokenParams { token: Some(String::new()) }).await.unwrap());
        assert!(!out.has_credential);

        let out: SessionSetTokenOutput =
            output(&session_set_token_impl(&engine, SessionSetTokenParams { token: Some("abc".into()) }).await.unwrap());
        assert!(out.has_credential);
    }

    #[test]
    fn test_signal_names() {
        let params: SyncSignalParams = serde_json::from_str(r#"{"signal":"wake"}"#).unwrap();
        assert_eq!(params.signal, Signal::Wake);
        assert!(serde_json::from_str::<SyncSignalParams>(r#"{"signal":"reboot"}"#).is_err());
    }
}
