//! Connectivity probe.
//!
//! Polls the API health endpoint and records the result on the
//! [`RuntimeContext`]. Any HTTP answer counts as online; only transport
//! failures count as offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::context::RuntimeContext;
use crate::fetch::{FetchRequest, Transport};

pub async fn probe_once(transport: &dyn Transport, health_url: &Url) -> bool {
    match transport.send(&FetchRequest::get(health_url.clone())).await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "health probe failed");
            false
        }
    }
}

/// Probe `health_url` every `every` and update the context on transitions.
pub fn spawn_probe(
    transport: Arc<dyn Transport>, context: RuntimeContext, health_url: Url, every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = probe_once(transport.as_ref(), &health_url).await;
            if context.set_online(online) {
                tracing::info!(online, "connectivity changed");
            }
        }
    })
}
