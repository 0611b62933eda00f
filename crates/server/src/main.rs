//! stocksync server entry point.
//!
//! Boots the sync engine (local store, router, scheduler, connectivity probe)
//! and exposes it as an MCP server on stdio transport. Logging goes to stderr
//! to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use stocksync_client::SyncEngine;
use stocksync_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(db_path = %config.db_path.display(), "starting stocksync server on stdio transport");

    let engine = SyncEngine::open(config).await?;
    let tasks = engine.start().await?;

    let handler = handler::SyncServer::new(engine, tasks.handle.clone());
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;
    tasks.shutdown();

    Ok(())
}
