//! Wiring for a complete sync engine.

use std::sync::Arc;

use stocksync_core::{AppConfig, Error, LocalStore};
use tokio::task::JoinHandle;

use crate::api::{HttpInventoryApi, InventoryApi};
use crate::connectivity::spawn_probe;
use crate::context::RuntimeContext;
use crate::fetch::{FetchClient, FetchConfig, Transport, resolve};
use crate::reconcile::Reconciler;
use crate::router::{CacheRouter, RouterConfig};
use crate::scheduler::{SchedulerHandle, SyncScheduler};
use crate::service::InventoryService;
use crate::status::StatusHandle;

/// All engine components sharing one store, context and status handle.
#[derive(Clone)]
pub struct SyncEngine {
    config: AppConfig,
    context: RuntimeContext,
    status: StatusHandle,
    store: LocalStore,
    transport: Arc<dyn Transport>,
    router: CacheRouter,
    scheduler: SyncScheduler,
    service: InventoryService,
}

/// Background tasks started by [`SyncEngine::start`].
pub struct EngineTasks {
    pub handle: SchedulerHandle,
    scheduler: JoinHandle<()>,
    probe: Option<JoinHandle<()>>,
    install: JoinHandle<()>,
}

impl EngineTasks {
    pub fn shutdown(self) {
        self.scheduler.abort();
        self.install.abort();
        if let Some(probe) = self.probe {
            probe.abort();
        }
    }
}

impl SyncEngine {
    /// Open the local store at `config.db_path` and build reqwest-backed clients.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let store = LocalStore::open(&config.db_path).await?;
        let credential = match config.require_auth_token() {
            Ok(token) => Some(token.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "starting without a session token; sync waits until one is set");
                None
            }
        };
        let context = RuntimeContext::new(true, credential);
        let transport = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
        let api = Arc::new(HttpInventoryApi::new(&config, context.clone())?);
        Self::assemble(config, store, context, transport, api)
    }

    /// Build an engine from explicit parts.
    pub fn assemble(
        config: AppConfig, store: LocalStore, context: RuntimeContext, transport: Arc<dyn Transport>,
        api: Arc<dyn InventoryApi>,
    ) -> Result<Self, Error> {
        let status = StatusHandle::new();
        let router = CacheRouter::new(transport.clone(), store.clone(), RouterConfig::from_app(&config)?);
        let reconciler = Reconciler::new(
            api.clone(),
            store.clone(),
            context.clone(),
            status.clone(),
            config.sync_page_size,
        );
        let scheduler =
            SyncScheduler::new(Arc::new(reconciler), context.clone(), status.clone(), config.sync_interval());
        let service = InventoryService::new(
            router.clone(),
            api,
            store.clone(),
            context.clone(),
            status.clone(),
            config.page_size,
            config.max_upload_bytes,
        );

        Ok(Self { config, context, status, store, transport, router, scheduler, service })
    }

    /// Activate the current cache version and start background work: precache,
    /// the trigger loop and the connectivity probe.
    pub async fn start(&self) -> Result<EngineTasks, Error> {
        self.router.activate().await?;

        let router = self.router.clone();
        let install = tokio::spawn(async move {
            if let Err(e) = router.install().await {
                tracing::warn!(error = %e, "precache failed");
            }
        });

        let (handle, scheduler) = self.scheduler.clone().spawn();

        let probe = match self.config.probe_interval() {
            Some(every) => {
                let health = resolve(&self.router.config().base_url, "/health")
                    .map_err(|e| Error::InvalidInput(e.to_string()))?;
                Some(spawn_probe(self.transport.clone(), self.context.clone(), health, every))
            }
            None => None,
        };

        tracing::info!(
            api = %self.config.api_base_url,
            interval_secs = self.config.sync_interval_secs,
            "sync engine started"
        );
        Ok(EngineTasks { handle, scheduler, probe, install })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn router(&self) -> &CacheRouter {
        &self.router
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn service(&self) -> &InventoryService {
        &self.service
    }
}
