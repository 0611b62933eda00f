//! UI-facing operations.
//!
//! Reads go through the cache-strategy router and fall back to the local
//! store when the router reports the network as unavailable. Writes try the
//! authoritative API first and, when it cannot be reached, are queued and
//! applied to the local store optimistically.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use stocksync_core::{EntitySnapshot, Error, LocalStore, MutationPayload, QueuedMutation, SyncStatus};

use crate::api::{InventoryApi, ListQuery, ProductPage, UploadReceipt};
use crate::context::RuntimeContext;
use crate::fetch::{FetchRequest, ResponseSource, resolve};
use crate::reconcile::ReconcileReport;
use crate::router::CacheRouter;
use crate::status::StatusHandle;

/// File name used when a queued upload has none.
pub const DEFAULT_UPLOAD_NAME: &str = "inventory.csv";

/// Where a page of entities was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    Network,
    /// A response cached by the router for the same request.
    Cache,
    /// The local snapshot store, when neither network nor cache answered.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct LoadedPage {
    pub products: Vec<EntitySnapshot>,
    pub total: u64,
    pub page: u32,
    pub source: PageSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Uploaded(UploadReceipt),
    Queued(QueuedMutation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The server accepted the write. Carries the authoritative entity, if any.
    Applied(Option<EntitySnapshot>),
    /// The write was queued for replay and applied locally.
    Queued { mutation: QueuedMutation, local: Option<EntitySnapshot> },
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct SyncStatusView {
    pub status: SyncStatus,
    pub online: bool,
    pub has_credential: bool,
    pub pending_mutations: u64,
    pub last_report: Option<ReconcileReport>,
}

#[derive(Clone)]
pub struct InventoryService {
    router: CacheRouter,
    api: Arc<dyn InventoryApi>,
    store: LocalStore,
    context: RuntimeContext,
    status: StatusHandle,
    page_size: u32,
    max_upload_bytes: u64,
}

impl InventoryService {
    pub fn new(
        router: CacheRouter, api: Arc<dyn InventoryApi>, store: LocalStore, context: RuntimeContext,
        status: StatusHandle, page_size: u32, max_upload_bytes: u64,
    ) -> Self {
        Self { router, api, store, context, status, page_size, max_upload_bytes }
    }

    /// Load one page (1-based) of entities, optionally filtered.
    ///
    /// # Errors
    ///
    /// `AuthRejected` on 401, `HttpError` on other error statuses. An
    /// unreachable network is not an error: the local store answers instead,
    /// with `total` equal to the number of rows returned.
    pub async fn load_entities(&self, search: Option<&str>, page: u32) -> Result<LoadedPage, Error> {
        let page = page.max(1);
        let query = ListQuery::page(search, page, self.page_size);

        let mut url = resolve(&self.router.config().base_url, &format!("{}inventory", self.router.config().api_prefix))
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(term) = &query.search {
                pairs.append_pair("search", term);
            }
            pairs.append_pair("limit", &query.limit.to_string());
            pairs.append_pair("offset", &query.offset.to_string());
        }

        let mut request = FetchRequest::get(url).with_header("accept", "application/json");
        if let Some(token) = self.context.credential() {
            request = request.with_header("authorization", format!("Bearer {token}"));
        }

        let response = self.router.handle(request).await?;
        if response.is_offline() {
            let products = self.store.query(query.search.as_deref(), self.page_size as usize).await?;
            tracing::debug!(rows = products.len(), "serving entities from local store");
            return Ok(LoadedPage { total: products.len() as u64, products, page, source: PageSource::Local });
        }
        if response.status == 401 {
            return Err(Error::AuthRejected(String::from_utf8_lossy(&response.body).into_owned()));
        }
        if !response.is_success() {
            return Err(Error::HttpError {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let body: ProductPage = response.json()?;
        let source = match response.source {
            ResponseSource::Cache => PageSource::Cache,
            _ => {
                if let Err(e) = self.store.upsert_snapshots(&body.products).await {
                    tracing::warn!(error = %e, "failed to refresh snapshots from page");
                }
                PageSource::Network
            }
        };

        Ok(LoadedPage { products: body.products, total: body.total, page, source })
    }

    /// Check an upload before it is sent or queued. Returns the file name to use.
    fn validate_upload(&self, file_name: &str, len: usize) -> Result<String, Error> {
        let name = match file_name.trim() {
            "" => DEFAULT_UPLOAD_NAME.to_string(),
            name => name.to_string(),
        };
        if !name.to_ascii_lowercase().ends_with(".csv") {
            return Err(Error::InvalidInput(format!("only .csv files are accepted: {name}")));
        }
        if len == 0 {
            return Err(Error::InvalidInput("upload is empty".into()));
        }
        if len as u64 > self.max_upload_bytes {
            return Err(Error::InvalidInput(format!("{} bytes exceeds {}", len, self.max_upload_bytes)));
        }
        Ok(name)
    }

    /// Durably queue an upload for replay.
    ///
    /// # Errors
    ///
    /// Persistence failures are returned; the upload was not queued.
    pub async fn queue_offline_upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<QueuedMutation, Error> {
        let file_name = self.validate_upload(file_name, bytes.len())?;
        let queued = self.store.enqueue(MutationPayload::Upload { file_name, bytes }).await?;
        tracing::info!(sequence_id = queued.sequence_id, "upload queued for sync");
        Ok(queued)
    }

    /// Upload now if possible, otherwise queue.
    pub async fn upload_or_queue(&self, bytes: Vec<u8>, file_name: &str) -> Result<UploadOutcome, Error> {
        let file_name = self.validate_upload(file_name, bytes.len())?;
        if !self.context.is_online() {
            return self.queue_offline_upload(bytes, &file_name).await.map(UploadOutcome::Queued);
        }

        match self.api.upload(&file_name, bytes.clone()).await {
            Ok(receipt) => Ok(UploadOutcome::Uploaded(receipt)),
            Err(e) if e.is_network() => {
                tracing::warn!(error = %e, "upload failed; queueing");
                self.queue_offline_upload(bytes, &file_name).await.map(UploadOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Update an entity now, or queue the patch and apply it locally.
    pub async fn update_or_queue(&self, id: &str, fields: Map<String, Value>) -> Result<WriteOutcome, Error> {
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("id must not be empty".into()));
        }
        if self.context.is_online() {
            match self.api.update(id, &fields).await {
                Ok(entity) => {
                    self.store.upsert_snapshots(std::slice::from_ref(&entity)).await?;
                    return Ok(WriteOutcome::Applied(Some(entity)));
                }
                Err(e) if e.is_network() => tracing::warn!(id, error = %e, "update failed; queueing"),
                Err(e) => return Err(e),
            }
        }

        let mutation = self.store.enqueue(MutationPayload::Update { id: id.to_string(), fields: fields.clone() }).await?;
        let local = self.store.apply_patch(id, &fields).await?;
        Ok(WriteOutcome::Queued { mutation, local })
    }

    /// Delete an entity now, or queue the delete and remove it locally.
    pub async fn delete_or_queue(&self, id: &str) -> Result<WriteOutcome, Error> {
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("id must not be empty".into()));
        }
        if self.context.is_online() {
            match self.api.delete(id).await {
                Ok(()) => {
                    self.store.remove_snapshot(id).await?;
                    return Ok(WriteOutcome::Applied(None));
                }
                Err(e) if e.is_network() => tracing::warn!(id, error = %e, "delete failed; queueing"),
                Err(e) => return Err(e),
            }
        }

        let mutation = self.store.enqueue(MutationPayload::Delete { id: id.to_string() }).await?;
        self.store.remove_snapshot(id).await?;
        Ok(WriteOutcome::Queued { mutation, local: None })
    }

    pub async fn sync_status(&self) -> Result<SyncStatusView, Error> {
        Ok(SyncStatusView {
            status: self.status.current(),
            online: self.context.is_online(),
            has_credential: self.context.has_credential(),
            pending_mutations: self.store.queue_len().await?,
            last_report: self.status.last_report(),
        })
    }

    /// Remove every snapshot. Queued mutations are kept.
    pub async fn clear_local_cache(&self) -> Result<u64, Error> {
        let removed = self.store.clear_snapshots().await?;
        tracing::info!(removed, "local snapshot cache cleared");
        Ok(removed)
    }
}
