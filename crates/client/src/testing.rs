//! In-memory fakes for the transport and API seams.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use stocksync_core::{EntitySnapshot, Error};
use tokio::sync::Notify;

use crate::api::{InventoryApi, ListQuery, ProductPage, UploadReceipt, UploadStats};
use crate::fetch::{FetchRequest, FetchResponse, ResponseSource, Transport};

pub fn snapshot(id: &str, title: &str, sku: &str) -> EntitySnapshot {
    EntitySnapshot { title: Some(title.into()), sku: Some(sku.into()), ..EntitySnapshot::new(id) }
}

/// Transport answering from a path → (status, body) table.
///
/// Unknown paths return 404. While offline every request fails with
/// `NetworkUnavailable`.
pub struct FakeTransport {
    online: AtomicBool,
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self { online: AtomicBool::new(true), routes: Mutex::new(HashMap::new()), calls: Mutex::new(HashMap::new()) }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn respond(&self, path: &str, status: u16, body: &[u8]) {
        self.routes.lock().unwrap().insert(path.to_string(), (status, body.to_vec()));
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let path = request.url.path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::NetworkUnavailable("simulated outage".into()));
        }

        let (status, body) = self.routes.lock().unwrap().get(&path).cloned().unwrap_or((404, Vec::new()));
        Ok(FetchResponse {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: Bytes::from(body),
            source: ResponseSource::Network,
            fetch_ms: 1,
        })
    }
}

/// In-memory authoritative API.
pub struct FakeApi {
    online: AtomicBool,
    auth_rejected: AtomicBool,
    products: Mutex<Vec<EntitySnapshot>>,
    failing_uploads: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    blocking: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            auth_rejected: AtomicBool::new(false),
            products: Mutex::new(Vec::new()),
            failing_uploads: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            blocking: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn reject_auth(&self) {
        self.auth_rejected.store(true, Ordering::SeqCst);
    }

    pub fn set_products(&self, products: Vec<EntitySnapshot>) {
        *self.products.lock().unwrap() = products;
    }

    pub fn fail_upload(&self, file_name: &str) {
        self.failing_uploads.lock().unwrap().insert(file_name.to_string());
    }

    /// Make `list` wait on `release` after signalling `entered`.
    pub fn block_list(&self) {
        self.blocking.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check(&self, call: String) -> Result<(), Error> {
        self.calls.lock().unwrap().push(call);
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::NetworkUnavailable("simulated outage".into()));
        }
        if self.auth_rejected.load(Ordering::SeqCst) {
            return Err(Error::AuthRejected("Token expirado".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryApi for FakeApi {
    async fn list(&self, query: &ListQuery) -> Result<ProductPage, Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.blocking.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.check(format!("list:{}", query.offset))?;

        let products = self.products.lock().unwrap().clone();
        let total = products.len() as u64;
        let page = products.into_iter().skip(query.offset as usize).take(query.limit as usize).collect();
        Ok(ProductPage { products: page, total })
    }

    async fn upload(&self, file_name: &str, _bytes: Vec<u8>) -> Result<UploadReceipt, Error> {
        self.check(format!("upload:{file_name}"))?;
        if self.failing_uploads.lock().unwrap().contains(file_name) {
            return Err(Error::HttpError { status: 500, message: "Error al procesar el CSV".into() });
        }
        Ok(UploadReceipt {
            message: "CSV procesado correctamente".into(),
            filename: Some(file_name.to_string()),
            stats: UploadStats { inserted: 1, updated: 0, errors: Vec::new() },
        })
    }

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<EntitySnapshot, Error> {
        self.check(format!("update:{id}"))?;
        let mut products = self.products.lock().unwrap();
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::HttpError { status: 404, message: "Producto no encontrado".into() })?;
        product.apply_fields(fields);
        Ok(product.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.check(format!("delete:{id}"))?;
        let mut products = self.products.lock().unwrap();
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Err(Error::HttpError { status: 404, message: "Producto no encontrado".into() });
        }
        Ok(())
    }
}
