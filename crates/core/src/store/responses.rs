//! Response cache operations.
//!
//! Stores HTTP responses for the cache-strategy router, keyed by the request
//! hash from [`super::hash::compute_cache_key`]. Entries are grouped under a
//! cache name so that a new cache version can discard the old one wholesale.

use super::connection::LocalStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

/// A stored HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl LocalStore {
    /// Get a cached response by key hash within the named cache.
    ///
    /// Returns None if the key doesn't exist in that cache.
    pub async fn get_response(&self, cache_name: &str, key_hash: &str) -> Result<Option<CachedResponse>, Error> {
        let cache_name = cache_name.to_string();
        let key_hash = key_hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let row = conn
                    .query_row(
                        "SELECT key_hash, method, url, status, headers_json, body, stored_at
                        FROM response_cache WHERE key_hash = ?1 AND cache_name = ?2",
                        params![key_hash, cache_name],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, u16>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, Vec<u8>>(5)?,
                                row.get::<_, String>(6)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((key_hash, method, url, status, headers_json, body, stored_at)) = row else {
                    return Ok(None);
                };
                let headers = serde_json::from_str(&headers_json)
                    .map_err(|e| Error::CorruptRow(format!("response headers: {e}")))?;

                Ok(Some(CachedResponse { key_hash, method, url, status, headers, body, stored_at }))
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a cached response.
    ///
    /// Uses UPSERT semantics: a newer response for the same key overwrites
    /// the previous one, including moving it into `cache_name`.
    pub async fn put_response(&self, cache_name: &str, response: &CachedResponse) -> Result<(), Error> {
        let cache_name = cache_name.to_string();
        let response = response.clone();
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO response_cache (key_hash, cache_name, method, url, status, headers_json, body, stored_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(key_hash) DO UPDATE SET
                        cache_name = excluded.cache_name,
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        response.key_hash,
                        cache_name,
                        response.method,
                        response.url,
                        response.status,
                        headers_json,
                        response.body,
                        response.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry that does not belong to `keep`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_other_caches(&self, keep: &str) -> Result<u64, Error> {
        let keep = keep.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM response_cache WHERE cache_name <> ?1", params![keep])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn count_responses(&self, cache_name: &str) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM response_cache WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::hash::compute_cache_key;

    fn response(url: &str, body: &[u8]) -> CachedResponse {
        CachedResponse {
            key_hash: compute_cache_key("GET", url, ""),
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_response() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let stored = response("http://localhost:3000/api/inventory", br#"{"products":[],"total":0}"#);

        db.put_response("v1", &stored).await.unwrap();

        let retrieved = db.get_response("v1", &stored.key_hash).await.unwrap().unwrap();
        assert_eq!(retrieved, stored);
    }

    #[tokio::test]
    async fn test_get_missing_response() {
        let db = LocalStore::open_in_memory().await.unwrap();
        assert!(db.get_response("v1", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_scoped_to_cache_name() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let stored = response("http://localhost:3000/index.html", b"<html></html>");
        db.put_response("v1", &stored).await.unwrap();

        assert!(db.get_response("v2", &stored.key_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_response() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let url = "http://localhost:3000/api/inventory";

        db.put_response("v1", &response(url, b"old")).await.unwrap();
        db.put_response("v1", &response(url, b"new")).await.unwrap();

        let retrieved = db
            .get_response("v1", &compute_cache_key("GET", url, ""))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retrieved.body, b"new");
        assert_eq!(db.count_responses("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_other_caches() {
        let db = LocalStore::open_in_memory().await.unwrap();
        db.put_response("v0", &response("http://localhost:3000/a.css", b"a")).await.unwrap();
        db.put_response("v0", &response("http://localhost:3000/b.js", b"b")).await.unwrap();
        db.put_response("v1", &response("http://localhost:3000/c.js", b"c")).await.unwrap();

        assert_eq!(db.purge_other_caches("v1").await.unwrap(), 2);
        assert_eq!(db.count_responses("v0").await.unwrap(), 0);
        assert_eq!(db.count_responses("v1").await.unwrap(), 1);
    }
}
