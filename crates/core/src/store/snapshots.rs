//! Entity snapshot operations.
//!
//! The snapshot table is a read-mostly mirror of server truth. It is never the
//! system of record: any row here is superseded as soon as an authoritative
//! response for the same id arrives.

use super::connection::LocalStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

/// Last observed copy of a server product.
///
/// `id`, `title`, `sku` and `handle` are lifted out because the store indexes
/// them; every other server-defined field (quantities, price, location, ...)
/// is kept verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EntitySnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntitySnapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), title: None, sku: None, handle: None, fields: Map::new() }
    }

    /// Merge a partial update into this snapshot.
    ///
    /// `null` clears a lifted field. The `id` key is ignored.
    pub fn apply_fields(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            match key.as_str() {
                "id" => {}
                "title" => self.title = value.as_str().map(str::to_string),
                "sku" => self.sku = value.as_str().map(str::to_string),
                "handle" => self.handle = value.as_str().map(str::to_string),
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Case-insensitive substring match on title or sku. `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        let hit = |field: &Option<String>| field.as_deref().is_some_and(|s| s.to_lowercase().contains(needle));
        hit(&self.title) || hit(&self.sku)
    }
}

fn decode(body_json: &str) -> Result<EntitySnapshot, Error> {
    serde_json::from_str(body_json).map_err(|e| Error::CorruptRow(format!("snapshot: {e}")))
}

impl LocalStore {
    /// Insert or fully replace snapshots by id.
    ///
    /// All rows are written in one transaction. When the same id appears more
    /// than once the later entry wins. Empty input is a no-op.
    pub async fn upsert_snapshots(&self, entities: &[EntitySnapshot]) -> Result<usize, Error> {
        if entities.is_empty() {
            return Ok(0);
        }

        let rows = entities
            .iter()
            .map(|e| {
                serde_json::to_string(e).map(|json| (e.id.clone(), e.title.clone(), e.sku.clone(), e.handle.clone(), json))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidInput(format!("failed to encode snapshot: {e}")))?;
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO snapshots (id, title, sku, handle, body_json, stored_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        ON CONFLICT(id) DO UPDATE SET
                            title = excluded.title,
                            sku = excluded.sku,
                            handle = excluded.handle,
                            body_json = excluded.body_json,
                            stored_at = excluded.stored_at",
                    )?;
                    for (id, title, sku, handle, json) in &rows {
                        stmt.execute(params![id, title, sku, handle, json, stored_at])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Return up to `limit` snapshots in the store's native order.
    ///
    /// A non-blank `search_term` keeps only entities whose title or sku
    /// contains it, ignoring case.
    pub async fn query(&self, search_term: Option<&str>, limit: usize) -> Result<Vec<EntitySnapshot>, Error> {
        let needle = search_term.map(str::trim).filter(|t| !t.is_empty()).map(str::to_lowercase);

        self.conn
            .call(move |conn| -> Result<Vec<EntitySnapshot>, Error> {
                let mut stmt = conn.prepare("SELECT body_json FROM snapshots ORDER BY rowid")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();

                while out.len() < limit {
                    let Some(row) = rows.next()? else { break };
                    let snapshot = decode(&row.get::<_, String>(0)?)?;
                    if needle.as_deref().is_none_or(|n| snapshot.matches(n)) {
                        out.push(snapshot);
                    }
                }

                Ok(out)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a snapshot by id.
    pub async fn get_snapshot(&self, id: &str) -> Result<Option<EntitySnapshot>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<EntitySnapshot>, Error> {
                let json: Option<String> = conn
                    .query_row("SELECT body_json FROM snapshots WHERE id = ?1", params![id], |row| row.get(0))
                    .optional()?;
                json.as_deref().map(decode).transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// Merge a partial update into the stored snapshot, if there is one.
    ///
    /// Returns the updated snapshot, or `None` when the id is unknown locally.
    pub async fn apply_patch(&self, id: &str, patch: &Map<String, Value>) -> Result<Option<EntitySnapshot>, Error> {
        let Some(mut snapshot) = self.get_snapshot(id).await? else {
            return Ok(None);
        };
        snapshot.apply_fields(patch);
        self.upsert_snapshots(std::slice::from_ref(&snapshot)).await?;
        Ok(Some(snapshot))
    }

    /// Remove a single snapshot. Returns whether a row was deleted.
    pub async fn remove_snapshot(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every snapshot. Only for explicit cache resets.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_snapshots(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM snapshots", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn count_snapshots(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
