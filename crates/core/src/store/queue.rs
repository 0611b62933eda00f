//! Durable FIFO queue of mutations made while offline.
//!
//! Each queued item is assigned a sequence id at enqueue time; replay order is
//! ascending sequence id and nothing else. `drain_all` reads and deletes in one
//! transaction, so an item leaves durable storage only together with every
//! item before it. A crash between drain and replay can resend an item
//! (at-least-once), which is why the server operations it drives must be safe
//! to apply twice.

use super::connection::LocalStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tokio_rusqlite::params;

/// What a queued mutation does when replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Upload,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Upload => "upload",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(MutationKind::Upload),
            "update" => Ok(MutationKind::Update),
            "delete" => Ok(MutationKind::Delete),
            other => Err(Error::CorruptRow(format!("unknown mutation kind: {other}"))),
        }
    }
}

/// Kind-specific data needed to replay a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationPayload {
    /// A file upload: raw bytes plus the original filename.
    Upload { file_name: String, bytes: Vec<u8> },
    /// A partial update of one entity.
    Update { id: String, fields: Map<String, Value> },
    /// Removal of one entity.
    Delete { id: String },
}

#[derive(Serialize, Deserialize)]
struct UploadMeta {
    file_name: String,
}

#[derive(Serialize, Deserialize)]
struct UpdateMeta {
    id: String,
    fields: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct DeleteMeta {
    id: String,
}

impl MutationPayload {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationPayload::Upload { .. } => MutationKind::Upload,
            MutationPayload::Update { .. } => MutationKind::Update,
            MutationPayload::Delete { .. } => MutationKind::Delete,
        }
    }

    /// Split into the `payload_json` and `body` columns.
    ///
    /// Upload bytes go to the BLOB column as-is; everything else is JSON.
    fn to_columns(&self) -> Result<(String, Option<Vec<u8>>), serde_json::Error> {
        match self {
            MutationPayload::Upload { file_name, bytes } => {
                Ok((serde_json::to_string(&UploadMeta { file_name: file_name.clone() })?, Some(bytes.clone())))
            }
            MutationPayload::Update { id, fields } => {
                Ok((serde_json::to_string(&UpdateMeta { id: id.clone(), fields: fields.clone() })?, None))
            }
            MutationPayload::Delete { id } => Ok((serde_json::to_string(&DeleteMeta { id: id.clone() })?, None)),
        }
    }

    fn from_columns(kind: MutationKind, payload_json: &str, body: Option<Vec<u8>>) -> Result<Self, Error> {
        let corrupt = |e: serde_json::Error| Error::CorruptRow(format!("{kind} payload: {e}"));
        match kind {
            MutationKind::Upload => {
                let meta: UploadMeta = serde_json::from_str(payload_json).map_err(corrupt)?;
                let bytes = body.ok_or_else(|| Error::CorruptRow("upload without body".into()))?;
                Ok(MutationPayload::Upload { file_name: meta.file_name, bytes })
            }
            MutationKind::Update => {
                let meta: UpdateMeta = serde_json::from_str(payload_json).map_err(corrupt)?;
                Ok(MutationPayload::Update { id: meta.id, fields: meta.fields })
            }
            MutationKind::Delete => {
                let meta: DeleteMeta = serde_json::from_str(payload_json).map_err(corrupt)?;
                Ok(MutationPayload::Delete { id: meta.id })
            }
        }
    }
}

/// A pending change not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMutation {
    pub sequence_id: i64,
    pub payload: MutationPayload,
    pub enqueued_at: String,
}

impl QueuedMutation {
    pub fn kind(&self) -> MutationKind {
        self.payload.kind()
    }
}

type QueueRow = (i64, String, String, Option<Vec<u8>>, String);

fn decode_row((sequence_id, kind, payload_json, body, enqueued_at): QueueRow) -> Result<QueuedMutation, Error> {
    let kind: MutationKind = kind.parse()?;
    let payload = MutationPayload::from_columns(kind, &payload_json, body)?;
    Ok(QueuedMutation { sequence_id, payload, enqueued_at })
}

const SELECT_QUEUE: &str =
    "SELECT sequence_id, kind, payload_json, body, enqueued_at FROM mutation_queue ORDER BY sequence_id ASC";

impl LocalStore {
    /// Durably append a mutation.
    ///
    /// Returns only after the row is committed. Any storage failure is
    /// returned to the caller; nothing is silently dropped.
    pub async fn enqueue(&self, payload: MutationPayload) -> Result<QueuedMutation, Error> {
        let kind = payload.kind();
        let (payload_json, body) = payload
            .to_columns()
            .map_err(|e| Error::InvalidInput(format!("failed to encode {kind} payload: {e}")))?;
        let enqueued_at = chrono::Utc::now().to_rfc3339();

        let at = enqueued_at.clone();
        let sequence_id = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO mutation_queue (kind, payload_json, body, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
                    params![kind.as_str(), payload_json, body, at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(sequence_id, %kind, "enqueued mutation");

        Ok(QueuedMutation { sequence_id, payload, enqueued_at })
    }

    /// Atomically read and remove every queued mutation, oldest first.
    ///
    /// An empty queue returns an empty vec without writing. If anything fails
    /// (including decoding a row) the transaction rolls back and the queue is
    /// left exactly as it was.
    pub async fn drain_all(&self) -> Result<Vec<QueuedMutation>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<QueuedMutation>, Error> {
                let tx = conn.transaction()?;
                let rows: Vec<QueueRow> = {
                    let mut stmt = tx.prepare(SELECT_QUEUE)?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))?
                        .collect::<Result<Vec<QueueRow>, _>>()?;
                    rows
                };

                let Some(last) = rows.last().map(|r| r.0) else {
                    return Ok(Vec::new());
                };

                let items = rows.into_iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
                tx.execute("DELETE FROM mutation_queue WHERE sequence_id <= ?1", params![last])?;
                tx.commit()?;
                Ok(items)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove queued rows that can no longer be decoded, keeping the rest.
    ///
    /// `drain_all` refuses to remove anything while such a row exists, so
    /// this is the way out for an operator. Returns the discarded sequence ids.
    pub async fn discard_corrupt_mutations(&self) -> Result<Vec<i64>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<i64>, Error> {
                let tx = conn.transaction()?;
                let rows: Vec<QueueRow> = {
                    let mut stmt = tx.prepare(SELECT_QUEUE)?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))?
                        .collect::<Result<Vec<QueueRow>, _>>()?;
                    rows
                };

                let mut discarded = Vec::new();
                for row in rows {
                    let sequence_id = row.0;
                    if let Err(e) = decode_row(row) {
                        tracing::warn!(sequence_id, error = %e, "discarding undecodable queued mutation");
                        tx.execute("DELETE FROM mutation_queue WHERE sequence_id = ?1", params![sequence_id])?;
                        discarded.push(sequence_id);
                    }
                }
                tx.commit()?;
                Ok(discarded)
            })
            .await
            .map_err(Error::from)
    }

    /// List queued mutations without removing them.
    pub async fn pending_mutations(&self) -> Result<Vec<QueuedMutation>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<QueuedMutation>, Error> {
                let mut stmt = conn.prepare(SELECT_QUEUE)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))?
                    .collect::<Result<Vec<QueueRow>, _>>()?;
                rows.into_iter().map(decode_row).collect()
            })
            .await
            .map_err(Error::from)
    }

    pub async fn queue_len(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upload(name: &str, bytes: &[u8]) -> MutationPayload {
        MutationPayload::Upload { file_name: name.to_string(), bytes: bytes.to_vec() }
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_ids() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let first = db.enqueue(upload("a.csv", b"a")).await.unwrap();
        let second = db.enqueue(upload("b.csv", b"b")).await.unwrap();
        assert!(second.sequence_id > first.sequence_id);
        assert_eq!(db.queue_len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_drain_returns_in_order_and_empties() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let a = db.enqueue(upload("a.csv", b"Handle,Title\n")).await.unwrap();
        let b = db
            .enqueue(MutationPayload::Update { id: "p1".into(), fields: json!({"available": 3}).as_object().unwrap().clone() })
            .await
            .unwrap();
        let c = db.enqueue(MutationPayload::Delete { id: "p2".into() }).await.unwrap();

        let drained = db.drain_all().await.unwrap();
        assert_eq!(drained, vec![a, b, c]);
        assert_eq!(db.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_empty_is_noop() {
        let db = LocalStore::open_in_memory().await.unwrap();
        assert!(db.drain_all().await.unwrap().is_empty());
        assert!(db.drain_all().await.unwrap().is_empty());
        assert_eq!(db.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sequence_ids_not_reused_after_drain() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let first = db.enqueue(upload("a.csv", b"a")).await.unwrap();
        db.drain_all().await.unwrap();
        let next = db.enqueue(upload("b.csv", b"b")).await.unwrap();
        assert!(next.sequence_id > first.sequence_id);
    }

    #[tokio::test]
    async fn test_enqueue_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");

        let bytes: Vec<u8> = (0u8..=255).collect();
        let (first, second) = {
            let db = LocalStore::open(&path).await.unwrap();
            let first = db.enqueue(upload("binary.csv", &bytes)).await.unwrap();
            let second = db.enqueue(MutationPayload::Delete { id: "p9".into() }).await.unwrap();
            (first, second)
        };

        let reopened = LocalStore::open(&path).await.unwrap();
        let drained = reopened.drain_all().await.unwrap();
        assert_eq!(drained, vec![first, second]);
        match &drained[0].payload {
            MutationPayload::Upload { bytes: stored, .. } => assert_eq!(stored, &bytes),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_row_leaves_queue_untouched() {
        let db = LocalStore::open_in_memory().await.unwrap();
        db.enqueue(upload("a.csv", b"a")).await.unwrap();
        db.conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO mutation_queue (kind, payload_json, body, enqueued_at) VALUES ('bogus', '{}', NULL, 'now')",
                    [],
                )
            })
            .await
            .unwrap();

        assert!(matches!(db.drain_all().await, Err(Error::CorruptRow(_))));
        assert_eq!(db.queue_len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_discard_corrupt_unblocks_drain() {
        let db = LocalStore::open_in_memory().await.unwrap();
        let kept = db.enqueue(upload("a.csv", b"a")).await.unwrap();
        db.conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO mutation_queue (kind, payload_json, body, enqueued_at) VALUES ('bogus', '{}', NULL, 'now')",
                    [],
                )
            })
            .await
            .unwrap();
        let last = db.enqueue(MutationPayload::Delete { id: "9".into() }).await.unwrap();

        let discarded = db.discard_corrupt_mutations().await.unwrap();
        assert_eq!(discarded, vec![kept.sequence_id + 1]);
        assert!(db.discard_corrupt_mutations().await.unwrap().is_empty());

        let drained = db.drain_all().await.unwrap();
        assert_eq!(drained, vec![kept, last]);
    }

    #[tokio::test]
    async fn test_pending_does_not_remove() {
        let db = LocalStore::open_in_memory().await.unwrap();
        db.enqueue(upload("a.csv", b"a")).await.unwrap();
        assert_eq!(db.pending_mutations().await.unwrap().len(), 1);
        assert_eq!(db.queue_len().await.unwrap(), 1);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("upload".parse::<MutationKind>().unwrap(), MutationKind::Upload);
        assert!("patch".parse::<MutationKind>().is_err());
    }
}
