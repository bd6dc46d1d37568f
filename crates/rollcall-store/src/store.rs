use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rollcall_core::{Embedding, IdentityRecord};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding dimension mismatch: store is configured for {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("upsert requires at least one embedding")]
    EmptyUpsert,
    #[error("store corrupt: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    identity_id  TEXT PRIMARY KEY,
    display_name TEXT,
    updated_at   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS embeddings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id TEXT NOT NULL REFERENCES identities(identity_id) ON DELETE CASCADE,
    vector      BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_embeddings_identity ON embeddings(identity_id);
";

/// Durable mapping `identity_id -> IdentityRecord`.
///
/// Embedding vectors are stored as little-endian f32 blobs, one row per
/// enrollment, ordered by rowid — values round-trip bit-for-bit. Every
/// write runs in one immediate transaction, so a crash mid-upsert leaves
/// either the old record or the fully updated one, never a torn write.
pub struct IdentityStore {
    conn: Mutex<Connection>,
    /// Embedding dimensionality this store is configured for. Fixed by
    /// the extractor contract; checked on every write and on load.
    dim: usize,
}

impl IdentityStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P, dim: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::init(conn, dim)?;
        tracing::info!(path = %path.display(), dim, "identity store opened");
        Ok(store)
    }

    /// In-memory store, for tests and ephemeral use.
    pub fn open_in_memory(dim: usize) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, dim)
    }

    fn init(conn: Connection, dim: usize) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dim,
        })
    }

    /// Configured embedding dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-call; the
        // connection itself is still consistent (SQLite rolls back open
        // transactions on drop), so recover the guard.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the record for `identity_id`, or append to it.
    ///
    /// Append-only: existing embeddings are never replaced or deduplicated,
    /// since additional reference shots improve later matching. Refreshes
    /// `updated_at`. Returns the total number of embeddings now on file.
    /// Atomic with respect to concurrent upserts for the same identity.
    pub fn upsert(
        &self,
        identity_id: &str,
        display_name: Option<&str>,
        new_embeddings: &[Embedding],
    ) -> Result<usize, StoreError> {
        if new_embeddings.is_empty() {
            return Err(StoreError::EmptyUpsert);
        }
        for e in new_embeddings {
            if e.dim() != self.dim {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dim,
                    actual: e.dim(),
                });
            }
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO identities (identity_id, display_name, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(identity_id) DO UPDATE SET
                 display_name = COALESCE(excluded.display_name, display_name),
                 updated_at = excluded.updated_at",
            params![identity_id, display_name, now],
        )?;

        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO embeddings (identity_id, vector) VALUES (?1, ?2)",
            )?;
            for e in new_embeddings {
                insert.execute(params![identity_id, encode_vector(e)])?;
            }
        }

        let total: usize = tx.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE identity_id = ?1",
            params![identity_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        tracing::debug!(
            identity_id,
            appended = new_embeddings.len(),
            total,
            "upsert committed"
        );
        Ok(total)
    }

    /// Fetch one identity record, or `None` if not enrolled.
    pub fn get(&self, identity_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.lock();

        let Some((display_name, updated_at)) = conn
            .query_row(
                "SELECT display_name, updated_at FROM identities WHERE identity_id = ?1",
                params![identity_id],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(
            "SELECT vector FROM embeddings WHERE identity_id = ?1 ORDER BY id",
        )?;
        let embeddings = stmt
            .query_map(params![identity_id], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|blob| decode_vector(&blob, self.dim))
            .collect::<Result<Vec<_>, _>>()?;

        if embeddings.is_empty() {
            // A record with zero embeddings is equivalent to non-existence.
            return Ok(None);
        }

        Ok(Some(IdentityRecord {
            identity_id: identity_id.to_string(),
            display_name,
            embeddings,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    /// Snapshot of every identity record, ordered by `identity_id`.
    ///
    /// Collected under a single statement, so an in-flight enrollment is
    /// either fully visible or not at all — never a torn record.
    pub fn all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let conn = self.lock();

        let mut stmt = conn.prepare_cached(
            "SELECT i.identity_id, i.display_name, i.updated_at, e.vector
             FROM identities i
             JOIN embeddings e ON e.identity_id = i.identity_id
             ORDER BY i.identity_id, e.id",
        )?;

        let mut records: BTreeMap<String, IdentityRecord> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        for row in rows {
            let (identity_id, display_name, updated_at, blob) = row?;
            let embedding = decode_vector(&blob, self.dim)?;
            match records.entry(identity_id) {
                Entry::Occupied(mut entry) => entry.get_mut().embeddings.push(embedding),
                Entry::Vacant(entry) => {
                    let identity_id = entry.key().clone();
                    let updated_at = parse_timestamp(&updated_at)?;
                    entry.insert(IdentityRecord {
                        identity_id,
                        display_name,
                        embeddings: vec![embedding],
                        updated_at,
                    });
                }
            }
        }

        Ok(records.into_values().collect())
    }

    /// Delete the record for `identity_id`. Returns whether anything was
    /// removed; absent ids are an idempotent no-op.
    pub fn remove(&self, identity_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM identities WHERE identity_id = ?1",
            params![identity_id],
        )? > 0;
        if removed {
            tracing::info!(identity_id, "identity removed");
        }
        Ok(removed)
    }

    /// Number of enrolled identities.
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Embedding -> little-endian f32 blob. Lossless; the inverse of
/// [`decode_vector`].
fn encode_vector(e: &Embedding) -> Vec<u8> {
    let mut buf = Vec::with_capacity(e.values.len() * 4);
    for v in &e.values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_vector(blob: &[u8], dim: usize) -> Result<Embedding, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    let values: Vec<f32> = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if values.len() != dim {
        return Err(StoreError::Corrupt(format!(
            "stored embedding has {} dimensions, store is configured for {dim}; \
             an extractor change requires re-enrollment",
            values.len()
        )));
    }
    Ok(Embedding::new(values))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad updated_at {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_upsert_creates_then_appends() {
        let store = IdentityStore::open_in_memory(3).unwrap();

        let total = store.upsert("alice", Some("Alice"), &[emb(&[1.0, 2.0, 3.0])]).unwrap();
        assert_eq!(total, 1);

        // Re-enrollment is additive, never an overwrite.
        let total = store.upsert("alice", None, &[emb(&[4.0, 5.0, 6.0])]).unwrap();
        assert_eq!(total, 2);

        let record = store.get("alice").unwrap().unwrap();
        assert_eq!(record.embeddings.len(), 2);
        assert_eq!(record.embeddings[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(record.embeddings[1].values, vec![4.0, 5.0, 6.0]);
        // display_name survives an upsert that omits it.
        assert_eq!(record.display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_upsert_rejects_empty_and_wrong_dim() {
        let store = IdentityStore::open_in_memory(3).unwrap();

        assert!(matches!(
            store.upsert("alice", None, &[]),
            Err(StoreError::EmptyUpsert)
        ));
        assert!(matches!(
            store.upsert("alice", None, &[emb(&[1.0, 2.0])]),
            Err(StoreError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        // Nothing was persisted by the failed calls.
        assert!(store.get("alice").unwrap().is_none());
    }

    #[test]
    fn test_get_absent_is_none() {
        let store = IdentityStore::open_in_memory(3).unwrap();
        assert!(store.get("nobody").unwrap().is_none());
    }

    #[test]
    fn test_remove_idempotent() {
        let store = IdentityStore::open_in_memory(2).unwrap();
        store.upsert("alice", None, &[emb(&[1.0, 2.0])]).unwrap();

        assert!(store.remove("alice").unwrap());
        assert!(store.get("alice").unwrap().is_none());
        // Second remove is a no-op, not an error.
        assert!(!store.remove("alice").unwrap());
    }

    #[test]
    fn test_all_snapshot_ordered() {
        let store = IdentityStore::open_in_memory(2).unwrap();
        store.upsert("carol", None, &[emb(&[3.0, 3.0])]).unwrap();
        store.upsert("alice", None, &[emb(&[1.0, 1.0])]).unwrap();
        store.upsert("bob", None, &[emb(&[2.0, 2.0])]).unwrap();

        let all = store.all().unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_roundtrip_bit_exact_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identities.db");

        // Values chosen to exercise non-trivial f32 bit patterns.
        let values = vec![0.1f32, -0.0, f32::MIN_POSITIVE, 1.0e-7, 123.456, -9.87];

        {
            let store = IdentityStore::open(&path, values.len()).unwrap();
            store.upsert("alice", Some("Alice"), &[emb(&values)]).unwrap();
        }

        let store = IdentityStore::open(&path, values.len()).unwrap();
        let record = store.get("alice").unwrap().unwrap();
        assert_eq!(record.embeddings.len(), 1);
        for (stored, original) in record.embeddings[0].values.iter().zip(values.iter()) {
            assert_eq!(stored.to_bits(), original.to_bits());
        }
    }

    #[test]
    fn test_concurrent_upserts_no_lost_updates() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IdentityStore::open(dir.path().join("c.db"), 2).unwrap());

        const WRITERS: usize = 8;
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .upsert("alice", None, &[emb(&[i as f32, 0.0])])
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let record = store.get("alice").unwrap().unwrap();
        assert_eq!(record.embeddings.len(), WRITERS);
    }

    #[test]
    fn test_len_and_is_empty() {
        let store = IdentityStore::open_in_memory(2).unwrap();
        assert!(store.is_empty().unwrap());
        store.upsert("alice", None, &[emb(&[1.0, 2.0])]).unwrap();
        store.upsert("bob", None, &[emb(&[3.0, 4.0])]).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }
}
