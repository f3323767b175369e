//! Durable embedding store using SQLite
//!
//! One row per text unit, keyed by unit id, vectors as little-endian f32
//! BLOBs. Rows are never updated; `seq` gives a stable insertion order.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::error::{Result, SearchError};
use super::units::UnitKind;

pub const META_MODEL: &str = "model";
pub const META_DIMENSION: &str = "dimension";
pub const META_LAST_BUILD: &str = "last_build";

/// A persisted vector and the unit it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub conv_id: String,
    pub kind: UnitKind,
    pub vector: Vec<f32>,
}

/// Store statistics
#[derive(Debug)]
pub struct StoreStats {
    pub records: usize,
    pub conversations: usize,
    pub messages: usize,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub last_build: Option<i64>,
}

pub struct EmbeddingStore {
    conn: Connection,
}

impl EmbeddingStore {
    /// Open or create the store at path
    ///
    /// Fails if the file exists but is not a readable database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conv_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                dim INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_conv ON embeddings(conv_id);
            "#,
        )?;
        Ok(())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM embeddings WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All stored ids
    pub fn ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM embeddings")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    /// Every record in insertion order
    pub fn all(&self) -> Result<Vec<EmbeddingRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, conv_id, kind, dim, vector FROM embeddings ORDER BY seq")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, conv_id, kind, dim, blob) = row?;
            let kind = kind
                .parse::<UnitKind>()
                .map_err(|reason| SearchError::CorruptRecord { id: id.clone(), reason })?;
            let vector = blob_to_vector(&id, &blob, dim)?;
            records.push(EmbeddingRecord {
                id,
                conv_id,
                kind,
                vector,
            });
        }
        Ok(records)
    }

    /// Insert a batch of new records in one transaction
    ///
    /// Records are immutable: an id that is already stored is an error.
    pub fn put_batch(&mut self, records: &[EmbeddingRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO embeddings (id, conv_id, kind, dim, vector, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.conv_id,
                    record.kind.as_str(),
                    record.vector.len() as i64,
                    vector_to_blob(&record.vector),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn put(&mut self, record: &EmbeddingRecord) -> Result<()> {
        self.put_batch(std::slice::from_ref(record))
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let count_kind = |kind: UnitKind| -> Result<usize> {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        };

        Ok(StoreStats {
            records: self.len()?,
            conversations: count_kind(UnitKind::Conversation)?,
            messages: count_kind(UnitKind::Message)?,
            model: self.get_meta(META_MODEL)?,
            dimension: self
                .get_meta(META_DIMENSION)?
                .and_then(|d| d.parse().ok()),
            last_build: self
                .get_meta(META_LAST_BUILD)?
                .and_then(|t| t.parse().ok()),
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(id: &str, blob: &[u8], dim: i64) -> Result<Vec<f32>> {
    let corrupt = |reason: String| SearchError::CorruptRecord {
        id: id.to_string(),
        reason,
    };

    if blob.len() % 4 != 0 {
        return Err(corrupt(format!("blob length {} is not a multiple of 4", blob.len())));
    }
    if blob.len() / 4 != dim as usize {
        return Err(corrupt(format!(
            "blob holds {} values but row says {}",
            blob.len() / 4,
            dim
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, kind: UnitKind, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            conv_id: "conv".to_string(),
            kind,
            vector,
        }
    }

    #[test]
    fn test_blob_conversion() -> Result<()> {
        let vector = vec![1.0, 2.0, 3.0, -0.5];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob_to_vector("x", &blob, 4)?, vector);
        assert!(blob_to_vector("x", &blob[..5], 1).is_err());
        assert!(blob_to_vector("x", &blob, 3).is_err());
        Ok(())
    }

    #[test]
    fn test_store_operations() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        assert!(store.is_empty()?);

        store.put_batch(&[
            record("b", UnitKind::Conversation, vec![0.1, 0.2]),
            record("a", UnitKind::Message, vec![0.3, 0.4]),
        ])?;
        store.put(&record("c", UnitKind::Message, vec![0.5, 0.6]))?;

        assert!(store.contains("a")?);
        assert!(!store.contains("z")?);
        assert_eq!(store.ids()?.len(), 3);

        // Insertion order, not id order
        let ids: Vec<String> = store.all()?.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let stats = store.stats()?;
        assert_eq!(stats.records, 3);
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.messages, 2);
        assert!(stats.model.is_none());
        Ok(())
    }

    #[test]
    fn test_records_are_immutable() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        store.put(&record("a", UnitKind::Message, vec![1.0]))?;
        assert!(store.put(&record("a", UnitKind::Message, vec![2.0])).is_err());

        // A failed batch leaves nothing behind
        let batch = [
            record("b", UnitKind::Message, vec![1.0]),
            record("a", UnitKind::Message, vec![1.0]),
        ];
        assert!(store.put_batch(&batch).is_err());
        assert!(!store.contains("b")?);
        assert_eq!(store.all()?[0].vector, vec![1.0]);
        Ok(())
    }

    #[test]
    fn test_meta() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        assert_eq!(store.get_meta(META_MODEL)?, None);
        store.set_meta(META_MODEL, "harmonic-384")?;
        store.set_meta(META_MODEL, "text-embedding-3-small")?;
        assert_eq!(
            store.get_meta(META_MODEL)?.as_deref(),
            Some("text-embedding-3-small")
        );
        Ok(())
    }

    #[test]
    fn test_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("embeddings.db");

        {
            let mut store = EmbeddingStore::open(&path)?;
            store.put(&record("a", UnitKind::Conversation, vec![0.25, -1.0]))?;
            store.set_meta(META_DIMENSION, "2")?;
        }

        let store = EmbeddingStore::open(&path)?;
        let records = store.all()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, vec![0.25, -1.0]);
        assert_eq!(store.stats()?.dimension, Some(2));
        Ok(())
    }

    #[test]
    fn test_corrupt_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("embeddings.db");
        std::fs::write(&path, vec![b'x'; 4096]).expect("write");
        assert!(EmbeddingStore::open(&path).is_err());
    }

    #[test]
    fn test_corrupt_kind_reported() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.conn.execute(
            "INSERT INTO embeddings (id, conv_id, kind, dim, vector, created_at) VALUES ('x', 'c', 'note', 1, ?1, 0)",
            params![vector_to_blob(&[1.0])],
        )?;
        assert!(matches!(
            store.all(),
            Err(SearchError::CorruptRecord { .. })
        ));
        Ok(())
    }
}
