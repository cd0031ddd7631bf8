use facegate_core::{Embedding, Identity, IdentityError};
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("identity '{0}' is already enrolled")]
    AlreadyExists(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("invalid embedding blob size: {0} bytes")]
    InvalidBlob(usize),
    #[error("inconsistent embedding dimension: {actual} (expected {expected})")]
    InconsistentDim { expected: usize, actual: usize },
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
}

/// SQLite-backed template storage.
///
/// Each identity owns one or more templates stored as little-endian `f32`
/// blobs. Identities are always returned ordered by identifier.
#[derive(Clone)]
pub struct SqliteTemplateStore {
    conn: Connection,
}

impl SqliteTemplateStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS identities (
                     id TEXT PRIMARY KEY,
                     name TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS templates (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
                     position INTEGER NOT NULL,
                     embedding BLOB NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_templates_identity ON templates(identity_id);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert a new identity with all its templates in one transaction.
    ///
    /// Returns the number of templates stored.
    pub async fn append_templates(
        &self,
        id: &str,
        name: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, StoreError> {
        if embeddings.is_empty() {
            return Err(IdentityError::EmptyTemplates(id.to_string()).into());
        }
        let expected = embeddings[0].dim();
        let mut blobs = Vec::with_capacity(embeddings.len());
        for embedding in &embeddings {
            if embedding.dim() != expected {
                return Err(StoreError::InconsistentDim {
                    expected,
                    actual: embedding.dim(),
                });
            }
            validate_embedding_values(embedding.values())?;
            blobs.push(embedding_to_bytes(embedding.values()));
        }

        let count = blobs.len();
        let created_at = chrono::Utc::now().to_rfc3339();
        let id_owned = id.to_string();
        let name = name.to_string();

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM identities WHERE id = ?1)",
                    [&id_owned],
                    |row| row.get(0),
                )?;
                if exists {
                    return Ok(false);
                }
                tx.execute(
                    "INSERT INTO identities (id, name, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id_owned, name, created_at],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO templates (identity_id, position, embedding)
                         VALUES (?1, ?2, ?3)",
                    )?;
                    for (position, blob) in blobs.iter().enumerate() {
                        stmt.execute(rusqlite::params![id_owned, position as i64, blob])?;
                    }
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if !inserted {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        tracing::debug!(id, templates = count, "identity stored");
        Ok(count)
    }

    /// Load every identity with its templates, ordered by identifier.
    pub async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let rows: Vec<(String, String, Vec<u8>)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT i.id, i.name, t.embedding
                     FROM identities i JOIN templates t ON t.identity_id = i.id
                     ORDER BY i.id, t.position",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        let mut identities = Vec::new();
        let mut current: Option<(String, String, Vec<Embedding>)> = None;
        for (id, name, blob) in rows {
            let embedding = Embedding::new(bytes_to_embedding(&blob)?);
            match current.as_mut() {
                Some((cur_id, _, templates)) if *cur_id == id => templates.push(embedding),
                _ => {
                    if let Some((cur_id, cur_name, templates)) = current.take() {
                        identities.push(Identity::new(cur_id, cur_name, templates)?);
                    }
                    current = Some((id, name, vec![embedding]));
                }
            }
        }
        if let Some((id, name, templates)) = current {
            identities.push(Identity::new(id, name, templates)?);
        }
        Ok(identities)
    }

    /// Metadata for every identity (no embedding data), ordered by identifier.
    pub async fn list_summaries(&self) -> Result<Vec<IdentitySummary>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT i.id, i.name, COUNT(t.id), i.created_at
                     FROM identities i LEFT JOIN templates t ON t.identity_id = i.id
                     GROUP BY i.id ORDER BY i.id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(IdentitySummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        templates: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    pub async fn identity_exists(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM identities WHERE id = ?1)",
                    [&id],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Remove an identity and its templates. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let affected = conn.execute("DELETE FROM identities WHERE id = ?1", [&id])?;
                Ok(affected > 0)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Count enrolled identities and stored templates.
    pub async fn counts(&self) -> Result<(u64, u64), StoreError> {
        self.conn
            .call(|conn| {
                let identities: u64 =
                    conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
                let templates: u64 =
                    conn.query_row("SELECT COUNT(*) FROM templates", [], |row| row.get(0))?;
                Ok((identities, templates))
            })
            .await
            .map_err(StoreError::from)
    }
}

// ── Serialization helpers ─────────────────────────────────────────────────────

fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(StoreError::InvalidBlob(bytes.len()));
    }
    let mut values = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = chunk
            .try_into()
            .map_err(|_| StoreError::InvalidBlob(bytes.len()))?;
        let v = f32::from_le_bytes(arr);
        if !v.is_finite() {
            return Err(StoreError::InvalidEmbeddingValue);
        }
        values.push(v);
    }
    Ok(values)
}

fn validate_embedding_values(values: &[f32]) -> Result<(), StoreError> {
    if values.is_empty() {
        return Err(StoreError::InvalidBlob(0));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::InvalidEmbeddingValue);
    }
    Ok(())
}

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata about an enrolled identity (no embedding data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct IdentitySummary {
    pub id: String,
    pub name: String,
    pub templates: u64,
    pub created_at: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(seed: f32) -> Embedding {
        Embedding::new((0..8).map(|i| seed + i as f32 * 0.01).collect())
    }

    async fn memory_store() -> SqliteTemplateStore {
        SqliteTemplateStore::open(Path::new(":memory:")).await.unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_order_and_values() {
        let store = memory_store().await;
        let alice = vec![emb(0.1), emb(0.2), emb(0.3)];
        store.append_templates("u2", "Bob", vec![emb(0.9)]).await.unwrap();
        let stored = store.append_templates("u1", "Alice", alice.clone()).await.unwrap();
        assert_eq!(stored, 3);

        let identities = store.list_identities().await.unwrap();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].id(), "u1");
        assert_eq!(identities[0].name(), "Alice");
        assert_eq!(identities[0].templates(), alice.as_slice());
        assert_eq!(identities[1].id(), "u2");
        assert_eq!(identities[1].templates().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let store = memory_store().await;
        store.append_templates("u1", "Alice", vec![emb(0.1)]).await.unwrap();
        let err = store
            .append_templates("u1", "Mallory", vec![emb(0.5), emb(0.6)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "u1"));

        // Nothing from the rejected call was written.
        assert_eq!(store.counts().await.unwrap(), (1, 1));
        let identities = store.list_identities().await.unwrap();
        assert_eq!(identities[0].name(), "Alice");
    }

    #[tokio::test]
    async fn test_invalid_embeddings_rejected() {
        let store = memory_store().await;

        let err = store.append_templates("u1", "Alice", vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::Identity(_)));

        let err = store
            .append_templates("u1", "Alice", vec![emb(0.1), Embedding::new(vec![0.1; 4])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InconsistentDim {
                expected: 8,
                actual: 4
            }
        ));

        let err = store
            .append_templates("u1", "Alice", vec![Embedding::new(vec![f32::NAN; 8])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmbeddingValue));

        assert!(!store.identity_exists("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_cascades_to_templates() {
        let store = memory_store().await;
        store
            .append_templates("u1", "Alice", vec![emb(0.1), emb(0.2)])
            .await
            .unwrap();
        assert!(store.identity_exists("u1").await.unwrap());

        assert!(store.remove("u1").await.unwrap());
        assert!(!store.remove("u1").await.unwrap());
        assert_eq!(store.counts().await.unwrap(), (0, 0));
        assert!(store.list_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summaries() {
        let store = memory_store().await;
        store
            .append_templates("u1", "Alice", vec![emb(0.1), emb(0.2)])
            .await
            .unwrap();
        let summaries = store.list_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "u1");
        assert_eq!(summaries[0].templates, 2);
        assert!(!summaries[0].created_at.is_empty());
    }

    #[test]
    fn test_blob_roundtrip_and_rejects_truncation() {
        let values = vec![0.25, -1.5, 3.0];
        let bytes = embedding_to_bytes(&values);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), values);
        assert!(matches!(
            bytes_to_embedding(&bytes[..7]),
            Err(StoreError::InvalidBlob(7))
        ));
    }
}
