//! Core SQLite operations for chunk and embedding storage.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Source documents: status tracking per ingested document
//! CREATE TABLE source_documents (
//!     id TEXT PRIMARY KEY,
//!     title TEXT,
//!     status TEXT,                     -- pending | processing | completed | failed
//!     error TEXT,                      -- failure message, if any
//!     chunk_count INTEGER,
//!     created_at TIMESTAMP,
//!     updated_at TIMESTAMP
//! );
//!
//! -- Embedding models: dimension registry keyed by model id
//! CREATE TABLE embedding_models (
//!     model_id TEXT PRIMARY KEY,
//!     provider TEXT,
//!     dimension INTEGER,
//!     created_at TIMESTAMP
//! );
//!
//! -- Chunks: the searchable units
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     source_id TEXT REFERENCES source_documents(id),
//!     chunk_index INTEGER,             -- position within the source document
//!     start_index INTEGER,             -- byte offset of chunk start
//!     end_index INTEGER,
//!     kind TEXT,                       -- paragraph | heading | list | code | text
//!     content TEXT,                    -- nullable; NULL + embedding = orphan
//!     embedding BLOB,                  -- f32 little-endian vector (optional)
//!     metadata_json TEXT,
//!     project_id TEXT,                 -- denormalized from metadata for filtering
//!     model_id TEXT REFERENCES embedding_models(model_id),
//!     created_at TIMESTAMP
//! );
//! ```
//!
//! ## SQLite Optimizations
//!
//! - **WAL mode**: Better concurrency for read/write operations
//! - **Large page size** (64KB): Optimized for embedding blob storage
//! - **Auto-vacuum**: Keeps database size manageable
//! - **Foreign keys**: Maintains referential integrity

use anyhow::{Context, Result, bail};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use super::{DocumentMetadata, DocumentRecord, DocumentStatus, EmbeddingModelInfo, IndexStats};

/// SQLite-backed index of source documents, chunks, and embedding models.
///
/// All operations go through a connection pool, so the index is cheap to
/// clone and safe to share across tasks.
#[derive(Clone, Debug)]
pub struct DocumentIndex {
    pool: SqlitePool,
}

impl DocumentIndex {
    /// Open a persistent index at `base/docpipe.db`, creating it if needed.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = base.join("docpipe.db");

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory index, used by tests.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_documents (
                id TEXT PRIMARY KEY,
                title TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_models (
                model_id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_index INTEGER NOT NULL,
                end_index INTEGER NOT NULL,
                kind TEXT NOT NULL,
                content TEXT,
                embedding BLOB,
                metadata_json TEXT NOT NULL,
                project_id TEXT,
                model_id TEXT REFERENCES embedding_models(model_id),
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT unique_chunk UNIQUE(source_id, chunk_index),
                FOREIGN KEY (source_id) REFERENCES source_documents(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_project ON chunks(project_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_model ON chunks(model_id)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Register an embedding model, rejecting a dimension that conflicts
    /// with an earlier registration of the same model id.
    pub async fn register_model(&self, model: &EmbeddingModelInfo) -> Result<()> {
        if let Some(existing) = self.get_model(&model.model_id).await?
            && existing.dimension != model.dimension
        {
            bail!(
                "model '{}' already registered with dimension {}, got {}",
                model.model_id,
                existing.dimension,
                model.dimension
            );
        }

        sqlx::query(
            r#"
            INSERT INTO embedding_models (model_id, provider, dimension)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(model_id) DO UPDATE SET provider = excluded.provider
            "#,
        )
        .bind(&model.model_id)
        .bind(&model.provider)
        .bind(model.dimension as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a registered embedding model.
    pub async fn get_model(&self, model_id: &str) -> Result<Option<EmbeddingModelInfo>> {
        let row = sqlx::query(
            "SELECT model_id, provider, dimension FROM embedding_models WHERE model_id = ?1",
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| EmbeddingModelInfo {
            model_id: row.get("model_id"),
            provider: row.get("provider"),
            dimension: row.get::<i64, _>("dimension") as usize,
        }))
    }

    /// Create or refresh the status row for a source document.
    pub async fn upsert_document(&self, source_id: &str, title: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_documents (id, title, status, updated_at)
            VALUES (?1, ?2, 'pending', datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = 'pending',
                error = NULL,
                updated_at = datetime('now')
            "#,
        )
        .bind(source_id)
        .bind(title)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advance a source document's status, storing the failure message when
    /// the new status is `Failed`.
    pub async fn set_status(
        &self,
        source_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_documents
            SET status = ?2, error = ?3, updated_at = datetime('now')
            WHERE id = ?1
            "#,
        )
        .bind(source_id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Current status and failure message of a source document.
    pub async fn get_status(
        &self,
        source_id: &str,
    ) -> Result<Option<(DocumentStatus, Option<String>)>> {
        let row = sqlx::query("SELECT status, error FROM source_documents WHERE id = ?1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let status_text: String = row.get("status");
            let status = DocumentStatus::parse(&status_text)
                .with_context(|| format!("unknown document status '{status_text}'"))?;
            Ok((status, row.get("error")))
        })
        .transpose()
    }

    /// Insert chunk records inside one transaction.
    ///
    /// Every record carrying an embedding must name a registered model, and
    /// the vector length must match that model's dimension.
    pub async fn insert_records(&self, records: &[DocumentRecord]) -> Result<()> {
        let mut dimensions: HashMap<String, usize> = HashMap::new();
        for record in records {
            let (Some(embedding), Some(model_id)) = (&record.embedding, &record.model_id) else {
                if record.embedding.is_some() {
                    bail!("record with embedding but no model id");
                }
                continue;
            };
            let dimension = match dimensions.get(model_id) {
                Some(d) => *d,
                None => {
                    let model = self
                        .get_model(model_id)
                        .await?
                        .with_context(|| format!("embedding model '{model_id}' not registered"))?;
                    dimensions.insert(model_id.clone(), model.dimension);
                    model.dimension
                }
            };
            if embedding.len() != dimension {
                bail!(
                    "embedding length {} does not match dimension {} of model '{}'",
                    embedding.len(),
                    dimension,
                    model_id
                );
            }
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let embedding_bytes = record
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<f32, u8>(e));
            let metadata_json = serde_json::to_string(&record.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO chunks
                    (source_id, chunk_index, start_index, end_index, kind,
                     content, embedding, metadata_json, project_id, model_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(source_id, chunk_index) DO UPDATE SET
                    start_index = excluded.start_index,
                    end_index = excluded.end_index,
                    kind = excluded.kind,
                    content = excluded.content,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json,
                    project_id = excluded.project_id,
                    model_id = excluded.model_id
                "#,
            )
            .bind(&record.source_id)
            .bind(record.chunk_index as i64)
            .bind(record.start_index as i64)
            .bind(record.end_index as i64)
            .bind(&record.kind)
            .bind(&record.content)
            .bind(embedding_bytes)
            .bind(metadata_json)
            .bind(&record.metadata.project_id)
            .bind(&record.model_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let mut source_ids: Vec<&str> = records.iter().map(|r| r.source_id.as_str()).collect();
        source_ids.sort_unstable();
        source_ids.dedup();
        for source_id in source_ids {
            sqlx::query(
                r#"
                UPDATE source_documents
                SET chunk_count = (SELECT COUNT(*) FROM chunks WHERE source_id = ?1),
                    updated_at = datetime('now')
                WHERE id = ?1
                "#,
            )
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Stored chunk count of a source document, as maintained by
    /// [`Self::insert_records`]. None when the document is unknown.
    pub async fn chunk_count(&self, source_id: &str) -> Result<Option<usize>> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT chunk_count FROM source_documents WHERE id = ?1")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(count.map(|c| c as usize))
    }

    /// Brute-force cosine ranking over every embedded chunk of one model.
    ///
    /// Returns `(similarity, record)` pairs at or above `threshold`, sorted
    /// descending, at most `limit` of them. Rows whose stored vector does
    /// not match the query dimension are skipped with a warning.
    pub async fn matching_records(
        &self,
        query_embedding: &[f32],
        model_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(f32, DocumentRecord)>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, chunk_index, start_index, end_index, kind,
                   content, embedding, metadata_json, model_id
            FROM chunks
            WHERE embedding IS NOT NULL AND model_id = ?1
            ORDER BY id
            "#,
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, DocumentRecord)> = Vec::new();
        for row in rows {
            let record = record_from_row(&row)?;
            let Some(embedding) = &record.embedding else {
                continue;
            };
            match docpipe_embed::cosine_similarity(query_embedding, embedding) {
                Ok(similarity) if similarity >= threshold => scored.push((similarity, record)),
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        chunk_id = record.id,
                        %error,
                        "skipping chunk with incompatible stored embedding"
                    );
                }
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// All chunks of one source document, in chunk order.
    pub async fn get_records(&self, source_id: &str) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, chunk_index, start_index, end_index, kind,
                   content, embedding, metadata_json, model_id
            FROM chunks WHERE source_id = ?1 ORDER BY chunk_index
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Page through stored chunks, optionally scoped to one project.
    pub async fn list_records(
        &self,
        project_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let rows = match project_id {
            Some(project) => {
                sqlx::query(
                    r#"
                    SELECT id, source_id, chunk_index, start_index, end_index, kind,
                           content, embedding, metadata_json, model_id
                    FROM chunks WHERE project_id = ?1
                    ORDER BY source_id, chunk_index LIMIT ?2 OFFSET ?3
                    "#,
                )
                .bind(project)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, source_id, chunk_index, start_index, end_index, kind,
                           content, embedding, metadata_json, model_id
                    FROM chunks
                    ORDER BY source_id, chunk_index LIMIT ?1 OFFSET ?2
                    "#,
                )
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(record_from_row).collect()
    }

    /// Replace the embedding of one chunk. Returns false when no chunk has
    /// that id, and errors when the new vector's length disagrees with the
    /// dimension registered for the chunk's model.
    pub async fn update_embedding(&self, chunk_id: i64, embedding: &[f32]) -> Result<bool> {
        let row = sqlx::query("SELECT model_id FROM chunks WHERE id = ?1")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        let model_id: Option<String> = row.get("model_id");
        let model_id =
            model_id.with_context(|| format!("chunk {chunk_id} has no embedding model"))?;
        let model = self
            .get_model(&model_id)
            .await?
            .with_context(|| format!("embedding model '{model_id}' not registered"))?;
        if embedding.len() != model.dimension {
            bail!(
                "embedding length {} does not match dimension {} of model '{}'",
                embedding.len(),
                model.dimension,
                model_id
            );
        }

        let result = sqlx::query("UPDATE chunks SET embedding = ?2 WHERE id = ?1")
            .bind(chunk_id)
            .bind(bytemuck::cast_slice::<f32, u8>(embedding))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a source document and all its chunks. Returns false when the
    /// document was not present.
    pub async fn delete_document(&self, source_id: &str) -> Result<bool> {
        let chunks = sqlx::query("DELETE FROM chunks WHERE source_id = ?1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        let document = sqlx::query("DELETE FROM source_documents WHERE id = ?1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(chunks.rows_affected() > 0 || document.rows_affected() > 0)
    }

    /// Remove rows whose content was cleared while an embedding remains.
    /// Returns the number of rows deleted.
    pub async fn cleanup_orphans(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE content IS NULL AND embedding IS NOT NULL")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    /// Row counts across the index.
    pub async fn stats(&self) -> Result<IndexStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded_chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        let models: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_models")
            .fetch_one(&self.pool)
            .await?;

        Ok(IndexStats {
            documents: documents as usize,
            chunks: chunks as usize,
            embedded_chunks: embedded_chunks as usize,
            models: models as usize,
        })
    }
}

fn record_from_row(row: &SqliteRow) -> Result<DocumentRecord> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: DocumentMetadata =
        serde_json::from_str(&metadata_json).context("malformed chunk metadata")?;
    let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
    // pod_collect copes with the blob's 1-byte alignment
    let embedding = embedding_bytes.map(|bytes| bytemuck::pod_collect_to_vec::<u8, f32>(&bytes));

    Ok(DocumentRecord {
        id: Some(row.get("id")),
        source_id: row.get("source_id"),
        chunk_index: row.get::<i64, _>("chunk_index") as usize,
        start_index: row.get::<i64, _>("start_index") as usize,
        end_index: row.get::<i64, _>("end_index") as usize,
        kind: row.get("kind"),
        content: row.get("content"),
        embedding,
        metadata,
        model_id: row.get("model_id"),
    })
}
