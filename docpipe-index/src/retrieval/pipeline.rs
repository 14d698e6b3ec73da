//! End-to-end ingestion: validate, chunk, embed, store, track status.

use anyhow::{Context, Result};
use docpipe_chunk::{DocumentChunker, validate_document};
use tracing::{info, warn};

use super::vector_index::VectorIndex;
use crate::storage::{DocumentMetadata, DocumentStatus};

/// What happened while ingesting one document.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Chunks produced by the splitter
    pub chunks: usize,
    /// Chunks that received an embedding
    pub embedded: usize,
    /// Chunks persisted to the index
    pub stored: usize,
    /// Storage errors, one per failed batch
    pub errors: Vec<String>,
}

/// Drives one document through the full pipeline while keeping its status
/// row current: `processing` while work is underway, then `completed`, or
/// `failed` when nothing could be stored for a non-empty document.
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    chunker: DocumentChunker,
    vectors: VectorIndex,
}

impl DocumentPipeline {
    pub fn new(chunker: DocumentChunker, vectors: VectorIndex) -> Self {
        Self { chunker, vectors }
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Ingest one document.
    ///
    /// Chunks that fail to embed are skipped, not fatal: the document still
    /// completes, with the shortfall visible in the report. Only a storage
    /// failure that prevents every chunk from being persisted marks the
    /// document `failed`. An empty-after-preprocessing document completes
    /// with zero chunks.
    pub async fn process_document(
        &self,
        source_id: &str,
        content: &str,
        file_type: &str,
        metadata: &DocumentMetadata,
    ) -> Result<IngestReport> {
        let index = self.vectors.index();
        index
            .upsert_document(source_id, metadata.title.as_deref())
            .await?;

        if let Err(error) = validate_document(content) {
            index
                .set_status(source_id, DocumentStatus::Failed, Some(&error.to_string()))
                .await?;
            return Err(error).context("document rejected before chunking");
        }

        index
            .set_status(source_id, DocumentStatus::Processing, None)
            .await?;

        let chunks = self.chunker.chunk_document(content, file_type);
        if chunks.is_empty() {
            index
                .set_status(source_id, DocumentStatus::Completed, None)
                .await?;
            return Ok(IngestReport::default());
        }

        let chunk_count = chunks.len();
        let embedded = self.vectors.generator().embed_chunks(chunks).await;
        let embedded_count = embedded.len();

        let outcome = self
            .vectors
            .store_chunks(source_id, metadata, embedded)
            .await?;

        let report = IngestReport {
            chunks: chunk_count,
            embedded: embedded_count,
            stored: outcome.stored,
            errors: outcome.errors,
        };

        // Failed is reserved for storage refusing every chunk; embedding
        // shortfalls (even total ones) complete with the gap in the report.
        if report.stored == 0 && !report.errors.is_empty() {
            let message = report.errors.join("; ");
            warn!(source_id, %message, "document ingestion failed");
            index
                .set_status(source_id, DocumentStatus::Failed, Some(&message))
                .await?;
        } else {
            info!(
                source_id,
                chunks = report.chunks,
                stored = report.stored,
                "document ingested"
            );
            index
                .set_status(source_id, DocumentStatus::Completed, None)
                .await?;
        }

        Ok(report)
    }
}
