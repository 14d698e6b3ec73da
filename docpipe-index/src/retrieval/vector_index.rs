//! Embedding-aware operations over the document store.

use anyhow::{Context, Result};
use docpipe_embed::{EmbeddedChunk, EmbeddingGenerator};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::storage::{DocumentIndex, DocumentMetadata, DocumentRecord, EmbeddingModelInfo};

/// How many chunk records go into one insert transaction.
const STORE_BATCH_SIZE: usize = 50;

/// Minimum similarity a chunk must reach to count as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// How many matches a search returns by default.
pub const DEFAULT_TOP_K: usize = 10;

/// Knobs for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub threshold: f32,
    pub top_k: usize,
    /// Restrict matches to chunks of one project.
    pub project_id: Option<String>,
    /// Exact-match metadata filters, applied in memory after ranking.
    pub filter: HashMap<String, String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            project_id: None,
            filter: HashMap::new(),
        }
    }
}

/// One search hit: the stored record plus its similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub record: DocumentRecord,
    pub similarity: f32,
}

/// Outcome of a bulk store: how many chunks landed and what went wrong.
///
/// `success` means every batch committed. A partial store (some batches
/// failed) reports `success = false` while still counting the chunks that
/// made it in.
#[derive(Debug, Clone, Default)]
pub struct StoreOutcome {
    pub success: bool,
    pub stored: usize,
    pub errors: Vec<String>,
}

/// Semantic search index combining [`DocumentIndex`] storage with an
/// [`EmbeddingGenerator`].
#[derive(Debug, Clone)]
pub struct VectorIndex {
    index: DocumentIndex,
    generator: EmbeddingGenerator,
}

impl VectorIndex {
    /// Wrap a store and generator, registering the generator's model so its
    /// dimension is pinned before any vectors are written.
    pub async fn new(index: DocumentIndex, generator: EmbeddingGenerator) -> Result<Self> {
        let config = generator.config();
        index
            .register_model(&EmbeddingModelInfo::new(
                &config.model,
                "openai",
                config.dimensions,
            ))
            .await?;
        Ok(Self { index, generator })
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    pub fn generator(&self) -> &EmbeddingGenerator {
        &self.generator
    }

    fn model_id(&self) -> &str {
        &self.generator.config().model
    }

    /// Persist embedded chunks for one source document, in batches.
    ///
    /// A failed batch is recorded in the outcome and does not stop the
    /// remaining batches.
    pub async fn store_chunks(
        &self,
        source_id: &str,
        metadata: &DocumentMetadata,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<StoreOutcome> {
        let model_id = self.model_id().to_string();
        let records: Vec<DocumentRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, embedded)| DocumentRecord {
                id: None,
                source_id: source_id.to_string(),
                chunk_index,
                start_index: embedded.chunk.start_index,
                end_index: embedded.chunk.end_index,
                kind: embedded.chunk.kind.as_str().to_string(),
                content: Some(embedded.chunk.content),
                embedding: Some(embedded.embedding),
                metadata: metadata.clone(),
                model_id: Some(model_id.clone()),
            })
            .collect();

        let mut outcome = StoreOutcome {
            success: true,
            ..Default::default()
        };
        for (batch_index, batch) in records.chunks(STORE_BATCH_SIZE).enumerate() {
            match self.index.insert_records(batch).await {
                Ok(()) => outcome.stored += batch.len(),
                Err(error) => {
                    warn!(batch = batch_index + 1, %error, "failed to store chunk batch");
                    outcome.success = false;
                    outcome
                        .errors
                        .push(format!("batch {}: {error:#}", batch_index + 1));
                }
            }
        }

        debug!(
            source_id,
            stored = outcome.stored,
            errors = outcome.errors.len(),
            "stored embedded chunks"
        );
        Ok(outcome)
    }

    /// Embed a query string and search stored chunks.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let embedding = self
            .generator
            .embed_query(query)
            .await
            .context("failed to embed search query")?;
        self.search_by_vector(&embedding, options).await
    }

    /// Rank stored chunks against a prepared query vector, then apply the
    /// project and metadata filters in memory.
    pub async fn search_by_vector(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        // Over-fetch when filters will discard matches after ranking
        let has_filters = options.project_id.is_some() || !options.filter.is_empty();
        let fetch_limit = if has_filters {
            options.top_k.saturating_mul(5)
        } else {
            options.top_k
        };

        let scored = self
            .index
            .matching_records(embedding, self.model_id(), options.threshold, fetch_limit)
            .await?;

        let mut results: Vec<SearchResult> = scored
            .into_iter()
            .filter(|(_, record)| self.record_matches(record, options))
            .map(|(similarity, record)| SearchResult { record, similarity })
            .collect();
        results.truncate(options.top_k);
        Ok(results)
    }

    fn record_matches(&self, record: &DocumentRecord, options: &SearchOptions) -> bool {
        if let Some(project) = &options.project_id
            && record.metadata.project_id.as_deref() != Some(project.as_str())
        {
            return false;
        }
        options
            .filter
            .iter()
            .all(|(key, value)| record.metadata.matches(key, value))
    }

    /// Re-embed one chunk from new text. Returns false when no chunk has
    /// that id.
    pub async fn update_embedding(&self, chunk_id: i64, text: &str) -> Result<bool> {
        let embedding = self
            .generator
            .embed_query(text)
            .await
            .context("failed to embed replacement text")?;
        self.index.update_embedding(chunk_id, &embedding).await
    }

    /// Delete a source document and its chunks. Returns false when the
    /// document was not present.
    pub async fn delete_document(&self, source_id: &str) -> Result<bool> {
        self.index.delete_document(source_id).await
    }

    /// Remove orphaned rows (cleared content, live embedding).
    pub async fn cleanup_orphans(&self) -> Result<usize> {
        self.index.cleanup_orphans().await
    }
}
