//! End-to-end pipeline tests: chunk → embed → store → search.

use async_trait::async_trait;
use docpipe_chunk::{ChunkConfig, DocumentChunker};
use docpipe_embed::{
    EmbedConfig, EmbedError, EmbeddingGenerator, EmbeddingProvider, Result as EmbedResult,
};
use docpipe_index::retrieval::{DocumentPipeline, SearchOptions, VectorIndex};
use docpipe_index::storage::{DocumentIndex, DocumentMetadata, DocumentRecord, DocumentStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DIMENSIONS: usize = 3;

/// Deterministic provider: the n-th text ever embedded gets the constant
/// vector [n, n, n]. The first chunk therefore gets a zero vector (cosine 0
/// against everything) and later texts all get mutually parallel vectors
/// (cosine 1 against each other), which makes threshold behavior easy to
/// pin down.
struct CountingProvider {
    counter: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    fn next_vector(&self) -> Vec<f32> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        vec![n as f32; DIMENSIONS]
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    async fn embed_text(&self, _text: &str) -> EmbedResult<Vec<f32>> {
        Ok(self.next_vector())
    }

    async fn embed_texts(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.next_vector()).collect())
    }

    fn dimension(&self) -> usize {
        DIMENSIONS
    }

    fn provider_name(&self) -> &str {
        "counting"
    }
}

/// Provider that fails every call, for exercising the failure path.
struct BrokenProvider;

#[async_trait]
impl EmbeddingProvider for BrokenProvider {
    async fn embed_text(&self, _text: &str) -> EmbedResult<Vec<f32>> {
        Err(EmbedError::service("provider offline"))
    }

    async fn embed_texts(&self, _texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        Err(EmbedError::service("provider offline"))
    }

    fn dimension(&self) -> usize {
        DIMENSIONS
    }

    fn provider_name(&self) -> &str {
        "broken"
    }
}

fn embed_config() -> EmbedConfig {
    EmbedConfig::new("test-model", DIMENSIONS).with_batch_delay(Duration::ZERO)
}

async fn pipeline_with(provider: Arc<dyn EmbeddingProvider>) -> DocumentPipeline {
    let generator = EmbeddingGenerator::new(provider, embed_config()).unwrap();
    let index = DocumentIndex::open_memory().await.unwrap();
    let vectors = VectorIndex::new(index, generator).await.unwrap();
    let chunker = DocumentChunker::new(ChunkConfig::default()).unwrap();
    DocumentPipeline::new(chunker, vectors)
}

/// Every sentence is exactly 62 characters, so paragraph sizes are exact:
/// a paragraph of `s` sentences is `63s - 1` characters.
fn paragraph(n: usize, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Paragraph {n} holds sentence {i} with padding words to fill space."))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Two 440-char paragraphs fit one 1000-char chunk together; the 503-char
/// third paragraph overflows it and lands in a second chunk with overlap.
fn three_paragraph_document() -> String {
    [paragraph(1, 7), paragraph(2, 7), paragraph(3, 8)].join("\n\n")
}

#[tokio::test]
async fn test_round_trip_ingest_and_search() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;
    let metadata = DocumentMetadata {
        title: Some("Handbook".to_string()),
        project_id: Some("proj-1".to_string()),
        ..Default::default()
    };

    let report = pipeline
        .process_document("doc-1", &three_paragraph_document(), "markdown", &metadata)
        .await
        .unwrap();

    assert_eq!(report.chunks, 2);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.stored, 2);
    assert!(report.errors.is_empty());

    let status = pipeline.vectors().index().get_status("doc-1").await.unwrap();
    assert_eq!(status, Some((DocumentStatus::Completed, None)));

    // Chunk 1 got the zero vector (similarity 0 against any query), chunk 2
    // got [1,1,1] which is parallel to the query vector. A high threshold
    // keeps only chunk 2.
    let options = SearchOptions {
        threshold: 0.99,
        ..Default::default()
    };
    let hits = pipeline.vectors().search("anything", &options).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].similarity > 0.99);
    let content = hits[0].record.content.as_deref().unwrap();
    assert!(content.contains("Paragraph 3"));
    assert_eq!(hits[0].record.metadata.title.as_deref(), Some("Handbook"));
}

#[tokio::test]
async fn test_search_filters_by_project_and_metadata() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;

    for (doc, project) in [("doc-a", "proj-1"), ("doc-b", "proj-2")] {
        let metadata = DocumentMetadata {
            project_id: Some(project.to_string()),
            ..Default::default()
        };
        pipeline
            .process_document(doc, &paragraph(1, 5), "text", &metadata)
            .await
            .unwrap();
    }

    let options = SearchOptions {
        threshold: 0.0,
        project_id: Some("proj-2".to_string()),
        ..Default::default()
    };
    let hits = pipeline.vectors().search("query", &options).await.unwrap();
    assert!(!hits.is_empty());
    assert!(
        hits.iter()
            .all(|h| h.record.metadata.project_id.as_deref() == Some("proj-2"))
    );

    // An equality filter on a metadata key that nothing carries matches nothing
    let mut options = SearchOptions {
        threshold: 0.0,
        ..Default::default()
    };
    options.filter.insert("team".to_string(), "infra".to_string());
    let hits = pipeline.vectors().search("query", &options).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_total_embedding_failure_completes_with_nothing_stored() {
    let pipeline = pipeline_with(Arc::new(BrokenProvider)).await;

    let report = pipeline
        .process_document(
            "doc-1",
            &three_paragraph_document(),
            "markdown",
            &DocumentMetadata::default(),
        )
        .await
        .unwrap();

    // Embedding failures are skipped chunks, not a pipeline failure: the
    // document completes and the report carries the shortfall.
    assert_eq!(report.chunks, 2);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.stored, 0);
    assert!(report.errors.is_empty());

    let status = pipeline.vectors().index().get_status("doc-1").await.unwrap();
    assert_eq!(status, Some((DocumentStatus::Completed, None)));
}

#[tokio::test]
async fn test_store_chunks_reports_storage_errors() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;

    // A vector whose length disagrees with the registered model dimension
    // is refused by storage; the outcome records the refusal.
    let bad = docpipe_embed::EmbeddedChunk {
        chunk: docpipe_chunk::Chunk {
            content: "stray chunk".to_string(),
            start_index: 0,
            end_index: 11,
            kind: docpipe_chunk::ChunkKind::Text,
            estimated_tokens: 3,
        },
        embedding: vec![1.0; DIMENSIONS + 1],
    };

    pipeline
        .vectors()
        .index()
        .upsert_document("doc-1", None)
        .await
        .unwrap();
    let outcome = pipeline
        .vectors()
        .store_chunks("doc-1", &DocumentMetadata::default(), vec![bad])
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.stored, 0);
    assert_eq!(outcome.errors.len(), 1);
}

#[tokio::test]
async fn test_invalid_document_is_rejected_and_marked_failed() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;

    let result = pipeline
        .process_document("doc-1", "   \n  ", "text", &DocumentMetadata::default())
        .await;
    assert!(result.is_err());

    let status = pipeline.vectors().index().get_status("doc-1").await.unwrap();
    assert!(matches!(status, Some((DocumentStatus::Failed, Some(_)))));
}

#[tokio::test]
async fn test_delete_and_reingest() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;
    let metadata = DocumentMetadata::default();

    pipeline
        .process_document("doc-1", &paragraph(1, 5), "text", &metadata)
        .await
        .unwrap();
    assert!(pipeline.vectors().delete_document("doc-1").await.unwrap());
    assert!(!pipeline.vectors().delete_document("doc-1").await.unwrap());

    // Re-ingesting after a delete works and restores searchability
    let report = pipeline
        .process_document("doc-1", &paragraph(1, 5), "text", &metadata)
        .await
        .unwrap();
    assert_eq!(report.stored, 1);
}

#[tokio::test]
async fn test_cleanup_orphans_through_vector_index() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;
    pipeline
        .process_document(
            "doc-1",
            &paragraph(1, 5),
            "text",
            &DocumentMetadata::default(),
        )
        .await
        .unwrap();

    // Simulate an external process clearing content but not the embedding
    let orphan = DocumentRecord {
        id: None,
        source_id: "doc-1".to_string(),
        chunk_index: 99,
        start_index: 0,
        end_index: 0,
        kind: "text".to_string(),
        content: None,
        embedding: Some(vec![1.0; DIMENSIONS]),
        metadata: DocumentMetadata::default(),
        model_id: Some("test-model".to_string()),
    };
    pipeline
        .vectors()
        .index()
        .insert_records(&[orphan])
        .await
        .unwrap();

    assert_eq!(pipeline.vectors().cleanup_orphans().await.unwrap(), 1);
    // The intact chunk survives
    let remaining = pipeline.vectors().index().get_records("doc-1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].content.is_some());
}

#[tokio::test]
async fn test_update_embedding_changes_search_ranking() {
    let pipeline = pipeline_with(Arc::new(CountingProvider::new())).await;
    pipeline
        .process_document(
            "doc-1",
            &paragraph(1, 5),
            "text",
            &DocumentMetadata::default(),
        )
        .await
        .unwrap();

    let records = pipeline.vectors().index().get_records("doc-1").await.unwrap();
    let chunk_id = records[0].id.unwrap();

    assert!(
        pipeline
            .vectors()
            .update_embedding(chunk_id, "replacement text")
            .await
            .unwrap()
    );
    assert!(
        !pipeline
            .vectors()
            .update_embedding(chunk_id + 999, "replacement text")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_persistent_index_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let generator =
        EmbeddingGenerator::new(Arc::new(CountingProvider::new()), embed_config()).unwrap();
    let index = DocumentIndex::open(dir.path()).await.unwrap();
    let vectors = VectorIndex::new(index, generator).await.unwrap();
    let chunker = DocumentChunker::new(ChunkConfig::default()).unwrap();
    let pipeline = DocumentPipeline::new(chunker, vectors);

    let report = pipeline
        .process_document(
            "doc-1",
            &paragraph(1, 5),
            "text",
            &DocumentMetadata::default(),
        )
        .await
        .unwrap();
    assert_eq!(report.stored, 1);

    let stats = pipeline.vectors().index().stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.embedded_chunks, 1);
}
