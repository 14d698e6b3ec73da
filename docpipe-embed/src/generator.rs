//! Batched embedding generation with partial-failure recovery
//!
//! [`EmbeddingGenerator`] turns chunks into [`EmbeddedChunk`]s through
//! batched calls to an [`EmbeddingProvider`]. Failures are isolated to the
//! smallest unit possible: when a batched call fails (or comes back
//! misaligned), every chunk in that batch is retried individually, and only
//! the chunks that still fail are dropped. Bulk embedding therefore never
//! returns an error for individual chunk failures; the result list may
//! simply be shorter than the input, and the caller treats missing chunks
//! as "not indexed".

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::EmbeddingProvider;
use docpipe_chunk::Chunk;
use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::Arc;
use tracing::{debug, warn};

/// A chunk paired with its embedding vector.
///
/// Only embedded chunks are persisted; chunks whose embedding permanently
/// fails are dropped, never stored with a null or zero vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Generates fixed-length embedding vectors for chunks and queries.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbedConfig,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("provider", &self.provider.provider_name())
            .field("config", &self.config)
            .finish()
    }
}

impl EmbeddingGenerator {
    /// Create a generator from a provider and a validated configuration.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Embed a single query string.
    ///
    /// Service failures are wrapped as [`EmbedError::Generation`] with the
    /// original cause attached. No retry happens at this level.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self
            .provider
            .embed_text(text)
            .await
            .map_err(EmbedError::generation)?;

        if embedding.len() != self.config.dimensions {
            return Err(EmbedError::DimensionMismatch {
                expected: self.config.dimensions,
                got: embedding.len(),
            });
        }
        Ok(embedding)
    }

    /// Embed many chunks in batches. See [`Self::embed_chunks_with_progress`].
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Vec<EmbeddedChunk> {
        self.embed_chunks_with_progress(chunks, |_, _| {}).await
    }

    /// Embed many chunks in batches, reporting progress after each batch.
    ///
    /// Batches are processed strictly in input order. Each batch is one
    /// service call; on batch failure every chunk in it is retried
    /// individually, and chunks that still fail are logged and skipped. A
    /// short delay separates batches while more remain.
    ///
    /// `on_progress` is called with `(processed, total)` after each batch,
    /// where `processed` counts chunks attempted so far (monotone).
    pub async fn embed_chunks_with_progress<F>(
        &self,
        chunks: Vec<Chunk>,
        mut on_progress: F,
    ) -> Vec<EmbeddedChunk>
    where
        F: FnMut(usize, usize),
    {
        let total = chunks.len();
        if total == 0 {
            return Vec::new();
        }

        let batch_size = self.config.batch_size;
        let batch_count = total.div_ceil(batch_size);
        let mut embedded = Vec::with_capacity(total);

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

            match self.provider.embed_texts(&texts).await {
                Ok(vectors) if self.batch_is_usable(batch, &vectors) => {
                    for (chunk, embedding) in batch.iter().cloned().zip(vectors) {
                        embedded.push(EmbeddedChunk { chunk, embedding });
                    }
                }
                Ok(vectors) => {
                    warn!(
                        batch = batch_index + 1,
                        sent = batch.len(),
                        received = vectors.len(),
                        "batch response misaligned or invalid, retrying chunks individually"
                    );
                    self.embed_individually(batch, &mut embedded).await;
                }
                Err(error) => {
                    warn!(
                        batch = batch_index + 1,
                        %error,
                        "batch embedding failed, retrying chunks individually"
                    );
                    self.embed_individually(batch, &mut embedded).await;
                }
            }

            let processed = ((batch_index + 1) * batch_size).min(total);
            on_progress(processed, total);

            if batch_index + 1 < batch_count {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        debug!(
            embedded = embedded.len(),
            total, "finished embedding chunks"
        );
        embedded
    }

    /// A batch result is usable only when the positional zip is safe: one
    /// vector per input, each with the configured dimension.
    fn batch_is_usable(&self, batch: &[Chunk], vectors: &[Vec<f32>]) -> bool {
        vectors.len() == batch.len() && vectors.iter().all(|v| self.validate_embedding(v))
    }

    /// Per-item fallback for a failed batch: embed one chunk at a time,
    /// keeping the successes and skipping the rest.
    async fn embed_individually(&self, batch: &[Chunk], embedded: &mut Vec<EmbeddedChunk>) {
        for chunk in batch {
            match self.provider.embed_text(&chunk.content).await {
                Ok(embedding) if self.validate_embedding(&embedding) => {
                    embedded.push(EmbeddedChunk {
                        chunk: chunk.clone(),
                        embedding,
                    });
                }
                Ok(embedding) => {
                    warn!(
                        expected = self.config.dimensions,
                        got = embedding.len(),
                        start = chunk.start_index,
                        "dropping chunk with invalid embedding"
                    );
                }
                Err(error) => {
                    warn!(
                        %error,
                        start = chunk.start_index,
                        "skipping chunk whose individual embedding failed"
                    );
                }
            }
        }
    }

    /// Check that a vector is exactly `dimensions` finite values.
    pub fn validate_embedding(&self, embedding: &[f32]) -> bool {
        embedding.len() == self.config.dimensions && embedding.iter().all(|v| v.is_finite())
    }

    /// Deterministic cache key for memoizing repeated embedding requests of
    /// identical text. FNV over the text bytes; stable and low-collision,
    /// not cryptographic.
    pub fn cache_key(&self, text: &str) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(text.as_bytes());
        format!(
            "embed:{}:{:x}:{}",
            self.config.model,
            hasher.finish(),
            text.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use docpipe_chunk::ChunkKind;
    use std::sync::Mutex;
    use std::time::Duration;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            content: text.to_string(),
            start_index: 0,
            end_index: text.len(),
            kind: ChunkKind::Text,
            estimated_tokens: text.len().div_ceil(4),
        }
    }

    fn config(dimensions: usize, batch_size: usize) -> EmbedConfig {
        EmbedConfig::new("stub-model", dimensions)
            .with_batch_size(batch_size)
            .with_batch_delay(Duration::ZERO)
    }

    /// Stub provider that fails for one specific input text. Batched calls
    /// containing the poisoned text fail wholesale, forcing the per-item
    /// fallback; the individual call fails only for that text.
    struct StubProvider {
        dimension: usize,
        fail_on: Option<String>,
        truncate_batches: bool,
        batch_calls: Mutex<Vec<usize>>,
    }

    impl StubProvider {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fail_on: None,
                truncate_batches: false,
                batch_calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, text: &str) -> Self {
            self.fail_on = Some(text.to_string());
            self
        }

        fn truncating_batches(mut self) -> Self {
            self.truncate_batches = true;
            self
        }

        fn vector_for(&self, text: &str) -> Vec<f32> {
            vec![text.len() as f32; self.dimension]
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(EmbedError::service("stub failure"));
            }
            Ok(self.vector_for(text))
        }

        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.lock().unwrap().push(texts.len());
            if let Some(poison) = &self.fail_on {
                if texts.iter().any(|t| t == poison) {
                    return Err(EmbedError::service("stub batch failure"));
                }
            }
            let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.vector_for(t)).collect();
            if self.truncate_batches {
                vectors.pop();
            }
            Ok(vectors)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn provider_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_embed_chunks_happy_path() {
        let provider = Arc::new(StubProvider::new(4));
        let generator = EmbeddingGenerator::new(provider, config(4, 2)).unwrap();

        let chunks = vec![chunk("one"), chunk("two"), chunk("three")];
        let embedded = generator.embed_chunks(chunks).await;

        assert_eq!(embedded.len(), 3);
        for item in &embedded {
            assert_eq!(item.embedding.len(), 4);
        }
        // Order preserved through the batch loop
        assert_eq!(embedded[0].chunk.content, "one");
        assert_eq!(embedded[2].chunk.content, "three");
    }

    #[tokio::test]
    async fn test_partial_failure_never_raises() {
        let provider = Arc::new(StubProvider::new(4).failing_on("bad"));
        let generator = EmbeddingGenerator::new(provider, config(4, 5)).unwrap();

        let chunks = vec![
            chunk("alpha"),
            chunk("beta"),
            chunk("bad"),
            chunk("gamma"),
            chunk("delta"),
        ];
        let embedded = generator.embed_chunks(chunks).await;

        // The poisoned chunk is skipped; the other four survive via the
        // per-item fallback.
        assert_eq!(embedded.len(), 4);
        assert!(embedded.iter().all(|e| e.chunk.content != "bad"));
    }

    #[tokio::test]
    async fn test_misaligned_batch_response_triggers_fallback() {
        let provider = Arc::new(StubProvider::new(4).truncating_batches());
        let generator = EmbeddingGenerator::new(provider, config(4, 3)).unwrap();

        let chunks = vec![chunk("a"), chunk("bb"), chunk("ccc")];
        let embedded = generator.embed_chunks(chunks).await;

        // The truncated batch is never zipped positionally; every chunk is
        // recovered through individual calls instead.
        assert_eq!(embedded.len(), 3);
    }

    #[tokio::test]
    async fn test_progress_is_monotone_and_complete() {
        let provider = Arc::new(StubProvider::new(2));
        let generator = EmbeddingGenerator::new(provider, config(2, 2)).unwrap();

        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(&format!("chunk {i}"))).collect();
        let mut reports = Vec::new();
        let embedded = generator
            .embed_chunks_with_progress(chunks, |processed, total| {
                reports.push((processed, total));
            })
            .await;

        assert_eq!(embedded.len(), 5);
        assert_eq!(reports, vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_batches_follow_configured_size() {
        let provider = Arc::new(StubProvider::new(2));
        let generator = EmbeddingGenerator::new(provider.clone(), config(2, 2)).unwrap();

        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(&format!("chunk {i}"))).collect();
        generator.embed_chunks(chunks).await;

        assert_eq!(*provider.batch_calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_embed_query_wraps_service_errors() {
        let provider = Arc::new(StubProvider::new(4).failing_on("query"));
        let generator = EmbeddingGenerator::new(provider, config(4, 20)).unwrap();

        let result = generator.embed_query("query").await;
        assert!(matches!(result, Err(EmbedError::Generation { .. })));

        let ok = generator.embed_query("fine").await.unwrap();
        assert_eq!(ok.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_input_returns_empty() {
        let provider = Arc::new(StubProvider::new(4));
        let generator = EmbeddingGenerator::new(provider, config(4, 20)).unwrap();
        assert!(generator.embed_chunks(Vec::new()).await.is_empty());
    }

    #[test]
    fn test_validate_embedding() {
        let provider = Arc::new(StubProvider::new(3));
        let generator = EmbeddingGenerator::new(provider, config(3, 20)).unwrap();

        assert!(generator.validate_embedding(&[0.1, 0.2, 0.3]));
        assert!(!generator.validate_embedding(&[0.1, 0.2]));
        assert!(!generator.validate_embedding(&[0.1, f32::NAN, 0.3]));
        assert!(!generator.validate_embedding(&[0.1, f32::INFINITY, 0.3]));
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let provider = Arc::new(StubProvider::new(3));
        let generator = EmbeddingGenerator::new(provider, config(3, 20)).unwrap();

        let a = generator.cache_key("same text");
        let b = generator.cache_key("same text");
        let c = generator.cache_key("other text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("embed:stub-model:"));
    }
}
